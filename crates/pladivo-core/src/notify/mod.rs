//! Customer email notifications, delivered through a transactional outbox.
//!
//! Domain operations never talk to the email provider. They call
//! [`enqueue_email`] inside the transaction that made the change the email
//! announces; the [`outbox::OutboxWorker`] delivers it later and retries on
//! failure.

pub mod outbox;
pub mod sender;
pub mod templates;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgExecutor;

use pladivo_db::models::EventContract;
use pladivo_db::queries::outbox as db;

use crate::error::DomainResult;

pub use outbox::{OutboxConfig, OutboxWorker};
pub use sender::{EmailSender, HttpEmailSender, LogEmailSender};

/// Default delivery attempts before a message is parked as `dead`.
pub const DEFAULT_MAX_ATTEMPTS: i32 = 5;

/// One installment line in a contract email.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallmentLine {
    pub number: usize,
    pub description: String,
    pub amount: i64,
    pub due_date: Option<NaiveDate>,
    pub paid: bool,
    pub payment_link: Option<String>,
    pub transfer_content: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractIssued {
    pub customer_name: String,
    pub contract_number: String,
    pub title: String,
    pub total_value: i64,
    pub installments: Vec<InstallmentLine>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentConfirmed {
    pub customer_name: String,
    pub contract_number: String,
    pub installment: usize,
    pub amount: i64,
    pub paid_at: DateTime<Utc>,
    pub transaction_id: String,
    pub contract_signed: bool,
}

/// A queued email. Stored as the outbox row's `payload`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum EmailMessage {
    ContractIssued(ContractIssued),
    PaymentConfirmed(PaymentConfirmed),
}

impl EmailMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ContractIssued(_) => "contract_issued",
            Self::PaymentConfirmed(_) => "payment_confirmed",
        }
    }

    /// The contract email listing every installment and its payment link.
    pub fn contract_issued(contract: &EventContract) -> Self {
        let installments = contract
            .payment_schedule
            .iter()
            .enumerate()
            .map(|(i, item)| InstallmentLine {
                number: i + 1,
                description: item.description.clone(),
                amount: item.amount,
                due_date: item.due_date,
                paid: item.is_paid(),
                payment_link: item.payment_link.clone(),
                transfer_content: item.transfer_content.clone(),
            })
            .collect();

        Self::ContractIssued(ContractIssued {
            customer_name: contract.party_a.name.clone(),
            contract_number: contract.contract_number.clone(),
            title: contract.title.clone(),
            total_value: contract.total_value,
            installments,
        })
    }
}

/// Queue `message` for `recipient` using the caller's executor, so it
/// commits or rolls back with the caller's transaction.
pub async fn enqueue_email<'e, E>(
    executor: E,
    recipient: &str,
    message: &EmailMessage,
    max_attempts: i32,
) -> DomainResult<()>
where
    E: PgExecutor<'e>,
{
    let payload = serde_json::to_value(message).map_err(anyhow::Error::from)?;
    let row = db::enqueue(executor, message.kind(), recipient, &payload, max_attempts).await?;
    tracing::debug!(message_id = %row.id, kind = message.kind(), recipient, "email queued");
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn payload_is_tagged_by_kind() {
        let msg = EmailMessage::PaymentConfirmed(PaymentConfirmed {
            customer_name: "Tran Thi B".into(),
            contract_number: "HD001".into(),
            installment: 1,
            amount: 4_000_000,
            paid_at: "2026-10-19T07:02:37Z".parse().unwrap(),
            transaction_id: "92704".into(),
            contract_signed: true,
        });

        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["kind"], json!("payment_confirmed"));
        assert_eq!(value["data"]["amount"], json!(4_000_000));
        assert_eq!(msg.kind(), "payment_confirmed");

        let back: EmailMessage = serde_json::from_value(value).unwrap();
        assert_eq!(back, msg);
    }
}
