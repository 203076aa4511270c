//! Match an inbound bank transfer against contract payment schedules.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use pladivo_db::models::{ContractStatus, ScheduleItemStatus};
use pladivo_db::queries::contracts as contract_db;
use pladivo_db::queries::payments::{self as payment_db, NewPayment};

use super::extract::resolve_payment_code;
use super::webhook::SepayWebhookPayload;
use crate::contract::ContractSettings;
use crate::error::{DomainError, DomainResult};
use crate::notify::{self, EmailMessage, PaymentConfirmed};

/// Attempts before a persistent version conflict is reported.
const MAX_ATTEMPTS: usize = 3;

/// What a webhook delivery did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReconcileOutcome {
    /// Not an inbound transfer; acknowledged without side effects.
    Ignored { transfer_type: String },
    /// The installment was already paid; nothing changed.
    AlreadyPaid {
        contract_id: Uuid,
        payment_code: String,
        /// 0-based position in the schedule, as on the audit row.
        payment_schedule_index: usize,
        /// 1-based number shown to customers.
        installment_number: usize,
    },
    /// The installment was marked paid.
    Paid {
        contract_id: Uuid,
        booking_id: String,
        payment_code: String,
        payment_schedule_index: usize,
        installment_number: usize,
        amount: i64,
        scheduled_amount: i64,
        contract_signed: bool,
    },
}

/// Reconcile one webhook delivery.
///
/// Marks the matching installment paid, signs the contract when the first
/// installment is paid, records an audit row and queues the confirmation
/// email, all in one transaction. Replays of a paid code are a no-op.
///
/// `raw` is stored verbatim on the audit row. `received_at` stands in for
/// the transaction time when the gateway's timestamp is unparseable.
///
/// Amounts that differ from the scheduled amount are accepted with a
/// warning.
pub async fn reconcile_payment(
    pool: &PgPool,
    settings: &ContractSettings,
    payload: &SepayWebhookPayload,
    raw: &Value,
    received_at: DateTime<Utc>,
) -> DomainResult<ReconcileOutcome> {
    if !payload.is_inbound() {
        tracing::info!(
            transaction_id = %payload.id,
            transfer_type = %payload.transfer_type,
            "ignoring non-inbound transfer"
        );
        return Ok(ReconcileOutcome::Ignored {
            transfer_type: payload.transfer_type.clone(),
        });
    }

    if payload.id.trim().is_empty() {
        return Err(DomainError::validation("Thiếu mã giao dịch (id) trong dữ liệu webhook"));
    }

    let code = resolve_payment_code(&payload.content, payload.code.as_deref()).ok_or_else(|| {
        DomainError::validation("Không tìm thấy mã thanh toán trong nội dung chuyển khoản")
    })?;
    let paid_at = payload.transaction_time(received_at);

    for attempt in 1..=MAX_ATTEMPTS {
        let contract = contract_db::find_contract_by_payment_code(pool, &code)
            .await?
            .ok_or_else(|| not_found(&code))?;

        let index = contract
            .payment_schedule
            .iter()
            .position(|item| item.payment_code.as_deref() == Some(code.as_str()))
            .ok_or_else(|| not_found(&code))?;
        let scheduled = &contract.payment_schedule[index];

        if scheduled.is_paid() {
            tracing::info!(
                contract_id = %contract.id,
                payment_code = %code,
                transaction_id = %payload.id,
                "installment already paid, ignoring replay"
            );
            return Ok(ReconcileOutcome::AlreadyPaid {
                contract_id: contract.id,
                payment_code: code,
                payment_schedule_index: index,
                installment_number: index + 1,
            });
        }

        let scheduled_amount = scheduled.amount;
        if payload.amount_in != scheduled_amount {
            tracing::warn!(
                contract_id = %contract.id,
                payment_code = %code,
                received = payload.amount_in,
                scheduled = scheduled_amount,
                "payment amount differs from schedule, accepting"
            );
        }

        let mut schedule = contract.payment_schedule.0.clone();
        let item = &mut schedule[index];
        item.status = ScheduleItemStatus::Paid;
        item.paid_at = Some(paid_at);
        item.transaction_id = Some(payload.id.clone());

        let signs = index == 0 && contract.status != ContractStatus::Signed;
        let (status, signed_at) = if signs {
            (ContractStatus::Signed, Some(paid_at))
        } else {
            (contract.status, None)
        };

        let mut tx = pool.begin().await?;

        let Some(updated) = contract_db::update_payment_schedule(
            &mut *tx,
            contract.id,
            contract.version,
            &schedule,
            status,
            signed_at,
        )
        .await?
        else {
            tx.rollback().await?;
            tracing::warn!(
                contract_id = %contract.id,
                payment_code = %code,
                attempt,
                "contract changed during reconciliation, retrying"
            );
            continue;
        };

        let audit = payment_db::insert_payment(
            &mut *tx,
            &NewPayment {
                contract_id: contract.id,
                booking_id: contract.booking_id.clone(),
                payment_schedule_index: index as i32,
                payment_code: code.clone(),
                amount: payload.amount_in,
                scheduled_amount,
                gateway: payload.gateway.clone(),
                gateway_transaction_id: payload.id.clone(),
                reference_code: payload.reference_code.clone(),
                transaction_date: paid_at,
                raw_payload: raw.clone(),
            },
        )
        .await?;
        if audit.is_none() {
            tracing::warn!(
                contract_id = %contract.id,
                installment = index + 1,
                transaction_id = %payload.id,
                "payment audit row already present, not duplicated"
            );
        }

        match updated.party_a.email.as_deref().filter(|e| !e.trim().is_empty()) {
            Some(recipient) => {
                let message = EmailMessage::PaymentConfirmed(PaymentConfirmed {
                    customer_name: updated.party_a.name.clone(),
                    contract_number: updated.contract_number.clone(),
                    installment: index + 1,
                    amount: payload.amount_in,
                    paid_at,
                    transaction_id: payload.id.clone(),
                    contract_signed: signs,
                });
                notify::enqueue_email(&mut *tx, recipient, &message, settings.email_max_attempts)
                    .await?;
            }
            None => tracing::warn!(
                contract_id = %contract.id,
                "contract has no customer email, skipping payment confirmation"
            ),
        }

        tx.commit().await?;

        tracing::info!(
            contract_id = %contract.id,
            payment_code = %code,
            installment = index + 1,
            amount = payload.amount_in,
            contract_signed = signs,
            "payment reconciled"
        );

        return Ok(ReconcileOutcome::Paid {
            contract_id: contract.id,
            booking_id: contract.booking_id,
            payment_code: code,
            payment_schedule_index: index,
            installment_number: index + 1,
            amount: payload.amount_in,
            scheduled_amount,
            contract_signed: signs,
        });
    }

    Err(DomainError::conflict(
        "Hợp đồng đang được cập nhật, vui lòng thử lại",
    ))
}

fn not_found(code: &str) -> DomainError {
    DomainError::not_found(format!("Không tìm thấy hợp đồng với mã thanh toán {code}"))
}
