//! Database query functions for the `payments` audit table.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

use crate::models::Payment;

/// Parameters for recording a matched gateway payment.
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub contract_id: Uuid,
    pub booking_id: String,
    pub payment_schedule_index: i32,
    pub payment_code: String,
    pub amount: i64,
    pub scheduled_amount: i64,
    pub gateway: String,
    pub gateway_transaction_id: String,
    pub reference_code: Option<String>,
    pub transaction_date: DateTime<Utc>,
    pub raw_payload: Value,
}

/// Insert an audit row unless one already exists for the same installment
/// or the same gateway transaction.
///
/// Returns `None` when the row was deduplicated.
pub async fn insert_payment<'e, E>(executor: E, new: &NewPayment) -> Result<Option<Payment>>
where
    E: PgExecutor<'e>,
{
    let payment = sqlx::query_as::<_, Payment>(
        "INSERT INTO payments \
             (contract_id, booking_id, payment_schedule_index, payment_code, amount, \
              scheduled_amount, gateway, gateway_transaction_id, reference_code, \
              transaction_date, raw_payload) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
         ON CONFLICT DO NOTHING \
         RETURNING *",
    )
    .bind(new.contract_id)
    .bind(&new.booking_id)
    .bind(new.payment_schedule_index)
    .bind(&new.payment_code)
    .bind(new.amount)
    .bind(new.scheduled_amount)
    .bind(&new.gateway)
    .bind(&new.gateway_transaction_id)
    .bind(&new.reference_code)
    .bind(new.transaction_date)
    .bind(&new.raw_payload)
    .fetch_optional(executor)
    .await
    .with_context(|| {
        format!(
            "failed to insert payment for contract {} installment {}",
            new.contract_id, new.payment_schedule_index
        )
    })?;

    Ok(payment)
}

/// List the audit rows of a contract in installment order.
pub async fn list_payments_for_contract(pool: &PgPool, contract_id: Uuid) -> Result<Vec<Payment>> {
    let payments = sqlx::query_as::<_, Payment>(
        "SELECT * FROM payments WHERE contract_id = $1 ORDER BY payment_schedule_index ASC",
    )
    .bind(contract_id)
    .fetch_all(pool)
    .await
    .context("failed to list payments for contract")?;

    Ok(payments)
}
