//! Database query functions for the `event_contracts` table.
//!
//! The payment schedule lives inside the contract row as JSONB. Writes that
//! touch it are guarded by `version` the same way event plans are.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgExecutor;
use uuid::Uuid;

use crate::models::{ContractParty, ContractStatus, EventContract, PaymentScheduleItem};

/// Contract fields written on create and on staff edits.
#[derive(Debug, Clone)]
pub struct ContractWrite {
    pub booking_id: String,
    pub contract_number: String,
    pub title: String,
    pub party_a: ContractParty,
    pub total_value: i64,
    pub payment_schedule: Vec<PaymentScheduleItem>,
    pub created_by: Option<String>,
}

/// Insert a new contract in `draft`.
pub async fn insert_contract<'e, E>(executor: E, new: &ContractWrite) -> Result<EventContract>
where
    E: PgExecutor<'e>,
{
    let contract = sqlx::query_as::<_, EventContract>(
        "INSERT INTO event_contracts \
             (booking_id, contract_number, title, party_a, total_value, payment_schedule, created_by) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) \
         RETURNING *",
    )
    .bind(&new.booking_id)
    .bind(&new.contract_number)
    .bind(&new.title)
    .bind(Json(&new.party_a))
    .bind(new.total_value)
    .bind(Json(&new.payment_schedule))
    .bind(&new.created_by)
    .fetch_one(executor)
    .await
    .with_context(|| format!("failed to insert contract for booking {}", new.booking_id))?;

    Ok(contract)
}

/// Fetch a contract by its ID.
pub async fn get_contract<'e, E>(executor: E, id: Uuid) -> Result<Option<EventContract>>
where
    E: PgExecutor<'e>,
{
    let contract =
        sqlx::query_as::<_, EventContract>("SELECT * FROM event_contracts WHERE id = $1")
            .bind(id)
            .fetch_optional(executor)
            .await
            .context("failed to fetch contract")?;

    Ok(contract)
}

/// Fetch the contract belonging to a booking.
pub async fn get_contract_by_booking<'e, E>(
    executor: E,
    booking_id: &str,
) -> Result<Option<EventContract>>
where
    E: PgExecutor<'e>,
{
    let contract =
        sqlx::query_as::<_, EventContract>("SELECT * FROM event_contracts WHERE booking_id = $1")
            .bind(booking_id)
            .fetch_optional(executor)
            .await
            .context("failed to fetch contract by booking")?;

    Ok(contract)
}

/// Find the contract whose payment schedule contains an item carrying
/// `payment_code`.
pub async fn find_contract_by_payment_code<'e, E>(
    executor: E,
    payment_code: &str,
) -> Result<Option<EventContract>>
where
    E: PgExecutor<'e>,
{
    let needle = serde_json::json!([{ "payment_code": payment_code }]);
    let contract = sqlx::query_as::<_, EventContract>(
        "SELECT * FROM event_contracts WHERE payment_schedule @> $1 LIMIT 1",
    )
    .bind(Json(needle))
    .fetch_optional(executor)
    .await
    .with_context(|| format!("failed to look up contract by payment code {payment_code}"))?;

    Ok(contract)
}

/// Overwrite the staff-editable fields of a contract.
pub async fn update_contract_content<'e, E>(
    executor: E,
    id: Uuid,
    expected_version: i32,
    write: &ContractWrite,
) -> Result<Option<EventContract>>
where
    E: PgExecutor<'e>,
{
    let contract = sqlx::query_as::<_, EventContract>(
        "UPDATE event_contracts \
         SET contract_number = $1, \
             title = $2, \
             party_a = $3, \
             total_value = $4, \
             payment_schedule = $5, \
             version = version + 1, \
             updated_at = now() \
         WHERE id = $6 AND version = $7 \
         RETURNING *",
    )
    .bind(&write.contract_number)
    .bind(&write.title)
    .bind(Json(&write.party_a))
    .bind(write.total_value)
    .bind(Json(&write.payment_schedule))
    .bind(id)
    .bind(expected_version)
    .fetch_optional(executor)
    .await
    .with_context(|| format!("failed to update contract {id}"))?;

    Ok(contract)
}

/// Replace the payment schedule and status together.
///
/// `signed_at` only overwrites the column when `Some`.
pub async fn update_payment_schedule<'e, E>(
    executor: E,
    id: Uuid,
    expected_version: i32,
    schedule: &[PaymentScheduleItem],
    status: ContractStatus,
    signed_at: Option<DateTime<Utc>>,
) -> Result<Option<EventContract>>
where
    E: PgExecutor<'e>,
{
    let contract = sqlx::query_as::<_, EventContract>(
        "UPDATE event_contracts \
         SET payment_schedule = $1, \
             status = $2, \
             signed_at = COALESCE($3, signed_at), \
             version = version + 1, \
             updated_at = now() \
         WHERE id = $4 AND version = $5 \
         RETURNING *",
    )
    .bind(Json(schedule))
    .bind(status)
    .bind(signed_at)
    .bind(id)
    .bind(expected_version)
    .fetch_optional(executor)
    .await
    .with_context(|| format!("failed to update payment schedule of contract {id}"))?;

    Ok(contract)
}

/// Set the contract status.
pub async fn update_contract_status<'e, E>(
    executor: E,
    id: Uuid,
    expected_version: i32,
    status: ContractStatus,
) -> Result<Option<EventContract>>
where
    E: PgExecutor<'e>,
{
    let contract = sqlx::query_as::<_, EventContract>(
        "UPDATE event_contracts \
         SET status = $1, version = version + 1, updated_at = now() \
         WHERE id = $2 AND version = $3 \
         RETURNING *",
    )
    .bind(status)
    .bind(id)
    .bind(expected_version)
    .fetch_optional(executor)
    .await
    .with_context(|| format!("failed to update status of contract {id}"))?;

    Ok(contract)
}
