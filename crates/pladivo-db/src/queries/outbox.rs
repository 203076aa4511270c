//! Database query functions for the `outbox_messages` table.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

use crate::models::{OutboxMessage, OutboxStatus};

/// Queue a message for delivery. Intended to run inside the transaction that
/// made the state change the message announces.
pub async fn enqueue<'e, E>(
    executor: E,
    kind: &str,
    recipient: &str,
    payload: &Value,
    max_attempts: i32,
) -> Result<OutboxMessage>
where
    E: PgExecutor<'e>,
{
    let message = sqlx::query_as::<_, OutboxMessage>(
        "INSERT INTO outbox_messages (kind, recipient, payload, max_attempts) \
         VALUES ($1, $2, $3, $4) \
         RETURNING *",
    )
    .bind(kind)
    .bind(recipient)
    .bind(payload)
    .bind(max_attempts)
    .fetch_one(executor)
    .await
    .with_context(|| format!("failed to enqueue {kind} message"))?;

    Ok(message)
}

/// Claim up to `limit` due messages by pushing their `next_attempt_at`
/// forward by `lease_secs`. The claim commits on its own, so delivery runs
/// outside any transaction; a worker that dies mid-batch leaves its rows to
/// be picked up again once the lease expires.
pub async fn claim_due<'e, E>(executor: E, limit: i64, lease_secs: f64) -> Result<Vec<OutboxMessage>>
where
    E: PgExecutor<'e>,
{
    let messages = sqlx::query_as::<_, OutboxMessage>(
        "UPDATE outbox_messages \
         SET next_attempt_at = now() + $2::float8 * interval '1 second' \
         WHERE id IN ( \
             SELECT id FROM outbox_messages \
             WHERE status = 'pending' AND next_attempt_at <= now() \
             ORDER BY next_attempt_at ASC \
             LIMIT $1 \
             FOR UPDATE SKIP LOCKED \
         ) \
         RETURNING *",
    )
    .bind(limit)
    .bind(lease_secs)
    .fetch_all(executor)
    .await
    .context("failed to claim due outbox messages")?;

    Ok(messages)
}

/// Mark a message delivered.
pub async fn mark_sent<'e, E>(executor: E, id: Uuid) -> Result<()>
where
    E: PgExecutor<'e>,
{
    sqlx::query(
        "UPDATE outbox_messages \
         SET status = 'sent', attempts = attempts + 1, sent_at = now(), last_error = NULL \
         WHERE id = $1 AND status = 'pending'",
    )
    .bind(id)
    .execute(executor)
    .await
    .context("failed to mark outbox message sent")?;

    Ok(())
}

/// Record a failed delivery attempt. The message becomes `dead` when
/// `next_attempt_at` is `None`.
pub async fn mark_failed<'e, E>(
    executor: E,
    id: Uuid,
    error: &str,
    next_attempt_at: Option<DateTime<Utc>>,
) -> Result<()>
where
    E: PgExecutor<'e>,
{
    sqlx::query(
        "UPDATE outbox_messages \
         SET attempts = attempts + 1, \
             last_error = $1, \
             status = CASE WHEN $2::timestamptz IS NULL THEN 'dead' ELSE 'pending' END, \
             next_attempt_at = COALESCE($2, next_attempt_at) \
         WHERE id = $3",
    )
    .bind(error)
    .bind(next_attempt_at)
    .bind(id)
    .execute(executor)
    .await
    .context("failed to record outbox delivery failure")?;

    Ok(())
}

/// Put every `dead` message back in the queue with a fresh attempt budget.
pub async fn requeue_dead(pool: &PgPool) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE outbox_messages \
         SET status = 'pending', attempts = 0, next_attempt_at = now() \
         WHERE status = 'dead'",
    )
    .execute(pool)
    .await
    .context("failed to requeue dead outbox messages")?;

    Ok(result.rows_affected())
}

/// List messages, oldest first, optionally filtered by status.
pub async fn list_messages(
    pool: &PgPool,
    status: Option<OutboxStatus>,
) -> Result<Vec<OutboxMessage>> {
    let messages = sqlx::query_as::<_, OutboxMessage>(
        "SELECT * FROM outbox_messages \
         WHERE ($1::text IS NULL OR status = $1) \
         ORDER BY created_at ASC",
    )
    .bind(status)
    .fetch_all(pool)
    .await
    .context("failed to list outbox messages")?;

    Ok(messages)
}
