//! `pladivo outbox` commands: inspect and requeue queued emails.

use anyhow::Result;
use sqlx::PgPool;

use pladivo_db::models::OutboxStatus;
use pladivo_db::queries::outbox as outbox_db;

/// List every outbox message, oldest first.
pub async fn run_list(pool: &PgPool) -> Result<()> {
    let messages = outbox_db::list_messages(pool, None).await?;

    if messages.is_empty() {
        println!("Outbox is empty.");
        return Ok(());
    }

    println!(
        "{:<36}  {:<18}  {:<8}  {:>8}  {:<20}  RECIPIENT",
        "ID", "KIND", "STATUS", "ATTEMPTS", "NEXT ATTEMPT"
    );
    for m in &messages {
        let next = if m.status == OutboxStatus::Pending {
            m.next_attempt_at.format("%Y-%m-%d %H:%M:%S").to_string()
        } else {
            "-".to_string()
        };
        println!(
            "{:<36}  {:<18}  {:<8}  {:>3}/{:<4}  {:<20}  {}",
            m.id, m.kind, m.status, m.attempts, m.max_attempts, next, m.recipient
        );
        if m.status == OutboxStatus::Dead {
            if let Some(err) = &m.last_error {
                println!("    last error: {err}");
            }
        }
    }

    Ok(())
}

/// Requeue every dead message.
pub async fn run_retry_dead(pool: &PgPool) -> Result<()> {
    let requeued = outbox_db::requeue_dead(pool).await?;
    tracing::info!(requeued, "dead outbox messages requeued");
    println!("Requeued {requeued} dead message(s).");
    Ok(())
}
