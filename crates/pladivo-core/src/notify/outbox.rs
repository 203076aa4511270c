//! Background delivery of queued emails.
//!
//! The worker leases due rows with a short `FOR UPDATE SKIP LOCKED` claim,
//! so several server instances can poll the same table without sending
//! twice, and no transaction stays open while the provider is called. Each
//! outcome is written on its own. A failed delivery is rescheduled with
//! exponential backoff until the row's `max_attempts` is used up, after
//! which it is parked as `dead`.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;

use pladivo_db::models::OutboxMessage;
use pladivo_db::queries::outbox as db;

use super::EmailMessage;
use super::sender::EmailSender;
use super::templates;

/// Configuration for the outbox worker.
#[derive(Debug, Clone)]
pub struct OutboxConfig {
    /// Sleep between polls when the queue is empty.
    pub poll_interval: Duration,
    /// Maximum rows claimed per poll.
    pub batch_size: i64,
    /// Delay after the first failure; doubled per further failure.
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    /// How long a claimed batch is hidden from other workers.
    pub lease: Duration,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            batch_size: 20,
            base_backoff: Duration::from_secs(30),
            max_backoff: Duration::from_secs(3600),
            lease: Duration::from_secs(300),
        }
    }
}

impl OutboxConfig {
    /// Delay before the next attempt, given how many attempts have failed.
    pub fn backoff(&self, failed_attempts: i32) -> Duration {
        let exponent = u32::try_from(failed_attempts.saturating_sub(1)).unwrap_or(0).min(30);
        self.base_backoff
            .saturating_mul(2_u32.saturating_pow(exponent))
            .min(self.max_backoff)
    }
}

/// Counts from one drain pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainStats {
    pub sent: usize,
    pub retried: usize,
    pub dead: usize,
}

impl DrainStats {
    pub fn total(&self) -> usize {
        self.sent + self.retried + self.dead
    }
}

pub struct OutboxWorker {
    pool: PgPool,
    sender: Arc<dyn EmailSender>,
    config: OutboxConfig,
}

impl OutboxWorker {
    pub fn new(pool: PgPool, sender: Arc<dyn EmailSender>, config: OutboxConfig) -> Self {
        Self {
            pool,
            sender,
            config,
        }
    }

    /// Claim one batch of due messages and attempt each once.
    pub async fn run_once(&self) -> Result<DrainStats> {
        let mut stats = DrainStats::default();

        let due = db::claim_due(&self.pool, self.config.batch_size, self.config.lease.as_secs_f64())
            .await?;
        for message in &due {
            match self.deliver(message).await {
                Ok(()) => {
                    db::mark_sent(&self.pool, message.id).await?;
                    stats.sent += 1;
                    tracing::info!(
                        message_id = %message.id,
                        kind = %message.kind,
                        recipient = %message.recipient,
                        "email delivered"
                    );
                }
                Err(e) => {
                    let failed = message.attempts + 1;
                    let error = format!("{e:#}");
                    if failed >= message.max_attempts {
                        db::mark_failed(&self.pool, message.id, &error, None).await?;
                        stats.dead += 1;
                        tracing::error!(
                            message_id = %message.id,
                            kind = %message.kind,
                            attempts = failed,
                            error = %error,
                            "email delivery gave up"
                        );
                    } else {
                        let delay = self.config.backoff(failed);
                        let next = Utc::now()
                            + chrono::Duration::from_std(delay)
                                .unwrap_or_else(|_| chrono::Duration::hours(1));
                        db::mark_failed(&self.pool, message.id, &error, Some(next)).await?;
                        stats.retried += 1;
                        tracing::warn!(
                            message_id = %message.id,
                            kind = %message.kind,
                            attempts = failed,
                            retry_in_secs = delay.as_secs(),
                            error = %error,
                            "email delivery failed, will retry"
                        );
                    }
                }
            }
        }

        Ok(stats)
    }

    async fn deliver(&self, message: &OutboxMessage) -> Result<()> {
        let email: EmailMessage = serde_json::from_value(message.payload.clone())?;
        let rendered = templates::render(&email);
        self.sender.send(&message.recipient, &rendered).await
    }

    /// Poll until `cancel` fires. A full batch is followed immediately by
    /// another poll; otherwise the worker sleeps `poll_interval`.
    pub async fn run(self, cancel: CancellationToken) {
        tracing::info!(
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            batch_size = self.config.batch_size,
            "outbox worker started"
        );

        loop {
            if cancel.is_cancelled() {
                break;
            }

            let busy = match self.run_once().await {
                Ok(stats) => stats.total() as i64 >= self.config.batch_size,
                Err(e) => {
                    tracing::error!(error = %format!("{e:#}"), "outbox poll failed");
                    false
                }
            };
            if busy {
                continue;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.poll_interval) => {}
                _ = cancel.cancelled() => break,
            }
        }

        tracing::info!("outbox worker stopped");
    }
}
