//! Email delivery backends.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde::Serialize;

use super::templates::RenderedEmail;

/// Anything that can deliver a rendered email.
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, to: &str, email: &RenderedEmail) -> Result<()>;
}

// -----------------------------------------------------------------------
// HTTP provider
// -----------------------------------------------------------------------

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
}

/// Sends through a JSON email API (`POST {endpoint}` with a bearer key),
/// compatible with Resend.
#[derive(Debug, Clone)]
pub struct HttpEmailSender {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    from: String,
}

impl HttpEmailSender {
    pub fn new(endpoint: &str, api_key: &str, from: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            api_key: api_key.to_string(),
            from: from.to_string(),
        })
    }
}

#[async_trait]
impl EmailSender for HttpEmailSender {
    async fn send(&self, to: &str, email: &RenderedEmail) -> Result<()> {
        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&SendRequest {
                from: &self.from,
                to: [to],
                subject: &email.subject,
                html: &email.html,
            })
            .send()
            .await
            .with_context(|| format!("email request to {} failed", self.endpoint))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!("email provider returned {status}: {body}");
        }
        Ok(())
    }
}

// -----------------------------------------------------------------------
// Log-only
// -----------------------------------------------------------------------

/// Logs emails instead of sending them. Used when no provider is configured.
#[derive(Debug, Clone, Default)]
pub struct LogEmailSender;

#[async_trait]
impl EmailSender for LogEmailSender {
    async fn send(&self, to: &str, email: &RenderedEmail) -> Result<()> {
        tracing::info!(to, subject = %email.subject, "email delivery skipped (log sender)");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_shape() {
        let body = serde_json::to_value(SendRequest {
            from: "Pladivo <no-reply@pladivo.vn>",
            to: ["a@example.com"],
            subject: "Hi",
            html: "<p>Hi</p>",
        })
        .unwrap();
        assert_eq!(body["to"], serde_json::json!(["a@example.com"]));
        assert_eq!(body["from"], "Pladivo <no-reply@pladivo.vn>");
    }

    #[tokio::test]
    async fn log_sender_always_succeeds() {
        let email = RenderedEmail {
            subject: "s".into(),
            html: "h".into(),
        };
        LogEmailSender.send("a@example.com", &email).await.unwrap();
    }

    #[tokio::test]
    async fn http_sender_reports_connection_failure() {
        // Port 9 (discard) on localhost is not an HTTP server.
        let sender = HttpEmailSender::new("http://127.0.0.1:9/emails", "key", "from@x").unwrap();
        let email = RenderedEmail {
            subject: "s".into(),
            html: "h".into(),
        };
        assert!(sender.send("a@example.com", &email).await.is_err());
    }
}
