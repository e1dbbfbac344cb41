// Delivery of rendered messages to the configured provider

use super::types::{EmailError, EmailMessage, ResendEmailPayload};
use crate::app_config::EmailProvider;
use rand::Rng;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

const MAX_RETRY_DELAY: Duration = Duration::from_secs(60);

#[derive(Clone)]
pub struct EmailSender {
    client: Arc<Client>,
    provider: EmailProvider,
    api_key: String,
    api_url: String,
    max_retries: u32,
    retry_delay: Duration,
}

impl EmailSender {
    pub fn new(provider: EmailProvider, api_key: String, api_url: String) -> Self {
        Self {
            client: Arc::new(Client::new()),
            provider,
            api_key,
            api_url,
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Send one message without retrying
    #[instrument(skip(self, message), fields(to = ?message.to, subject = %message.subject))]
    pub async fn send(&self, message: EmailMessage) -> Result<(), EmailError> {
        match self.provider {
            EmailProvider::Log => {
                info!(
                    target: "email",
                    to = ?message.to,
                    subject = %message.subject,
                    body = message.text.as_deref().unwrap_or(""),
                    "Email delivery disabled, message logged"
                );
                Ok(())
            },
            EmailProvider::Resend => self.send_resend(message).await,
        }
    }

    async fn send_resend(&self, message: EmailMessage) -> Result<(), EmailError> {
        let payload: ResendEmailPayload = message.into();

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await;

        match response {
            Ok(res) if res.status().is_success() => {
                info!("Email sent successfully");
                Ok(())
            },
            Ok(res) => {
                let status = res.status();
                let error_text = res
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unknown error".to_string());

                error!(
                    "Failed to send email. Status: {}, Error: {}",
                    status, error_text
                );

                if status.as_u16() == 429 {
                    Err(EmailError::RateLimitExceeded)
                } else if status.is_server_error() {
                    Err(EmailError::ServiceUnavailable)
                } else {
                    Err(EmailError::SendError(format!(
                        "Email send failed with status {}: {}",
                        status, error_text
                    )))
                }
            },
            Err(e) => {
                error!("Network error while sending email: {:?}", e);
                Err(EmailError::SendError(format!("Network error: {}", e)))
            },
        }
    }

    /// Send with exponential backoff; provider rate limits are not retried
    pub async fn send_with_retry(&self, message: EmailMessage) -> Result<(), EmailError> {
        let mut last_error = None;

        for attempt in 1..=self.max_retries {
            match self.send(message.clone()).await {
                Ok(()) => return Ok(()),
                Err(EmailError::RateLimitExceeded) => {
                    warn!("Email provider rate limit hit, not retrying");
                    return Err(EmailError::RateLimitExceeded);
                },
                Err(e) => {
                    warn!("Email send attempt {} failed: {:?}", attempt, e);
                    last_error = Some(e);

                    if attempt < self.max_retries {
                        let delay = backoff_delay(self.retry_delay, attempt);
                        let jitter =
                            rand::thread_rng().gen_range(0..=(delay.as_millis() / 4) as u64);
                        tokio::time::sleep(delay + Duration::from_millis(jitter)).await;
                    }
                },
            }
        }

        Err(last_error.unwrap_or_else(|| {
            EmailError::SendError("Failed after maximum retry attempts".to_string())
        }))
    }
}

/// `base * 2^(attempt-1)`, capped at one minute
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let exp = 2_u32
        .checked_pow(attempt.saturating_sub(1))
        .unwrap_or(u32::MAX);
    base.checked_mul(exp)
        .unwrap_or(MAX_RETRY_DELAY)
        .min(MAX_RETRY_DELAY)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles() {
        let base = Duration::from_secs(2);
        assert_eq!(backoff_delay(base, 1), Duration::from_secs(2));
        assert_eq!(backoff_delay(base, 2), Duration::from_secs(4));
        assert_eq!(backoff_delay(base, 3), Duration::from_secs(8));
    }

    #[test]
    fn test_backoff_is_capped() {
        assert_eq!(backoff_delay(Duration::from_secs(2), 50), MAX_RETRY_DELAY);
        assert_eq!(
            backoff_delay(Duration::from_secs(u32::MAX as u64), 2),
            MAX_RETRY_DELAY
        );
    }

    #[test]
    fn test_resend_payload_omits_empty_fields() {
        let message = EmailMessage::new(
            "Marketplace <noreply@example.com>".to_string(),
            vec!["guest@example.com".to_string()],
            "Confirm your email".to_string(),
            "<p>hi</p>".to_string(),
        );

        let payload: ResendEmailPayload = message.into();
        let json = serde_json::to_value(&payload).unwrap();
        assert!(json.get("text").is_none());
        assert!(json.get("reply_to").is_none());
        assert_eq!(json["to"][0], "guest@example.com");
    }

    #[tokio::test]
    async fn test_log_provider_always_succeeds() {
        let sender = EmailSender::new(EmailProvider::Log, String::new(), String::new());
        let message = EmailMessage::new(
            "noreply@example.com".to_string(),
            vec!["guest@example.com".to_string()],
            "Subject".to_string(),
            "<p>body</p>".to_string(),
        );

        assert!(sender.send_with_retry(message).await.is_ok());
    }
}
