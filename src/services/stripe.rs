// Stripe REST client and webhook signature verification

use async_trait::async_trait;
use reqwest::Client;
use ring::hmac;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, instrument};
use uuid::Uuid;

use crate::app_config::StripeConfig;
use crate::utils::tokens::constant_time_eq;

#[derive(Error, Debug)]
pub enum StripeError {
    #[error("Stripe request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Stripe API error ({status}): {message}")]
    Api { status: u16, message: String },
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum WebhookError {
    #[error("Missing Stripe-Signature header")]
    MissingSignature,

    #[error("Malformed Stripe-Signature header")]
    MalformedHeader,

    #[error("Webhook timestamp outside tolerance")]
    TimestampOutOfTolerance,

    #[error("Webhook signature mismatch")]
    SignatureMismatch,

    #[error("Invalid webhook payload")]
    InvalidPayload,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub client_secret: Option<String>,
    pub amount: i64,
    pub currency: String,
    pub status: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Refund {
    pub id: String,
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: Option<String>,
}

/// Parameters for a new payment intent
#[derive(Debug, Clone)]
pub struct NewPaymentIntent {
    pub amount_cents: i64,
    pub currency: String,
    pub booking_id: Uuid,
    pub user_id: Uuid,
}

impl NewPaymentIntent {
    /// Form fields in Stripe's bracket notation
    pub fn form(&self) -> Vec<(String, String)> {
        vec![
            ("amount".into(), self.amount_cents.to_string()),
            ("currency".into(), self.currency.clone()),
            ("automatic_payment_methods[enabled]".into(), "true".into()),
            ("metadata[booking_id]".into(), self.booking_id.to_string()),
            ("metadata[user_id]".into(), self.user_id.to_string()),
        ]
    }
}

/// Payment provider operations used by bookings and payments
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_payment_intent(
        &self,
        intent: &NewPaymentIntent,
        idempotency_key: &str,
    ) -> Result<PaymentIntent, StripeError>;

    async fn retrieve_payment_intent(
        &self,
        payment_intent_id: &str,
    ) -> Result<PaymentIntent, StripeError>;

    async fn refund_payment_intent(
        &self,
        payment_intent_id: &str,
        idempotency_key: &str,
    ) -> Result<Refund, StripeError>;

    /// Void an intent that has not been paid yet
    async fn cancel_payment_intent(
        &self,
        payment_intent_id: &str,
        idempotency_key: &str,
    ) -> Result<PaymentIntent, StripeError>;
}

#[derive(Clone)]
pub struct StripeClient {
    client: Client,
    secret_key: String,
    api_url: String,
}

impl StripeClient {
    pub fn new(config: &StripeConfig) -> Result<Self, StripeError> {
        let client = Client::builder().timeout(Duration::from_secs(15)).build()?;

        Ok(Self {
            client,
            secret_key: config.secret_key.clone(),
            api_url: config.api_url.trim_end_matches('/').to_string(),
        })
    }

    async fn post_form<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        form: &[(String, String)],
        idempotency_key: &str,
    ) -> Result<T, StripeError> {
        let response = self
            .client
            .post(format!("{}{}", self.api_url, path))
            .bearer_auth(&self.secret_key)
            .header("Idempotency-Key", idempotency_key)
            .form(form)
            .send()
            .await?;

        Self::parse_response(path, response).await
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, StripeError> {
        let response = self
            .client
            .get(format!("{}{}", self.api_url, path))
            .bearer_auth(&self.secret_key)
            .send()
            .await?;

        Self::parse_response(path, response).await
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(
        path: &str,
        response: reqwest::Response,
    ) -> Result<T, StripeError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<T>().await?);
        }

        let message = response
            .json::<ApiErrorBody>()
            .await
            .ok()
            .and_then(|body| body.error.message)
            .unwrap_or_else(|| "Unknown error".to_string());

        error!("Stripe {} failed with {}: {}", path, status, message);
        Err(StripeError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl PaymentGateway for StripeClient {
    #[instrument(skip(self, intent), fields(booking_id = %intent.booking_id))]
    async fn create_payment_intent(
        &self,
        intent: &NewPaymentIntent,
        idempotency_key: &str,
    ) -> Result<PaymentIntent, StripeError> {
        self.post_form("/payment_intents", &intent.form(), idempotency_key)
            .await
    }

    #[instrument(skip(self))]
    async fn retrieve_payment_intent(
        &self,
        payment_intent_id: &str,
    ) -> Result<PaymentIntent, StripeError> {
        self.get(&format!("/payment_intents/{}", payment_intent_id))
            .await
    }

    #[instrument(skip(self))]
    async fn refund_payment_intent(
        &self,
        payment_intent_id: &str,
        idempotency_key: &str,
    ) -> Result<Refund, StripeError> {
        let form = vec![("payment_intent".to_string(), payment_intent_id.to_string())];
        self.post_form("/refunds", &form, idempotency_key).await
    }

    #[instrument(skip(self))]
    async fn cancel_payment_intent(
        &self,
        payment_intent_id: &str,
        idempotency_key: &str,
    ) -> Result<PaymentIntent, StripeError> {
        let form = vec![(
            "cancellation_reason".to_string(),
            "requested_by_customer".to_string(),
        )];
        self.post_form(
            &format!("/payment_intents/{}/cancel", payment_intent_id),
            &form,
            idempotency_key,
        )
        .await
    }
}

// =============================================================================
// WEBHOOKS
// =============================================================================

/// Event envelope; `data.object` depends on the event type
#[derive(Debug, Deserialize)]
pub struct StripeEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: StripeEventData,
}

#[derive(Debug, Deserialize)]
pub struct StripeEventData {
    pub object: serde_json::Value,
}

impl StripeEvent {
    /// Payment intent id the event refers to
    pub fn payment_intent_id(&self) -> Option<&str> {
        let object = &self.data.object;
        match self.event_type.as_str() {
            // charge objects reference their intent
            t if t.starts_with("charge.") => object.get("payment_intent")?.as_str(),
            _ => object.get("id")?.as_str(),
        }
    }

    pub fn failure_message(&self) -> Option<String> {
        self.data
            .object
            .get("last_payment_error")?
            .get("message")?
            .as_str()
            .map(str::to_string)
    }
}

fn sign(secret: &str, timestamp: i64, payload: &[u8]) -> String {
    let key = hmac::Key::new(hmac::HMAC_SHA256, secret.as_bytes());
    let mut ctx = hmac::Context::with_key(&key);
    ctx.update(timestamp.to_string().as_bytes());
    ctx.update(b".");
    ctx.update(payload);

    ctx.sign()
        .as_ref()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Verify a `Stripe-Signature` header (`t=<unix>,v1=<hex>[,v1=...]`) and
/// parse the event
pub fn verify_webhook(
    payload: &[u8],
    header: Option<&str>,
    secret: &str,
    tolerance_seconds: i64,
    now: i64,
) -> Result<StripeEvent, WebhookError> {
    let header = header.ok_or(WebhookError::MissingSignature)?;

    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => {
                timestamp = Some(
                    value
                        .parse::<i64>()
                        .map_err(|_| WebhookError::MalformedHeader)?,
                )
            },
            Some(("v1", value)) => signatures.push(value),
            _ => {},
        }
    }

    let timestamp = timestamp.ok_or(WebhookError::MalformedHeader)?;
    if signatures.is_empty() {
        return Err(WebhookError::MalformedHeader);
    }

    if now.abs_diff(timestamp) > tolerance_seconds.unsigned_abs() {
        return Err(WebhookError::TimestampOutOfTolerance);
    }

    let expected = sign(secret, timestamp, payload);
    if !signatures
        .iter()
        .any(|candidate| constant_time_eq(candidate, &expected))
    {
        return Err(WebhookError::SignatureMismatch);
    }

    serde_json::from_slice(payload).map_err(|_| WebhookError::InvalidPayload)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test_secret";
    const NOW: i64 = 1_750_000_000;

    fn payload() -> Vec<u8> {
        br#"{"id":"evt_1","type":"payment_intent.succeeded","data":{"object":{"id":"pi_123"}}}"#
            .to_vec()
    }

    fn header_for(body: &[u8], timestamp: i64) -> String {
        format!("t={},v1={}", timestamp, sign(SECRET, timestamp, body))
    }

    #[test]
    fn test_valid_signature_parses_event() {
        let body = payload();
        let header = header_for(&body, NOW);

        let event = verify_webhook(&body, Some(&header), SECRET, 300, NOW).unwrap();
        assert_eq!(event.event_type, "payment_intent.succeeded");
        assert_eq!(event.payment_intent_id(), Some("pi_123"));
    }

    #[test]
    fn test_tampered_payload_is_rejected() {
        let body = payload();
        let header = header_for(&body, NOW);
        let tampered = body.iter().map(|b| if *b == b'1' { b'2' } else { *b }).collect::<Vec<_>>();

        assert_eq!(
            verify_webhook(&tampered, Some(&header), SECRET, 300, NOW).unwrap_err(),
            WebhookError::SignatureMismatch
        );
    }

    #[test]
    fn test_stale_timestamp_is_rejected() {
        let body = payload();
        let header = header_for(&body, NOW - 301);

        assert_eq!(
            verify_webhook(&body, Some(&header), SECRET, 300, NOW).unwrap_err(),
            WebhookError::TimestampOutOfTolerance
        );
    }

    #[test]
    fn test_any_matching_v1_is_accepted() {
        let body = payload();
        let header = format!(
            "t={},v1=deadbeef,v1={}",
            NOW,
            sign(SECRET, NOW, &body)
        );

        assert!(verify_webhook(&body, Some(&header), SECRET, 300, NOW).is_ok());
    }

    #[test]
    fn test_missing_and_malformed_headers() {
        let body = payload();
        assert_eq!(
            verify_webhook(&body, None, SECRET, 300, NOW).unwrap_err(),
            WebhookError::MissingSignature
        );
        assert_eq!(
            verify_webhook(&body, Some("v1=abc"), SECRET, 300, NOW).unwrap_err(),
            WebhookError::MalformedHeader
        );
        assert_eq!(
            verify_webhook(&body, Some("t=notanumber,v1=abc"), SECRET, 300, NOW).unwrap_err(),
            WebhookError::MalformedHeader
        );
        for extreme in [i64::MIN, i64::MAX] {
            let header = format!("t={},v1=ab", extreme);
            assert_eq!(
                verify_webhook(&body, Some(&header), SECRET, 300, NOW).unwrap_err(),
                WebhookError::TimestampOutOfTolerance
            );
        }
    }

    #[test]
    fn test_charge_event_points_at_intent() {
        let event: StripeEvent = serde_json::from_str(
            r#"{"id":"evt_2","type":"charge.refunded","data":{"object":{"id":"ch_1","payment_intent":"pi_9"}}}"#,
        )
        .unwrap();
        assert_eq!(event.payment_intent_id(), Some("pi_9"));
    }

    #[test]
    fn test_failure_message() {
        let event: StripeEvent = serde_json::from_str(
            r#"{"id":"evt_3","type":"payment_intent.payment_failed","data":{"object":{"id":"pi_1","last_payment_error":{"message":"Card declined"}}}}"#,
        )
        .unwrap();
        assert_eq!(event.failure_message().as_deref(), Some("Card declined"));
    }

    #[test]
    fn test_payment_intent_form_fields() {
        let booking_id = Uuid::new_v4();
        let form = NewPaymentIntent {
            amount_cents: 18000,
            currency: "usd".into(),
            booking_id,
            user_id: Uuid::new_v4(),
        }
        .form();

        assert!(form.contains(&("amount".to_string(), "18000".to_string())));
        assert!(form.contains(&("metadata[booking_id]".to_string(), booking_id.to_string())));
    }
}
