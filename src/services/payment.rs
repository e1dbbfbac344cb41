// Stripe payment intents and webhook processing

use chrono::Utc;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel::prelude::*;
use diesel_async::{
    scoped_futures::ScopedFutureExt, AsyncConnection, AsyncPgConnection, RunQueryDsl,
};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    app_config::StripeConfig,
    db::DieselPool,
    models::{
        Booking, BookingStatus, Listing, NewPayment, Payment, PaymentIntentResponse,
        PaymentStatus, SafePayment, User,
    },
    schema::payments,
    services::{
        email::EmailService,
        metrics,
        stripe::{verify_webhook, NewPaymentIntent, PaymentGateway, StripeError, StripeEvent},
    },
    utils::{
        audit_logger::{AuditAction, AuditLogger},
        service_error::ServiceError,
    },
};

/// Event types the webhook acts on
pub const EVENT_PAYMENT_SUCCEEDED: &str = "payment_intent.succeeded";
pub const EVENT_PAYMENT_FAILED: &str = "payment_intent.payment_failed";
pub const EVENT_CHARGE_REFUNDED: &str = "charge.refunded";

/// Failure reason stored on payments voided by a cancellation
pub const CANCELLED_PAYMENT_REASON: &str = "Booking cancelled";

/// What happened to the money of a cancelled booking
#[derive(Debug)]
pub enum Settlement {
    Refunded(Payment),
    Voided(Payment),
}

/// Refund or void the open payment of a booking being cancelled. Runs on the
/// caller's transaction so a provider failure rolls the cancellation back.
///
/// A pending payment is checked with the provider first: the guest may have
/// paid before the webhook arrived, in which case it is refunded.
pub async fn settle_cancelled_booking(
    tx: &mut AsyncPgConnection,
    gateway: &dyn PaymentGateway,
    booking_id: Uuid,
) -> Result<Option<Settlement>, ServiceError> {
    if let Some(payment) =
        Payment::find_for_booking(tx, booking_id, PaymentStatus::Completed).await?
    {
        return Ok(Some(Settlement::Refunded(
            refund_payment(tx, gateway, payment).await?,
        )));
    }

    let Some(payment) = Payment::find_for_booking(tx, booking_id, PaymentStatus::Pending).await?
    else {
        return Ok(None);
    };

    let intent = gateway
        .retrieve_payment_intent(&payment.provider_payment_id)
        .await
        .map_err(provider_error)?;

    match intent.status.as_str() {
        "succeeded" => Ok(Some(Settlement::Refunded(
            refund_payment(tx, gateway, payment).await?,
        ))),
        "canceled" => Ok(Some(Settlement::Voided(void_payment(tx, payment).await?))),
        _ => {
            gateway
                .cancel_payment_intent(
                    &payment.provider_payment_id,
                    &format!("cancel-{}", payment.id),
                )
                .await
                .map_err(provider_error)?;
            Ok(Some(Settlement::Voided(void_payment(tx, payment).await?)))
        },
    }
}

async fn refund_payment(
    tx: &mut AsyncPgConnection,
    gateway: &dyn PaymentGateway,
    payment: Payment,
) -> Result<Payment, ServiceError> {
    gateway
        .refund_payment_intent(&payment.provider_payment_id, &format!("refund-{}", payment.id))
        .await
        .map_err(provider_error)?;

    Ok(Payment::update_status(tx, payment.id, PaymentStatus::Refunded, None).await?)
}

async fn void_payment(
    tx: &mut AsyncPgConnection,
    payment: Payment,
) -> Result<Payment, ServiceError> {
    Ok(Payment::update_status(
        tx,
        payment.id,
        PaymentStatus::Failed,
        Some(CANCELLED_PAYMENT_REASON.to_string()),
    )
    .await?)
}

fn provider_error(e: StripeError) -> ServiceError {
    ServiceError::PaymentError(e.to_string())
}

/// Result of applying one webhook event
#[derive(Debug)]
enum WebhookOutcome {
    Ignored,
    Completed { payment: Payment, booking: Option<Booking> },
    Failed(Payment),
    Refunded(Payment),
}

#[derive(Clone)]
pub struct PaymentService {
    diesel_pool: DieselPool,
    gateway: Arc<dyn PaymentGateway>,
    email_service: Arc<EmailService>,
    currency: String,
    webhook_secret: String,
    webhook_tolerance_seconds: i64,
}

impl PaymentService {
    pub fn new(
        diesel_pool: DieselPool,
        gateway: Arc<dyn PaymentGateway>,
        email_service: Arc<EmailService>,
        config: &StripeConfig,
    ) -> Self {
        Self {
            diesel_pool,
            gateway,
            email_service,
            currency: config.currency.to_lowercase(),
            webhook_secret: config.webhook_secret.clone(),
            webhook_tolerance_seconds: config.webhook_tolerance_seconds,
        }
    }

    /// Payment intent for a pending booking of the caller. An existing
    /// pending payment is reused so retries do not create new charges.
    #[instrument(skip(self))]
    pub async fn create_payment_intent(
        &self,
        user_id: Uuid,
        booking_id: Uuid,
    ) -> Result<PaymentIntentResponse, ServiceError> {
        let mut conn = self.diesel_pool.get().await?;

        let booking = Booking::find_by_id(&mut conn, booking_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Booking"))?;

        if booking.user_id != user_id {
            warn!(%user_id, %booking_id, "Payment for another user's booking refused");
            return Err(ServiceError::Forbidden(
                "You can only pay for your own bookings".to_string(),
            ));
        }

        if booking.status_enum() != BookingStatus::Pending {
            return Err(ServiceError::ValidationError(
                "Only pending bookings can be paid".to_string(),
            ));
        }

        if let Some(existing) =
            Payment::find_for_booking(&mut conn, booking.id, PaymentStatus::Pending).await?
        {
            let intent = self
                .gateway
                .retrieve_payment_intent(&existing.provider_payment_id)
                .await
                .map_err(|e| ServiceError::PaymentError(e.to_string()))?;

            debug!("Reusing payment {} for booking {}", existing.id, booking.id);
            return intent_response(existing, intent.client_secret);
        }

        let intent = self
            .gateway
            .create_payment_intent(
                &NewPaymentIntent {
                    amount_cents: booking.total_price_cents,
                    currency: self.currency.clone(),
                    booking_id: booking.id,
                    user_id,
                },
                &booking.id.to_string(),
            )
            .await
            .map_err(|e| ServiceError::PaymentError(e.to_string()))?;

        let new_payment = NewPayment {
            booking_id: booking.id,
            user_id,
            provider_payment_id: intent.id.clone(),
            amount_cents: intent.amount,
            currency: intent.currency.clone(),
            status: PaymentStatus::Pending.as_str().to_string(),
        };

        let payment = match diesel::insert_into(payments::table)
            .values(&new_payment)
            .returning(Payment::as_returning())
            .get_result(&mut conn)
            .await
        {
            Ok(payment) => {
                AuditLogger::log(
                    AuditAction::PaymentCreated,
                    Some(user_id),
                    payment.id,
                    Some(format!("{} {}", payment.amount_cents, payment.currency)),
                );
                payment
            },
            // the idempotency key returned an intent a concurrent request already stored
            Err(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
                payments::table
                    .filter(payments::provider_payment_id.eq(&intent.id))
                    .select(Payment::as_select())
                    .first(&mut conn)
                    .await?
            },
            Err(e) => return Err(e.into()),
        };

        intent_response(payment, intent.client_secret)
    }

    /// Verify and apply a webhook delivery. Unknown events and payments are
    /// acknowledged without changes.
    #[instrument(skip(self, payload, signature))]
    pub async fn handle_webhook(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> Result<(), ServiceError> {
        let event = verify_webhook(
            payload,
            signature,
            &self.webhook_secret,
            self.webhook_tolerance_seconds,
            Utc::now().timestamp(),
        )
        .map_err(|e| {
            warn!("Rejected webhook: {}", e);
            metrics::record_webhook("rejected");
            ServiceError::ValidationError(e.to_string())
        })?;

        info!(event_id = %event.id, event_type = %event.event_type, "Stripe webhook received");

        match self.apply_event(&event).await? {
            WebhookOutcome::Ignored => metrics::record_webhook("ignored"),
            WebhookOutcome::Completed { payment, booking } => {
                metrics::record_webhook("completed");
                AuditLogger::log(AuditAction::PaymentCompleted, None, payment.id, None);
                if let Some(booking) = booking {
                    AuditLogger::log(AuditAction::BookingConfirmed, None, booking.id, None);
                    self.notify_confirmed(&booking, &payment.currency).await;
                }
            },
            WebhookOutcome::Failed(payment) => {
                metrics::record_webhook("failed");
                AuditLogger::log(
                    AuditAction::PaymentFailed,
                    None,
                    payment.id,
                    payment.failure_reason.clone(),
                );
            },
            WebhookOutcome::Refunded(payment) => {
                metrics::record_webhook("refunded");
                AuditLogger::log(AuditAction::PaymentRefunded, None, payment.id, None);
            },
        }

        Ok(())
    }

    async fn apply_event(&self, event: &StripeEvent) -> Result<WebhookOutcome, ServiceError> {
        let event_type = event.event_type.as_str();
        if ![EVENT_PAYMENT_SUCCEEDED, EVENT_PAYMENT_FAILED, EVENT_CHARGE_REFUNDED]
            .contains(&event_type)
        {
            debug!("Ignoring Stripe event type {}", event_type);
            return Ok(WebhookOutcome::Ignored);
        }

        let Some(intent_id) = event.payment_intent_id().map(str::to_string) else {
            warn!("Stripe event {} has no payment intent", event.id);
            return Ok(WebhookOutcome::Ignored);
        };
        let failure_reason = event.failure_message();
        let event_type = event_type.to_string();

        let mut conn = self.diesel_pool.get().await?;
        let gateway = self.gateway.clone();

        conn.transaction::<_, ServiceError, _>(|tx| {
            async move {
                let Some(payment) = Payment::lock_by_provider_id(tx, &intent_id).await? else {
                    warn!("Stripe event for unknown payment intent {}", intent_id);
                    return Ok(WebhookOutcome::Ignored);
                };
                let current = payment.status_enum();

                match event_type.as_str() {
                    EVENT_PAYMENT_SUCCEEDED => {
                        if current != Some(PaymentStatus::Pending) && current != Some(PaymentStatus::Failed) {
                            debug!("Payment {} already {}", payment.id, payment.status);
                            return Ok(WebhookOutcome::Ignored);
                        }

                        let booking = Booking::find_by_id(tx, payment.booking_id).await?;
                        if let Some(b) = booking.as_ref().filter(|b| b.status_enum() == BookingStatus::Cancelled) {
                            // paid after the booking was cancelled
                            warn!("Payment {} succeeded for cancelled booking {}, refunding", payment.id, b.id);
                            let payment = refund_payment(tx, gateway.as_ref(), payment).await?;
                            return Ok(WebhookOutcome::Refunded(payment));
                        }

                        let payment =
                            Payment::update_status(tx, payment.id, PaymentStatus::Completed, None)
                                .await?;

                        let booking = match booking {
                            Some(b) if b.status_enum() == BookingStatus::Pending => {
                                Some(Booking::set_status(tx, b.id, BookingStatus::Confirmed).await?)
                            },
                            Some(b) => {
                                warn!("Payment completed for booking {} in status {}", b.id, b.status);
                                None
                            },
                            None => None,
                        };

                        Ok(WebhookOutcome::Completed { payment, booking })
                    },
                    EVENT_PAYMENT_FAILED => {
                        if current != Some(PaymentStatus::Pending) {
                            return Ok(WebhookOutcome::Ignored);
                        }
                        let payment = Payment::update_status(
                            tx,
                            payment.id,
                            PaymentStatus::Failed,
                            Some(failure_reason.unwrap_or_else(|| "Payment failed".to_string())),
                        )
                        .await?;
                        Ok(WebhookOutcome::Failed(payment))
                    },
                    _ => {
                        if current == Some(PaymentStatus::Refunded) {
                            return Ok(WebhookOutcome::Ignored);
                        }
                        let payment =
                            Payment::update_status(tx, payment.id, PaymentStatus::Refunded, None)
                                .await?;
                        Ok(WebhookOutcome::Refunded(payment))
                    },
                }
            }
            .scope_boxed()
        })
        .await
    }

    async fn notify_confirmed(&self, booking: &Booking, currency: &str) {
        let loaded = async {
            let mut conn = self.diesel_pool.get().await?;
            let guest = User::find_by_id(&mut conn, booking.user_id).await?;
            let listing = Listing::find_by_id(&mut conn, booking.listing_id).await?;
            Ok::<_, ServiceError>(guest.zip(listing))
        }
        .await;

        match loaded {
            Ok(Some((guest, listing))) => {
                if let Err(e) = self
                    .email_service
                    .send_booking_confirmation(&guest.email, &guest.name, booking, &listing, currency)
                    .await
                {
                    warn!("Failed to send booking confirmation for {}: {}", booking.id, e);
                }
            },
            Ok(None) => warn!("Booking {} lost its guest or listing", booking.id),
            Err(e) => error!("Could not load booking {} for confirmation: {}", booking.id, e),
        }
    }

    pub async fn get_user_payments(&self, user_id: Uuid) -> Result<Vec<SafePayment>, ServiceError> {
        let mut conn = self.diesel_pool.get().await?;
        let rows = Payment::find_by_user_id(&mut conn, user_id).await?;
        Ok(rows.into_iter().map(SafePayment::from).collect())
    }
}

fn intent_response(
    payment: Payment,
    client_secret: Option<String>,
) -> Result<PaymentIntentResponse, ServiceError> {
    let client_secret = client_secret.ok_or_else(|| {
        ServiceError::PaymentError(format!(
            "Payment intent {} has no client secret",
            payment.provider_payment_id
        ))
    })?;

    Ok(PaymentIntentResponse {
        client_secret,
        payment_id: payment.id,
        amount_cents: payment.amount_cents,
        currency: payment.currency,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payment() -> Payment {
        let now = Utc::now();
        Payment {
            id: Uuid::new_v4(),
            booking_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            provider_payment_id: "pi_42".into(),
            amount_cents: 12_000,
            currency: "usd".into(),
            status: "pending".into(),
            failure_reason: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    #[test]
    fn test_intent_response_carries_secret() {
        let payment = payment();
        let id = payment.id;
        let response = intent_response(payment, Some("pi_42_secret".into())).unwrap();

        assert_eq!(response.client_secret, "pi_42_secret");
        assert_eq!(response.payment_id, id);
        assert_eq!(response.amount_cents, 12_000);
    }

    #[test]
    fn test_intent_without_secret_is_an_error() {
        assert!(matches!(
            intent_response(payment(), None),
            Err(ServiceError::PaymentError(_))
        ));
    }
}
