// Transactional email: templates, builders and provider delivery

pub mod builders;
pub mod sender;
pub mod types;

use self::types::EmailBuilder;
use crate::app_config::EmailConfig;
use crate::models::{Booking, Listing};
use builders::{
    BookingConfirmationEmailBuilder, PasswordResetEmailBuilder, TwoFactorEmailBuilder,
    VerificationEmailBuilder,
};
use handlebars::Handlebars;
use sender::EmailSender;
use std::sync::Arc;
use tracing::{info, instrument};

pub use types::{EmailError, EmailMessage};

#[derive(Clone)]
pub struct EmailService {
    sender: EmailSender,
    config: EmailConfig,
    templates: Arc<Handlebars<'static>>,
}

impl EmailService {
    pub fn new(config: EmailConfig) -> Result<Self, EmailError> {
        let mut templates = Handlebars::new();
        templates.set_strict_mode(true);
        Self::register_templates(&mut templates)?;

        let sender = EmailSender::new(
            config.provider.clone(),
            config.resend_api_key.clone(),
            config.resend_api_url.clone(),
        )
        .with_max_retries(3)
        .with_retry_delay(std::time::Duration::from_secs(1));

        Ok(Self {
            sender,
            config,
            templates: Arc::new(templates),
        })
    }

    fn register_templates(templates: &mut Handlebars) -> Result<(), EmailError> {
        let sources = [
            (
                "verification",
                include_str!("../../../templates/email/verification.html"),
            ),
            (
                "password_reset",
                include_str!("../../../templates/email/password_reset.html"),
            ),
            (
                "two_factor",
                include_str!("../../../templates/email/two_factor.html"),
            ),
            (
                "booking_confirmation",
                include_str!("../../../templates/email/booking_confirmation.html"),
            ),
        ];

        for (name, source) in sources {
            templates
                .register_template_string(name, source)
                .map_err(|e| EmailError::TemplateError(e.to_string()))?;
        }

        Ok(())
    }

    #[instrument(skip(self, token))]
    pub async fn send_verification_email(
        &self,
        to_email: &str,
        user_name: &str,
        token: &str,
    ) -> Result<(), EmailError> {
        info!("Sending verification email to {}", to_email);

        let message = VerificationEmailBuilder::new(
            to_email,
            user_name,
            token,
            &self.config,
            &self.templates,
        )
        .build()?;
        self.sender.send_with_retry(message).await
    }

    #[instrument(skip(self, reset_token))]
    pub async fn send_password_reset_email(
        &self,
        to_email: &str,
        user_name: &str,
        reset_token: &str,
    ) -> Result<(), EmailError> {
        info!("Sending password reset email to {}", to_email);

        let message = PasswordResetEmailBuilder::new(
            to_email,
            user_name,
            reset_token,
            &self.config,
            &self.templates,
        )
        .build()?;
        self.sender.send_with_retry(message).await
    }

    /// Sign-in codes expire in minutes, so they are sent once without retry
    #[instrument(skip(self, code))]
    pub async fn send_two_factor_email(&self, to_email: &str, code: &str) -> Result<(), EmailError> {
        let message =
            TwoFactorEmailBuilder::new(to_email, code, &self.config, &self.templates).build()?;
        self.sender.send(message).await
    }

    #[instrument(skip(self, booking, listing), fields(booking_id = %booking.id))]
    pub async fn send_booking_confirmation(
        &self,
        to_email: &str,
        user_name: &str,
        booking: &Booking,
        listing: &Listing,
        currency: &str,
    ) -> Result<(), EmailError> {
        let message = BookingConfirmationEmailBuilder::new(
            to_email,
            user_name,
            booking,
            listing,
            currency,
            &self.config,
            &self.templates,
        )
        .build()?;
        self.sender.send_with_retry(message).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app_config::EmailProvider;
    use chrono::{NaiveDate, Utc};
    use uuid::Uuid;

    fn test_config() -> EmailConfig {
        EmailConfig {
            provider: EmailProvider::Log,
            resend_api_key: "test_key".to_string(),
            resend_api_url: "https://api.resend.com/emails".to_string(),
            from_email: "noreply@test.com".to_string(),
            from_name: "Test Marketplace".to_string(),
            support_email: "support@test.com".to_string(),
            frontend_url: "https://app.test.com/".to_string(),
        }
    }

    #[test]
    fn test_templates_register() {
        assert!(EmailService::new(test_config()).is_ok());
    }

    #[test]
    fn test_verification_email_contains_link() {
        let service = EmailService::new(test_config()).unwrap();
        let message = VerificationEmailBuilder::new(
            "guest@example.com",
            "Guest",
            "abc123",
            &service.config,
            &service.templates,
        )
        .build()
        .unwrap();

        let link = "https://app.test.com/auth/new-verification?token=abc123";
        assert!(message.html.contains(link));
        assert!(message.text.unwrap().contains(link));
        assert_eq!(message.to, vec!["guest@example.com"]);
        assert_eq!(message.from, "Test Marketplace <noreply@test.com>");
    }

    #[test]
    fn test_two_factor_email_contains_code() {
        let service = EmailService::new(test_config()).unwrap();
        let message = TwoFactorEmailBuilder::new(
            "guest@example.com",
            "042917",
            &service.config,
            &service.templates,
        )
        .build()
        .unwrap();

        assert!(message.html.contains("042917"));
        assert_eq!(message.subject, "2FA Code");
    }

    #[test]
    fn test_booking_confirmation_renders_amount() {
        let service = EmailService::new(test_config()).unwrap();
        let now = Utc::now();
        let listing = Listing {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            title: "Sunset kayak tour".into(),
            description: "Paddle the bay".into(),
            image_src: "https://img.test/kayak.jpg".into(),
            category: "water".into(),
            location: "Lisbon".into(),
            price_cents: 4500,
            max_guests: 6,
            created_at: now,
            updated_at: now,
        };
        let booking = Booking {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            listing_id: listing.id,
            start_date: NaiveDate::from_ymd_opt(2030, 6, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2030, 6, 3).unwrap(),
            guest_count: 2,
            total_price_cents: 18000,
            status: "confirmed".into(),
            created_at: now,
            updated_at: now,
        };

        let message = BookingConfirmationEmailBuilder::new(
            "guest@example.com",
            "Guest",
            &booking,
            &listing,
            "usd",
            &service.config,
            &service.templates,
        )
        .build()
        .unwrap();

        assert!(message.html.contains("180.00 USD"));
        assert!(message.html.contains("2030-06-01"));
        assert!(message.subject.contains("Sunset kayak tour"));
    }
}
