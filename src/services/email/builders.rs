// Builders for each kind of email the marketplace sends

use super::types::{
    BookingConfirmationData, EmailBuilder, EmailError, EmailMessage, LinkEmailData,
    TwoFactorEmailData,
};
use crate::app_config::EmailConfig;
use crate::models::{
    Booking, Listing, PASSWORD_RESET_TTL_MINUTES, TWO_FACTOR_TOKEN_TTL_MINUTES,
    VERIFICATION_TOKEN_TTL_MINUTES,
};
use handlebars::Handlebars;
use tracing::instrument;

fn sender_address(config: &EmailConfig) -> String {
    format!("{} <{}>", config.from_name, config.from_email)
}

fn render<T: serde::Serialize>(
    templates: &Handlebars<'_>,
    name: &str,
    data: &T,
) -> Result<String, EmailError> {
    templates
        .render(name, data)
        .map_err(|e| EmailError::TemplateError(e.to_string()))
}

/// Format cents as a decimal amount, e.g. `(12345, "usd")` → `123.45 USD`
pub fn format_amount(cents: i64, currency: &str) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let cents = cents.unsigned_abs();
    format!(
        "{}{}.{:02} {}",
        sign,
        cents / 100,
        cents % 100,
        currency.to_uppercase()
    )
}

/// Email confirmation link, sent on registration, unverified login and email change
pub struct VerificationEmailBuilder<'a> {
    to_email: &'a str,
    user_name: &'a str,
    token: &'a str,
    config: &'a EmailConfig,
    templates: &'a Handlebars<'a>,
}

impl<'a> VerificationEmailBuilder<'a> {
    pub fn new(
        to_email: &'a str,
        user_name: &'a str,
        token: &'a str,
        config: &'a EmailConfig,
        templates: &'a Handlebars<'a>,
    ) -> Self {
        Self {
            to_email,
            user_name,
            token,
            config,
            templates,
        }
    }

    pub fn link_url(&self) -> String {
        format!(
            "{}/auth/new-verification?token={}",
            self.config.frontend_url.trim_end_matches('/'),
            self.token
        )
    }
}

impl<'a> EmailBuilder for VerificationEmailBuilder<'a> {
    #[instrument(skip(self))]
    fn build(&self) -> Result<EmailMessage, EmailError> {
        let data = LinkEmailData {
            link_url: self.link_url(),
            user_name: self.user_name.to_string(),
            app_name: self.config.from_name.clone(),
            app_url: self.config.frontend_url.clone(),
            support_email: self.config.support_email.clone(),
            expiry_minutes: VERIFICATION_TOKEN_TTL_MINUTES as u32,
        };

        let html = render(self.templates, "verification", &data)?;
        let text = format!(
            "Hi {},\n\n\
            Confirm your email address by opening the link below:\n\n\
            {}\n\n\
            The link expires in {} minutes.\n\n\
            The {} Team",
            self.user_name, data.link_url, data.expiry_minutes, self.config.from_name
        );

        Ok(EmailMessage::new(
            sender_address(self.config),
            vec![self.to_email.to_string()],
            "Confirm your email".to_string(),
            html,
        )
        .with_text(text))
    }
}

pub struct PasswordResetEmailBuilder<'a> {
    to_email: &'a str,
    user_name: &'a str,
    reset_token: &'a str,
    config: &'a EmailConfig,
    templates: &'a Handlebars<'a>,
}

impl<'a> PasswordResetEmailBuilder<'a> {
    pub fn new(
        to_email: &'a str,
        user_name: &'a str,
        reset_token: &'a str,
        config: &'a EmailConfig,
        templates: &'a Handlebars<'a>,
    ) -> Self {
        Self {
            to_email,
            user_name,
            reset_token,
            config,
            templates,
        }
    }

    pub fn link_url(&self) -> String {
        format!(
            "{}/auth/new-password?token={}",
            self.config.frontend_url.trim_end_matches('/'),
            self.reset_token
        )
    }
}

impl<'a> EmailBuilder for PasswordResetEmailBuilder<'a> {
    #[instrument(skip(self))]
    fn build(&self) -> Result<EmailMessage, EmailError> {
        let data = LinkEmailData {
            link_url: self.link_url(),
            user_name: self.user_name.to_string(),
            app_name: self.config.from_name.clone(),
            app_url: self.config.frontend_url.clone(),
            support_email: self.config.support_email.clone(),
            expiry_minutes: PASSWORD_RESET_TTL_MINUTES as u32,
        };

        let html = render(self.templates, "password_reset", &data)?;
        let text = format!(
            "Hi {},\n\n\
            We received a request to reset your password. Set a new one here:\n\n\
            {}\n\n\
            This link expires in {} minutes and can be used once.\n\
            If you didn't request this, ignore this email.\n\n\
            The {} Team",
            self.user_name, data.link_url, data.expiry_minutes, self.config.from_name
        );

        Ok(EmailMessage::new(
            sender_address(self.config),
            vec![self.to_email.to_string()],
            "Reset your password".to_string(),
            html,
        )
        .with_text(text))
    }
}

/// Six-digit sign-in code
pub struct TwoFactorEmailBuilder<'a> {
    to_email: &'a str,
    code: &'a str,
    config: &'a EmailConfig,
    templates: &'a Handlebars<'a>,
}

impl<'a> TwoFactorEmailBuilder<'a> {
    pub fn new(
        to_email: &'a str,
        code: &'a str,
        config: &'a EmailConfig,
        templates: &'a Handlebars<'a>,
    ) -> Self {
        Self {
            to_email,
            code,
            config,
            templates,
        }
    }
}

impl<'a> EmailBuilder for TwoFactorEmailBuilder<'a> {
    #[instrument(skip(self))]
    fn build(&self) -> Result<EmailMessage, EmailError> {
        let data = TwoFactorEmailData {
            code: self.code.to_string(),
            app_name: self.config.from_name.clone(),
            support_email: self.config.support_email.clone(),
            expiry_minutes: TWO_FACTOR_TOKEN_TTL_MINUTES as u32,
        };

        let html = render(self.templates, "two_factor", &data)?;
        let text = format!(
            "Your {} sign-in code is {}.\n\nIt expires in {} minutes.",
            self.config.from_name, self.code, data.expiry_minutes
        );

        Ok(EmailMessage::new(
            sender_address(self.config),
            vec![self.to_email.to_string()],
            "2FA Code".to_string(),
            html,
        )
        .with_text(text))
    }
}

pub struct BookingConfirmationEmailBuilder<'a> {
    to_email: &'a str,
    user_name: &'a str,
    booking: &'a Booking,
    listing: &'a Listing,
    currency: &'a str,
    config: &'a EmailConfig,
    templates: &'a Handlebars<'a>,
}

impl<'a> BookingConfirmationEmailBuilder<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        to_email: &'a str,
        user_name: &'a str,
        booking: &'a Booking,
        listing: &'a Listing,
        currency: &'a str,
        config: &'a EmailConfig,
        templates: &'a Handlebars<'a>,
    ) -> Self {
        Self {
            to_email,
            user_name,
            booking,
            listing,
            currency,
            config,
            templates,
        }
    }
}

impl<'a> EmailBuilder for BookingConfirmationEmailBuilder<'a> {
    #[instrument(skip(self))]
    fn build(&self) -> Result<EmailMessage, EmailError> {
        let data = BookingConfirmationData {
            user_name: self.user_name.to_string(),
            listing_title: self.listing.title.clone(),
            location: self.listing.location.clone(),
            start_date: self.booking.start_date.format("%Y-%m-%d").to_string(),
            end_date: self.booking.end_date.format("%Y-%m-%d").to_string(),
            guest_count: self.booking.guest_count,
            total_price: format_amount(self.booking.total_price_cents, self.currency),
            bookings_url: format!(
                "{}/trips",
                self.config.frontend_url.trim_end_matches('/')
            ),
            app_name: self.config.from_name.clone(),
            support_email: self.config.support_email.clone(),
        };

        let html = render(self.templates, "booking_confirmation", &data)?;
        let text = format!(
            "Hi {},\n\n\
            Your booking of {} in {} is confirmed.\n\
            Dates: {} to {}\n\
            Guests: {}\n\
            Total paid: {}\n\n\
            The {} Team",
            data.user_name,
            data.listing_title,
            data.location,
            data.start_date,
            data.end_date,
            data.guest_count,
            data.total_price,
            data.app_name
        );

        Ok(EmailMessage::new(
            sender_address(self.config),
            vec![self.to_email.to_string()],
            format!("Booking confirmed: {}", self.listing.title),
            html,
        )
        .with_text(text))
    }
}
