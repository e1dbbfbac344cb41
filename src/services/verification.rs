// Email verification: issuing confirmation links and consuming them

use chrono::Utc;
use diesel_async::{scoped_futures::ScopedFutureExt, AsyncConnection, AsyncPgConnection};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    db::DieselPool,
    models::{User, UserUpdate, VerificationToken},
    services::email::EmailService,
    utils::{auth_errors::AuthError, tokens::generate_token},
};

#[derive(Clone)]
pub struct VerificationService {
    pool: DieselPool,
    email_service: Arc<EmailService>,
}

impl VerificationService {
    pub fn new(pool: DieselPool, email_service: Arc<EmailService>) -> Self {
        Self {
            pool,
            email_service,
        }
    }

    /// Store a fresh token for `email` (replacing any earlier one) and mail the link.
    ///
    /// `user_id` marks the token as confirming an email change for that account.
    /// Delivery failures are logged; the token stays valid for a resend.
    #[instrument(skip(self, conn))]
    pub async fn send_verification(
        &self,
        conn: &mut AsyncPgConnection,
        email: &str,
        user_name: &str,
        user_id: Option<Uuid>,
    ) -> Result<(), AuthError> {
        let token = generate_token();
        VerificationToken::upsert(conn, email, user_id, &token).await?;

        if let Err(e) = self
            .email_service
            .send_verification_email(email, user_name, &token)
            .await
        {
            warn!("Failed to send verification email to {}: {}", email, e);
        }

        Ok(())
    }

    /// Consume a verification token and mark the address as verified
    #[instrument(skip(self, raw_token))]
    pub async fn confirm(&self, raw_token: &str) -> Result<User, AuthError> {
        let mut conn = self.pool.get().await?;

        let token = VerificationToken::find_by_token(&mut conn, raw_token.trim())
            .await?
            .ok_or(AuthError::TokenNotFound)?;

        if token.is_expired() {
            return Err(AuthError::TokenExpired);
        }

        let user = match token.user_id {
            Some(user_id) => User::find_by_id(&mut conn, user_id).await?,
            None => User::find_by_email(&mut conn, &token.email).await?,
        }
        .ok_or(AuthError::EmailNotFound)?;

        // The new address may have been claimed since the change was requested
        if token.user_id.is_some() {
            if let Some(other) = User::find_by_email(&mut conn, &token.email).await? {
                if other.id != user.id {
                    return Err(AuthError::EmailTaken);
                }
            }
        }

        let verified = conn
            .transaction::<_, AuthError, _>(|tx| {
                async move {
                    let verified = User::update(
                        tx,
                        user.id,
                        UserUpdate {
                            email: Some(token.email.clone()),
                            email_verified_at: Some(Some(Utc::now())),
                            ..Default::default()
                        },
                    )
                    .await?;
                    VerificationToken::delete(tx, token.id).await?;
                    Ok(verified)
                }
                .scope_boxed()
            })
            .await?;

        info!(user_id = %verified.id, "Email verified");
        Ok(verified)
    }
}
