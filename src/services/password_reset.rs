use chrono::Utc;
use diesel::prelude::*;
use diesel_async::{scoped_futures::ScopedFutureExt, AsyncConnection, RunQueryDsl};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    db::DieselPool,
    models::{NewPasswordResetToken, PasswordResetToken, RefreshToken, User, UserUpdate},
    schema::password_reset_tokens,
    services::email::EmailService,
    utils::{auth_errors::AuthError, hash_password, normalize_email, tokens::generate_token},
};

#[derive(Clone)]
pub struct PasswordResetService {
    pool: DieselPool,
    email_service: Arc<EmailService>,
    timing_attack_delay_ms: u64,
}

impl PasswordResetService {
    pub fn new(pool: DieselPool, email_service: Arc<EmailService>) -> Self {
        Self {
            pool,
            email_service,
            timing_attack_delay_ms: 150,
        }
    }

    /// Start a reset for `email`. Unknown addresses get the same outcome so
    /// the endpoint does not reveal which emails have accounts.
    pub async fn request_reset(&self, email: &str) -> Result<(), AuthError> {
        let email = normalize_email(email);
        let mut conn = self.pool.get().await?;

        let Some(user) = User::find_by_email(&mut conn, &email).await? else {
            tracing::info!("Password reset requested for unknown email: {}", email);
            tokio::time::sleep(std::time::Duration::from_millis(
                self.timing_attack_delay_ms,
            ))
            .await;
            return Ok(());
        };

        let token = generate_token();
        let new_token = NewPasswordResetToken::new(user.id, &token);

        conn.transaction::<_, AuthError, _>(|tx| {
            async move {
                // one outstanding link per user
                diesel::delete(
                    password_reset_tokens::table
                        .filter(password_reset_tokens::user_id.eq(user.id)),
                )
                .execute(tx)
                .await?;

                diesel::insert_into(password_reset_tokens::table)
                    .values(&new_token)
                    .execute(tx)
                    .await?;
                Ok(())
            }
            .scope_boxed()
        })
        .await?;

        tracing::info!("Password reset token created for user {}", user.id);

        if let Err(e) = self
            .email_service
            .send_password_reset_email(&user.email, &user.name, &token)
            .await
        {
            tracing::warn!("Failed to send password reset email to {}: {}", user.email, e);
        }

        Ok(())
    }

    /// Set a new password from a reset link. Every refresh token of the user
    /// is revoked so existing sessions end.
    pub async fn reset_password(&self, raw_token: &str, new_password: &str) -> Result<Uuid, AuthError> {
        let mut conn = self.pool.get().await?;

        let reset_token = PasswordResetToken::find_by_token(&mut conn, raw_token.trim())
            .await?
            .ok_or(AuthError::TokenNotFound)?;

        if reset_token.used_at.is_some() {
            return Err(AuthError::TokenNotFound);
        }
        if !reset_token.is_usable() {
            return Err(AuthError::TokenExpired);
        }

        let password_hash = hash_password(new_password)?;
        let user_id = reset_token.user_id;

        conn.transaction::<_, AuthError, _>(|tx| {
            async move {
                // claim the token first so a concurrent request cannot reuse it
                let claimed = diesel::update(
                    password_reset_tokens::table
                        .find(reset_token.id)
                        .filter(password_reset_tokens::used_at.is_null()),
                )
                .set(password_reset_tokens::used_at.eq(Utc::now()))
                .execute(tx)
                .await?;
                if claimed == 0 {
                    return Err(AuthError::TokenNotFound);
                }

                User::update(
                    tx,
                    user_id,
                    UserUpdate {
                        password_hash: Some(password_hash),
                        ..Default::default()
                    },
                )
                .await?;

                RefreshToken::revoke_all_for_user(tx, user_id, "password_reset")
                    .await
                    .map_err(|e| AuthError::DatabaseError(e.to_string()))?;
                Ok(())
            }
            .scope_boxed()
        })
        .await?;

        tracing::info!("Password reset completed for user {}", user_id);
        Ok(user_id)
    }
}
