// Account lifecycle: registration, sign-in with optional email two-factor,
// sessions and token refresh

use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel_async::{scoped_futures::ScopedFutureExt, AsyncConnection, RunQueryDsl};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::{
    db::DieselPool,
    models::{
        AccessTokenClaims, LoginOutcome, LoginRequest, NewUser, RegisterRequest, Role,
        SafeUser, SessionResponse, SessionUser, TwoFactorConfirmation, TwoFactorToken, User,
        UserUpdate,
    },
    schema::users,
    services::{email::EmailService, jwt::JwtService, verification::VerificationService},
    utils::{
        auth_errors::{log_auth_failure, AuthError},
        hash_password, needs_rehash, normalize_email,
        tokens::generate_two_factor_code,
        verify_password, PasswordConfig,
    },
};

#[derive(Clone)]
pub struct AuthService {
    pool: DieselPool,
    jwt_service: Arc<JwtService>,
    verification: VerificationService,
    email_service: Arc<EmailService>,
}

/// Check a submitted two-factor code against the stored token for the email
pub fn check_two_factor_code(
    stored: Option<&TwoFactorToken>,
    code: &str,
) -> Result<(), AuthError> {
    let token = stored.ok_or(AuthError::InvalidCode)?;
    if !token.matches(code) {
        return Err(AuthError::InvalidCode);
    }
    if token.is_expired() {
        return Err(AuthError::CodeExpired);
    }
    Ok(())
}

impl AuthService {
    pub fn new(
        pool: DieselPool,
        jwt_service: Arc<JwtService>,
        verification: VerificationService,
        email_service: Arc<EmailService>,
    ) -> Self {
        Self {
            pool,
            jwt_service,
            verification,
            email_service,
        }
    }

    /// Create an account and mail a confirmation link
    #[instrument(skip(self, request), fields(email = %request.email))]
    pub async fn register(&self, request: RegisterRequest) -> Result<SafeUser, AuthError> {
        request.validate()?;

        let email = normalize_email(&request.email);
        let name = request.name.trim().to_string();
        if name.is_empty() {
            return Err(AuthError::ValidationError("name: Name is required".into()));
        }

        let mut conn = self.pool.get().await?;

        if User::find_by_email(&mut conn, &email).await?.is_some() {
            return Err(AuthError::EmailTaken);
        }

        let new_user = NewUser {
            name,
            email,
            password_hash: hash_password(&request.password)?,
            role: Role::User.as_str().to_string(),
        };

        let user: User = match diesel::insert_into(users::table)
            .values(&new_user)
            .returning(User::as_returning())
            .get_result(&mut conn)
            .await
        {
            Ok(user) => user,
            // lost a race with a concurrent registration
            Err(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
                return Err(AuthError::EmailTaken)
            },
            Err(e) => return Err(e.into()),
        };

        self.verification
            .send_verification(&mut conn, &user.email, &user.name, None)
            .await?;

        info!(user_id = %user.id, "User registered");
        Ok(SafeUser::from(user))
    }

    /// Credential sign-in.
    ///
    /// Unverified accounts get a fresh confirmation email instead of tokens.
    /// Two-factor accounts first receive a code by email and must repeat the
    /// request with `code`; a matching code leaves a one-shot confirmation that
    /// the sign-in consumes.
    #[instrument(skip(self, request, ip_address), fields(email = %request.email))]
    pub async fn login(
        &self,
        request: LoginRequest,
        ip_address: &str,
    ) -> Result<LoginOutcome, AuthError> {
        let email = normalize_email(&request.email);
        if email.is_empty() || request.password.is_empty() {
            log_auth_failure(&email, ip_address, &AuthError::InvalidCredentials);
            return Err(AuthError::InvalidCredentials);
        }

        let mut conn = self.pool.get().await?;

        let user = match User::find_by_email(&mut conn, &email).await? {
            Some(user) => user,
            None => {
                log_auth_failure(&email, ip_address, &AuthError::InvalidCredentials);
                return Err(AuthError::InvalidCredentials);
            },
        };

        if !verify_password(&request.password, &user.password_hash)? {
            log_auth_failure(&email, ip_address, &AuthError::InvalidCredentials);
            return Err(AuthError::InvalidCredentials);
        }

        if !user.is_active {
            log_auth_failure(&email, ip_address, &AuthError::AccountInactive);
            return Err(AuthError::AccountInactive);
        }

        self.upgrade_password_hash(&mut conn, &user, &request.password)
            .await;

        if !user.is_email_verified() {
            self.verification
                .send_verification(&mut conn, &user.email, &user.name, None)
                .await?;
            return Ok(LoginOutcome::ConfirmationSent);
        }

        if user.is_two_factor_enabled {
            match request.code.as_deref().map(str::trim) {
                None | Some("") => {
                    let code = generate_two_factor_code();
                    TwoFactorToken::upsert(&mut conn, &user.email, &code).await?;

                    if let Err(e) = self
                        .email_service
                        .send_two_factor_email(&user.email, &code)
                        .await
                    {
                        warn!("Failed to send two-factor code to {}: {}", user.email, e);
                    }
                    return Ok(LoginOutcome::TwoFactorRequired);
                },
                Some(code) => {
                    let stored = TwoFactorToken::find_by_email(&mut conn, &user.email).await?;
                    if let Err(e) = check_two_factor_code(stored.as_ref(), code) {
                        log_auth_failure(&email, ip_address, &e);
                        return Err(e);
                    }

                    let token_id = stored.map(|t| t.id);
                    let user_id = user.id;
                    conn.transaction::<_, AuthError, _>(|tx| {
                        async move {
                            if let Some(token_id) = token_id {
                                TwoFactorToken::delete(tx, token_id).await?;
                            }
                            TwoFactorConfirmation::replace(tx, user_id).await?;
                            Ok(())
                        }
                        .scope_boxed()
                    })
                    .await?;
                },
            }

            // the confirmation is single use
            if !TwoFactorConfirmation::consume(&mut conn, user.id).await? {
                return Err(AuthError::InvalidCode);
            }
        }

        let tokens = self.jwt_service.issue_token_pair(&user).await?;
        info!(user_id = %user.id, "User signed in");

        Ok(LoginOutcome::SignedIn(SessionResponse {
            tokens,
            user: SessionUser::from(&user),
        }))
    }

    /// Re-hash legacy or weaker hashes after a successful password check
    async fn upgrade_password_hash(
        &self,
        conn: &mut diesel_async::AsyncPgConnection,
        user: &User,
        password: &str,
    ) {
        if !matches!(needs_rehash(&user.password_hash, &PasswordConfig::default()), Ok(true)) {
            return;
        }

        let result = match hash_password(password) {
            Ok(hash) => User::update(
                conn,
                user.id,
                UserUpdate {
                    password_hash: Some(hash),
                    ..Default::default()
                },
            )
            .await
            .map(|_| ())
            .map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };

        match result {
            Ok(()) => info!(user_id = %user.id, "Password hash upgraded"),
            Err(e) => warn!(user_id = %user.id, "Failed to upgrade password hash: {}", e),
        }
    }

    /// Session view of the authenticated caller
    pub async fn session(&self, user_id: Uuid) -> Result<SessionUser, AuthError> {
        let mut conn = self.pool.get().await?;
        let user = User::find_by_id(&mut conn, user_id)
            .await?
            .ok_or(AuthError::InvalidToken)?;

        if !user.is_active {
            return Err(AuthError::AccountInactive);
        }

        Ok(SessionUser::from(&user))
    }

    /// Rotate a refresh token into a new token pair
    pub async fn refresh(&self, refresh_token: &str) -> Result<SessionResponse, AuthError> {
        let (tokens, user) = self.jwt_service.rotate_refresh_token(refresh_token).await?;

        Ok(SessionResponse {
            tokens,
            user: SessionUser::from(&user),
        })
    }

    pub async fn logout(
        &self,
        claims: &AccessTokenClaims,
        refresh_token: Option<&str>,
    ) -> Result<(), AuthError> {
        self.jwt_service.logout(claims, refresh_token).await?;
        info!(user_id = %claims.sub, "User logged out");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::tokens::hash_token;
    use chrono::{Duration, Utc};

    fn stored(code: &str, expires_in: Duration) -> TwoFactorToken {
        TwoFactorToken {
            id: Uuid::new_v4(),
            email: "guest@example.com".into(),
            token_hash: hash_token(code),
            expires_at: Utc::now() + expires_in,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_missing_token_is_invalid_code() {
        assert!(matches!(
            check_two_factor_code(None, "123456"),
            Err(AuthError::InvalidCode)
        ));
    }

    #[test]
    fn test_wrong_code_is_invalid() {
        let token = stored("123456", Duration::minutes(5));
        assert!(matches!(
            check_two_factor_code(Some(&token), "654321"),
            Err(AuthError::InvalidCode)
        ));
    }

    #[test]
    fn test_expired_code() {
        let token = stored("123456", Duration::minutes(-1));
        assert!(matches!(
            check_two_factor_code(Some(&token), "123456"),
            Err(AuthError::CodeExpired)
        ));
    }

    #[test]
    fn test_matching_code_with_whitespace() {
        let token = stored("123456", Duration::minutes(5));
        assert!(check_two_factor_code(Some(&token), " 123456 ").is_ok());
    }
}
