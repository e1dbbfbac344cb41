// HS256 access and refresh tokens. Refresh tokens rotate within a family and a
// rotated token presented again revokes the whole family.

use diesel_async::{scoped_futures::ScopedFutureExt, AsyncConnection};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::db::{DieselPool, RedisPool};
use crate::models::auth::{AccessTokenClaims, RefreshTokenClaims, TokenPair};
use crate::models::refresh_token::{RefreshToken, RefreshTokenError};
use crate::models::user::User;
use crate::utils::auth_errors::AuthError;

const ROTATION_REASON: &str = "rotation";

#[derive(Error, Debug)]
pub enum JwtError {
    #[error("JWT encoding error: {0}")]
    EncodingError(String),

    #[error("Token expired")]
    TokenExpired,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token revoked")]
    TokenRevoked,

    #[error("Token reuse detected")]
    TokenReuseDetected,

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Cache error: {0}")]
    CacheError(String),
}

impl From<jsonwebtoken::errors::Error> for JwtError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;
        match err.kind() {
            ErrorKind::ExpiredSignature => JwtError::TokenExpired,
            ErrorKind::InvalidToken
            | ErrorKind::InvalidSignature
            | ErrorKind::InvalidAudience
            | ErrorKind::InvalidIssuer
            | ErrorKind::InvalidAlgorithm
            | ErrorKind::MissingRequiredClaim(_)
            | ErrorKind::Base64(_)
            | ErrorKind::Json(_)
            | ErrorKind::Utf8(_) => JwtError::InvalidToken,
            _ => JwtError::EncodingError(err.to_string()),
        }
    }
}

impl From<diesel::result::Error> for JwtError {
    fn from(err: diesel::result::Error) -> Self {
        JwtError::DatabaseError(err.to_string())
    }
}

impl From<RefreshTokenError> for JwtError {
    fn from(err: RefreshTokenError) -> Self {
        match err {
            RefreshTokenError::NotFound => JwtError::InvalidToken,
            RefreshTokenError::Expired => JwtError::TokenExpired,
            RefreshTokenError::Revoked { .. } => JwtError::TokenRevoked,
            RefreshTokenError::Database(e) => JwtError::DatabaseError(e.to_string()),
        }
    }
}

impl From<JwtError> for AuthError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::TokenExpired
            | JwtError::InvalidToken
            | JwtError::TokenRevoked
            | JwtError::TokenReuseDetected => AuthError::InvalidToken,
            JwtError::EncodingError(msg) => AuthError::TokenError(msg),
            JwtError::DatabaseError(msg) => AuthError::DatabaseError(msg),
            JwtError::CacheError(_) => AuthError::InternalError,
        }
    }
}

/// Signing keys and token lifetimes
#[derive(Clone)]
pub struct JwtConfig {
    pub access_token_expiry: u64,
    pub refresh_token_expiry: u64,
    pub algorithm: Algorithm,
    pub audience: String,
    pub issuer: String,
    pub access_encoding_key: EncodingKey,
    pub access_decoding_key: DecodingKey,
    pub refresh_encoding_key: EncodingKey,
    pub refresh_decoding_key: DecodingKey,
    /// Written into the `kid` header
    pub key_version: u32,
}

impl std::fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtConfig")
            .field("access_token_expiry", &self.access_token_expiry)
            .field("refresh_token_expiry", &self.refresh_token_expiry)
            .field("algorithm", &self.algorithm)
            .field("audience", &self.audience)
            .field("issuer", &self.issuer)
            .field("keys", &"<redacted>")
            .field("key_version", &self.key_version)
            .finish()
    }
}

impl JwtConfig {
    pub fn build_from_params(
        access_secret: &str,
        refresh_secret: &str,
        access_expiry: u64,
        refresh_expiry: u64,
        audience: String,
        issuer: String,
        key_version: u32,
    ) -> Self {
        JwtConfig {
            access_token_expiry: access_expiry,
            refresh_token_expiry: refresh_expiry,
            algorithm: Algorithm::HS256,
            audience,
            issuer,
            access_encoding_key: EncodingKey::from_secret(access_secret.as_bytes()),
            access_decoding_key: DecodingKey::from_secret(access_secret.as_bytes()),
            refresh_encoding_key: EncodingKey::from_secret(refresh_secret.as_bytes()),
            refresh_decoding_key: DecodingKey::from_secret(refresh_secret.as_bytes()),
            key_version,
        }
    }

    pub fn from_env() -> Self {
        let jwt = &crate::app_config::config().jwt;
        Self::build_from_params(
            &jwt.access_secret,
            &jwt.refresh_secret,
            jwt.access_expiry,
            jwt.refresh_expiry,
            jwt.audience.clone(),
            jwt.issuer.clone(),
            jwt.key_version,
        )
    }

    #[cfg(test)]
    pub fn for_test() -> Self {
        Self::build_from_params(
            "test-access-secret-that-is-long-enough-1",
            "test-refresh-secret-that-is-long-enough-2",
            3600,
            604800,
            "test.marketplace".to_string(),
            "test.marketplace".to_string(),
            1,
        )
    }
}

fn unix_now() -> Result<u64, JwtError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|e| JwtError::EncodingError(e.to_string()))
}

enum Rotation {
    Rotated(TokenPair, User),
    Reused,
}

pub struct JwtService {
    config: JwtConfig,
    db_pool: Option<DieselPool>,
    redis_pool: Option<RedisPool>,
}

impl JwtService {
    /// Stateless service: signs and validates only
    pub fn new(config: JwtConfig) -> Self {
        Self {
            config,
            db_pool: None,
            redis_pool: None,
        }
    }

    pub fn new_with_full_integration(
        config: JwtConfig,
        db_pool: DieselPool,
        redis_pool: RedisPool,
    ) -> Self {
        Self {
            config,
            db_pool: Some(db_pool),
            redis_pool: Some(redis_pool),
        }
    }

    pub fn access_token_expiry(&self) -> u64 {
        self.config.access_token_expiry
    }

    pub fn refresh_token_expiry(&self) -> u64 {
        self.config.refresh_token_expiry
    }

    fn header(&self) -> Header {
        let mut header = Header::new(self.config.algorithm);
        header.kid = Some(self.config.key_version.to_string());
        header
    }

    fn db_pool(&self) -> Result<&DieselPool, JwtError> {
        self.db_pool
            .as_ref()
            .ok_or_else(|| JwtError::DatabaseError("Database pool not configured".to_string()))
    }

    pub fn generate_access_token(&self, user: &User) -> Result<String, JwtError> {
        let now = unix_now()?;
        let claims = AccessTokenClaims::for_user(
            user,
            Uuid::new_v4().to_string(),
            self.config.audience.clone(),
            self.config.issuer.clone(),
            now,
            now + self.config.access_token_expiry,
        );

        Ok(encode(&self.header(), &claims, &self.config.access_encoding_key)?)
    }

    fn encode_refresh_token(&self, user_id: Uuid, jti: &str) -> Result<String, JwtError> {
        let now = unix_now()?;
        let claims = RefreshTokenClaims::new(
            user_id.to_string(),
            jti.to_string(),
            now,
            now + self.config.refresh_token_expiry,
        );

        Ok(encode(&self.header(), &claims, &self.config.refresh_encoding_key)?)
    }

    fn refresh_expires_at(&self) -> chrono::DateTime<chrono::Utc> {
        chrono::Utc::now() + chrono::Duration::seconds(self.config.refresh_token_expiry as i64)
    }

    fn token_pair(&self, access_token: String, refresh_token: String) -> TokenPair {
        TokenPair {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: self.config.access_token_expiry,
        }
    }

    /// Sign in: new access token plus a refresh token starting a new family
    #[instrument(skip(self, user), fields(user_id = %user.id))]
    pub async fn issue_token_pair(&self, user: &User) -> Result<TokenPair, JwtError> {
        let access_token = self.generate_access_token(user)?;

        let jti = Uuid::new_v4().to_string();
        let refresh_token = self.encode_refresh_token(user.id, &jti)?;

        let mut conn = self
            .db_pool()?
            .get()
            .await
            .map_err(|e| JwtError::DatabaseError(crate::db::pool_error(e)))?;
        RefreshToken::store(
            &mut conn,
            user.id,
            &jti,
            self.refresh_expires_at(),
            Uuid::new_v4().to_string(),
        )
        .await?;

        Ok(self.token_pair(access_token, refresh_token))
    }

    /// Strict validation: signature, audience, issuer, expiry with no leeway
    pub fn validate_access_token(&self, token: &str) -> Result<AccessTokenClaims, JwtError> {
        let mut validation = Validation::new(self.config.algorithm);
        validation.set_audience(&[self.config.audience.clone()]);
        validation.set_issuer(&[self.config.issuer.clone()]);
        validation.validate_exp = true;
        validation.leeway = 0;

        let token_data =
            decode::<AccessTokenClaims>(token, &self.config.access_decoding_key, &validation)?;

        Ok(token_data.claims)
    }

    /// Signature and expiry only; database state is checked on rotation
    pub fn decode_refresh_token(&self, token: &str) -> Result<RefreshTokenClaims, JwtError> {
        let mut validation = Validation::new(self.config.algorithm);
        validation.validate_exp = true;
        validation.validate_aud = false;
        validation.leeway = 0;

        let token_data =
            decode::<RefreshTokenClaims>(token, &self.config.refresh_decoding_key, &validation)?;

        Ok(token_data.claims)
    }

    /// Exchange a refresh token for a new pair in the same family
    #[instrument(skip(self, old_refresh_token))]
    pub async fn rotate_refresh_token(
        &self,
        old_refresh_token: &str,
    ) -> Result<(TokenPair, User), JwtError> {
        let old_claims = self.decode_refresh_token(old_refresh_token)?;

        let mut conn = self
            .db_pool()?
            .get()
            .await
            .map_err(|e| JwtError::DatabaseError(crate::db::pool_error(e)))?;

        let rotation = conn
            .transaction::<_, JwtError, _>(|tx| {
                async move {
                    let existing = match RefreshToken::validate_and_lock(tx, &old_claims.jti).await
                    {
                        Ok(token) => token,
                        Err(RefreshTokenError::Revoked {
                            token_family,
                            reason,
                        }) if reason.as_deref() == Some(ROTATION_REASON) => {
                            warn!(
                                "Reuse of rotated refresh token detected, revoking family {}",
                                token_family
                            );
                            RefreshToken::revoke_token_family(
                                tx,
                                &token_family,
                                "token_reuse_detected",
                            )
                            .await?;
                            return Ok(Rotation::Reused);
                        },
                        Err(e) => return Err(e.into()),
                    };

                    RefreshToken::revoke(tx, &old_claims.jti, ROTATION_REASON).await?;

                    let user = match User::find_by_id(tx, existing.user_id).await? {
                        Some(user) if user.is_active => user,
                        _ => return Err(JwtError::InvalidToken),
                    };

                    let access_token = self.generate_access_token(&user)?;
                    let new_jti = Uuid::new_v4().to_string();
                    let refresh_token = self.encode_refresh_token(user.id, &new_jti)?;

                    RefreshToken::store(
                        tx,
                        user.id,
                        &new_jti,
                        self.refresh_expires_at(),
                        existing.token_family.clone(),
                    )
                    .await?;

                    Ok(Rotation::Rotated(
                        self.token_pair(access_token, refresh_token),
                        user,
                    ))
                }
                .scope_boxed()
            })
            .await?;

        match rotation {
            Rotation::Rotated(pair, user) => Ok((pair, user)),
            Rotation::Reused => Err(JwtError::TokenReuseDetected),
        }
    }

    /// Blacklist the access token id until it expires and revoke the refresh token
    #[instrument(skip(self, claims, refresh_token), fields(user_id = %claims.sub))]
    pub async fn logout(
        &self,
        claims: &AccessTokenClaims,
        refresh_token: Option<&str>,
    ) -> Result<(), JwtError> {
        if let Some(redis_pool) = &self.redis_pool {
            let ttl = claims.remaining_seconds().max(1);
            redis_pool
                .set_with_expiry(&blacklist_key(&claims.jti), "1".to_string(), ttl)
                .await
                .map_err(|e| JwtError::CacheError(e.to_string()))?;
        }

        if let Some(token) = refresh_token {
            // An unreadable cookie is not worth failing logout over
            if let Ok(refresh_claims) = self.decode_refresh_token(token) {
                let mut conn = self
                    .db_pool()?
                    .get()
                    .await
                    .map_err(|e| JwtError::DatabaseError(crate::db::pool_error(e)))?;
                RefreshToken::revoke(&mut conn, &refresh_claims.jti, "logout").await?;
            }
        }

        Ok(())
    }

    pub async fn is_token_blacklisted(&self, jti: &str) -> Result<bool, JwtError> {
        match &self.redis_pool {
            Some(redis_pool) => redis_pool
                .exists(&blacklist_key(jti))
                .await
                .map_err(|e| JwtError::CacheError(e.to_string())),
            None => Ok(false),
        }
    }
}

fn blacklist_key(jti: &str) -> String {
    format!("blacklist:token:{}", jti)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn user() -> User {
        let now = Utc::now();
        User {
            id: Uuid::new_v4(),
            name: "Noa".into(),
            email: "noa@example.com".into(),
            email_verified_at: Some(now),
            password_hash: String::new(),
            image: None,
            role: "user".into(),
            is_two_factor_enabled: false,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_access_token_round_trip() {
        let service = JwtService::new(JwtConfig::for_test());
        let user = user();

        let token = service.generate_access_token(&user).unwrap();
        let claims = service.validate_access_token(&token).unwrap();

        assert_eq!(claims.sub, user.id.to_string());
        assert_eq!(claims.email, "noa@example.com");
        assert_eq!(claims.role, "user");
        assert_eq!(claims.aud, "test.marketplace");
    }

    #[test]
    fn test_expired_access_token_rejected() {
        let config = JwtConfig::for_test();
        let service = JwtService::new(config.clone());
        let now = unix_now().unwrap();
        let claims = AccessTokenClaims::for_user(
            &user(),
            Uuid::new_v4().to_string(),
            config.audience.clone(),
            config.issuer.clone(),
            now - 7200,
            now - 3600,
        );
        let token = encode(&service.header(), &claims, &config.access_encoding_key).unwrap();

        assert!(matches!(
            service.validate_access_token(&token),
            Err(JwtError::TokenExpired)
        ));
    }

    #[test]
    fn test_refresh_token_not_accepted_as_access_token() {
        let service = JwtService::new(JwtConfig::for_test());
        let refresh = service
            .encode_refresh_token(Uuid::new_v4(), "some-jti")
            .unwrap();

        assert!(service.validate_access_token(&refresh).is_err());
        assert!(service.decode_refresh_token(&refresh).is_ok());
    }

    #[test]
    fn test_wrong_audience_rejected() {
        let issuing = JwtService::new(JwtConfig::for_test());
        let mut other = JwtConfig::for_test();
        other.audience = "someone.else".into();
        let validating = JwtService::new(other);

        let token = issuing.generate_access_token(&user()).unwrap();
        assert!(matches!(
            validating.validate_access_token(&token),
            Err(JwtError::InvalidToken)
        ));
    }

    #[test]
    fn test_kid_header_carries_key_version() {
        let service = JwtService::new(JwtConfig::for_test());
        let token = service.generate_access_token(&user()).unwrap();
        let header = jsonwebtoken::decode_header(&token).unwrap();
        assert_eq!(header.kid.as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn test_blacklist_without_redis_is_false() {
        let service = JwtService::new(JwtConfig::for_test());
        assert!(!service.is_token_blacklisted("jti").await.unwrap());
    }
}
