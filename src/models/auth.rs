// Token claims and auth request/response bodies

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::models::user::{Role, User};
use crate::utils::validation::validate_password_strength;

/// Access token claims; identity fields are copied from the user at sign-in
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccessTokenClaims {
    pub sub: String,
    /// Token id, used for revocation after logout
    pub jti: String,
    pub email: String,
    pub name: String,
    pub role: String,
    pub two_factor_enabled: bool,
    pub aud: String,
    pub iss: String,
    pub iat: u64,
    pub exp: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RefreshTokenClaims {
    pub sub: String,
    pub jti: String,
    pub iat: u64,
    pub exp: u64,
}

fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

impl AccessTokenClaims {
    pub fn for_user(
        user: &User,
        jti: String,
        audience: String,
        issuer: String,
        iat: u64,
        exp: u64,
    ) -> Self {
        Self {
            sub: user.id.to_string(),
            jti,
            email: user.email.clone(),
            name: user.name.clone(),
            role: user.role.clone(),
            two_factor_enabled: user.is_two_factor_enabled,
            aud: audience,
            iss: issuer,
            iat,
            exp,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.exp < unix_now()
    }

    /// Seconds until expiry, zero once expired
    pub fn remaining_seconds(&self) -> u64 {
        self.exp.saturating_sub(unix_now())
    }
}

impl RefreshTokenClaims {
    pub fn new(user_id: String, token_id: String, issued_at: u64, expires_at: u64) -> Self {
        Self {
            sub: user_id,
            jti: token_id,
            iat: issued_at,
            exp: expires_at,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.exp < unix_now()
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RegisterRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be between 1 and 100 characters"))]
    pub name: String,
    #[validate(email(message = "Please provide a valid email address"))]
    pub email: String,
    #[validate(custom = "validate_password_strength")]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    #[validate(email(message = "Please provide a valid email address"))]
    pub email: String,
    pub password: String,
    /// Two-factor code from the email, on the second step
    pub code: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct NewVerificationRequest {
    pub token: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ResetRequest {
    #[validate(email(message = "Please provide a valid email address"))]
    pub email: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct NewPasswordRequest {
    #[validate(length(min = 1, message = "Missing token"))]
    pub token: String,
    #[validate(custom = "validate_password_strength")]
    pub password: String,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct RefreshRequest {
    /// Falls back to the refresh cookie when absent
    pub refresh_token: Option<String>,
}

/// Identity carried by a session; mirrors the access token claims
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SessionUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub image: Option<String>,
    pub role: Role,
    pub is_two_factor_enabled: bool,
}

impl From<&User> for SessionUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            image: user.image.clone(),
            role: user.role_enum(),
            is_two_factor_enabled: user.is_two_factor_enabled,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: u64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SessionResponse {
    #[serde(flatten)]
    pub tokens: TokenPair,
    pub user: SessionUser,
}

/// Outcome of a login attempt that did not fail
#[derive(Debug)]
pub enum LoginOutcome {
    /// Email unverified, a confirmation email was sent
    ConfirmationSent,
    /// Two-factor code emailed, client must retry with `code`
    TwoFactorRequired,
    SignedIn(SessionResponse),
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    pub success: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            success: message.into(),
        }
    }
}
