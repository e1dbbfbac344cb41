// Authentication errors carry a stable machine code next to the message

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Serialize;
use thiserror::Error;

use crate::utils::password::PasswordError;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Account is inactive")]
    AccountInactive,

    #[error("Too many login attempts")]
    RateLimited { retry_after_seconds: u64 },

    #[error("Email already in use")]
    EmailTaken,

    #[error("Token does not exist")]
    TokenNotFound,

    #[error("Token has expired")]
    TokenExpired,

    #[error("Email does not exist")]
    EmailNotFound,

    #[error("Invalid code")]
    InvalidCode,

    #[error("Code expired")]
    CodeExpired,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("{0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Token generation failed: {0}")]
    TokenError(String),

    #[error("Internal server error")]
    InternalError,
}

#[derive(Debug, Serialize)]
pub struct AuthErrorResponse {
    pub error: String,
    pub status: u16,
    pub code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

impl AuthError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::InvalidCredentials | AuthError::InvalidToken => StatusCode::UNAUTHORIZED,
            AuthError::AccountInactive => StatusCode::FORBIDDEN,
            AuthError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AuthError::EmailTaken => StatusCode::CONFLICT,
            AuthError::TokenNotFound
            | AuthError::TokenExpired
            | AuthError::EmailNotFound
            | AuthError::InvalidCode
            | AuthError::CodeExpired
            | AuthError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AuthError::DatabaseError(_) | AuthError::TokenError(_) | AuthError::InternalError => {
                StatusCode::INTERNAL_SERVER_ERROR
            },
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::InvalidCredentials => "INVALID_CREDENTIALS",
            AuthError::AccountInactive => "ACCOUNT_INACTIVE",
            AuthError::RateLimited { .. } => "RATE_LIMITED",
            AuthError::EmailTaken => "EMAIL_TAKEN",
            AuthError::TokenNotFound => "TOKEN_NOT_FOUND",
            AuthError::TokenExpired => "TOKEN_EXPIRED",
            AuthError::EmailNotFound => "EMAIL_NOT_FOUND",
            AuthError::InvalidCode => "INVALID_CODE",
            AuthError::CodeExpired => "CODE_EXPIRED",
            AuthError::InvalidToken => "INVALID_TOKEN",
            AuthError::ValidationError(_) => "VALIDATION_ERROR",
            AuthError::DatabaseError(_) => "DATABASE_ERROR",
            AuthError::TokenError(_) => "TOKEN_ERROR",
            AuthError::InternalError => "INTERNAL_ERROR",
        }
    }

    pub fn retry_after(&self) -> Option<u64> {
        match self {
            AuthError::RateLimited {
                retry_after_seconds,
            } => Some(*retry_after_seconds),
            _ => None,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();

        let error = if status.is_server_error() {
            tracing::error!("Authentication request failed: {}", self);
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        let response = AuthErrorResponse {
            error,
            status: status.as_u16(),
            code: self.error_code(),
            retry_after: self.retry_after(),
        };

        (status, Json(response)).into_response()
    }
}

impl From<diesel::result::Error> for AuthError {
    fn from(error: diesel::result::Error) -> Self {
        AuthError::DatabaseError(error.to_string())
    }
}

impl From<bb8::RunError<diesel_async::pooled_connection::PoolError>> for AuthError {
    fn from(error: bb8::RunError<diesel_async::pooled_connection::PoolError>) -> Self {
        AuthError::DatabaseError(crate::db::pool_error(error))
    }
}

impl From<PasswordError> for AuthError {
    fn from(error: PasswordError) -> Self {
        tracing::error!("Password operation failed: {}", error);
        AuthError::InternalError
    }
}

impl From<validator::ValidationErrors> for AuthError {
    fn from(error: validator::ValidationErrors) -> Self {
        AuthError::ValidationError(crate::utils::validation::format_validation_errors(&error))
    }
}

/// Log an authentication failure without the password
pub fn log_auth_failure(user_email: &str, ip_address: &str, error: &AuthError) {
    tracing::warn!(
        email = user_email,
        ip = ip_address,
        error_code = error.error_code(),
        "Authentication failure"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_errors_are_bad_requests() {
        for err in [
            AuthError::TokenNotFound,
            AuthError::TokenExpired,
            AuthError::EmailNotFound,
            AuthError::InvalidCode,
            AuthError::CodeExpired,
        ] {
            assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        }
    }

    #[test]
    fn test_messages() {
        assert_eq!(AuthError::InvalidCredentials.to_string(), "Invalid credentials");
        assert_eq!(AuthError::TokenNotFound.to_string(), "Token does not exist");
        assert_eq!(AuthError::CodeExpired.to_string(), "Code expired");
    }

    #[test]
    fn test_rate_limited_retry_after() {
        let err = AuthError::RateLimited {
            retry_after_seconds: 42,
        };
        assert_eq!(err.retry_after(), Some(42));
        assert_eq!(err.status_code(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(AuthError::InvalidCode.retry_after(), None);
    }
}
