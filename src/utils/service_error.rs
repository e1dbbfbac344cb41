use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::utils::password::PasswordError;

/// Error returned by domain services and surfaced by handlers
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Too many requests")]
    RateLimited { retry_after_seconds: u64 },

    #[error("Cache error: {0}")]
    CacheError(String),

    #[error("Payment provider error: {0}")]
    PaymentError(String),

    #[error("Internal server error")]
    InternalError,
}

impl ServiceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::ValidationError(_) => StatusCode::BAD_REQUEST,
            ServiceError::Unauthorized => StatusCode::UNAUTHORIZED,
            ServiceError::Forbidden(_) => StatusCode::FORBIDDEN,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Conflict(_) => StatusCode::CONFLICT,
            ServiceError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ServiceError::DatabaseError(_)
            | ServiceError::CacheError(_)
            | ServiceError::PaymentError(_)
            | ServiceError::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show to clients; server-side failures carry no detail
    pub fn public_message(&self) -> String {
        match self {
            ServiceError::ValidationError(msg)
            | ServiceError::NotFound(msg)
            | ServiceError::Conflict(msg)
            | ServiceError::Forbidden(msg) => msg.clone(),
            ServiceError::Unauthorized => "Unauthorized".to_string(),
            ServiceError::RateLimited { .. } => "Too many requests".to_string(),
            _ => "Internal server error".to_string(),
        }
    }

    pub fn not_found(resource: &str) -> Self {
        ServiceError::NotFound(format!("{} not found", resource))
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        }

        let body = Json(json!({
            "error": self.public_message(),
            "status": status.as_u16()
        }));

        match self {
            ServiceError::RateLimited {
                retry_after_seconds,
            } => (
                status,
                [("Retry-After", retry_after_seconds.to_string())],
                body,
            )
                .into_response(),
            _ => (status, body).into_response(),
        }
    }
}

impl From<diesel::result::Error> for ServiceError {
    fn from(error: diesel::result::Error) -> Self {
        match error {
            diesel::result::Error::NotFound => ServiceError::NotFound("Resource not found".into()),
            _ => ServiceError::DatabaseError(error.to_string()),
        }
    }
}

impl From<bb8::RunError<diesel_async::pooled_connection::PoolError>> for ServiceError {
    fn from(error: bb8::RunError<diesel_async::pooled_connection::PoolError>) -> Self {
        ServiceError::DatabaseError(crate::db::pool_error(error))
    }
}

impl From<redis::RedisError> for ServiceError {
    fn from(error: redis::RedisError) -> Self {
        ServiceError::CacheError(error.to_string())
    }
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(error: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(crate::utils::validation::format_validation_errors(&error))
    }
}

impl From<crate::utils::auth_errors::AuthError> for ServiceError {
    fn from(error: crate::utils::auth_errors::AuthError) -> Self {
        use crate::utils::auth_errors::AuthError;

        match error {
            AuthError::InvalidCredentials | AuthError::InvalidToken => ServiceError::Unauthorized,
            AuthError::AccountInactive => ServiceError::Forbidden(error.to_string()),
            AuthError::RateLimited {
                retry_after_seconds,
            } => ServiceError::RateLimited {
                retry_after_seconds,
            },
            AuthError::EmailTaken => ServiceError::Conflict(error.to_string()),
            AuthError::DatabaseError(msg) => ServiceError::DatabaseError(msg),
            AuthError::TokenError(_) | AuthError::InternalError => ServiceError::InternalError,
            other => ServiceError::ValidationError(other.to_string()),
        }
    }
}

impl From<PasswordError> for ServiceError {
    fn from(error: PasswordError) -> Self {
        tracing::error!("Password operation failed: {}", error);
        ServiceError::InternalError
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ServiceError::ValidationError("bad".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ServiceError::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            ServiceError::Forbidden("no".into()).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ServiceError::not_found("Listing").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ServiceError::Conflict("taken".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ServiceError::RateLimited {
                retry_after_seconds: 5
            }
            .status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            ServiceError::PaymentError("stripe down".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_internal_detail_hidden() {
        let err = ServiceError::DatabaseError("relation \"users\" does not exist".into());
        assert_eq!(err.public_message(), "Internal server error");

        let err = ServiceError::Conflict("Listing is not available for these dates".into());
        assert_eq!(err.public_message(), "Listing is not available for these dates");
    }

    #[test]
    fn test_auth_errors_keep_their_status() {
        use crate::utils::auth_errors::AuthError;

        let err: ServiceError = AuthError::EmailTaken.into();
        assert_eq!(err.status_code(), StatusCode::CONFLICT);

        let err: ServiceError = AuthError::InvalidCredentials.into();
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);

        let err: ServiceError = AuthError::TokenExpired.into();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_diesel_not_found_maps_to_404() {
        let err: ServiceError = diesel::result::Error::NotFound.into();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }
}
