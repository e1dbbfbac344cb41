pub mod audit_logger;
pub mod auth_errors;
pub mod password;
pub mod service_error;
pub mod tokens;
pub mod validation;

pub use audit_logger::{AuditAction, AuditLogger};
pub use auth_errors::{log_auth_failure, AuthError, AuthErrorResponse};
pub use password::{hash_password, needs_rehash, verify_password, PasswordConfig, PasswordError};
pub use service_error::ServiceError;
pub use validation::{normalize_email, trim_and_validate_field, trim_optional_field};
