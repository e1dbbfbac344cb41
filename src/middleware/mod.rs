pub mod auth;
pub mod auth_middleware;
pub mod client_ip;
pub mod cors;

pub use auth::AuthenticatedUser;
pub use auth_middleware::{auth_middleware, bearer_token, require_admin};
pub use client_ip::ClientIp;
pub use cors::dynamic_cors_middleware;
