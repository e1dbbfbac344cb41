pub mod diesel_pool;
pub mod redis_config;
pub mod redis_pool;

pub use diesel_pool::{
    check_diesel_health, create_diesel_pool, mask_connection_string, DieselDatabaseConfig,
    DieselPool, MIGRATIONS,
};
pub use redis_config::RedisConfig;
pub use redis_pool::{RedisHealth, RedisPool};

/// Map a bb8 checkout failure into a plain message for service errors
pub fn pool_error<E: std::fmt::Display>(err: E) -> String {
    format!("Failed to get database connection: {}", err)
}
