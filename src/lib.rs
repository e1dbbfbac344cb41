// Library exports for the activity marketplace backend

pub mod app;
pub mod app_config;
pub mod db;
pub mod handlers;
pub mod middleware;
pub mod migrations;
pub mod models;
pub mod schema;
pub mod services;
pub mod utils;

// Re-export commonly used types
pub use app::{create_app, AppState};
pub use app_config::{AppConfig, CONFIG};
pub use db::{DieselPool, RedisConfig, RedisPool};
pub use middleware::{auth_middleware, AuthenticatedUser};
pub use models::auth::{AccessTokenClaims, RefreshTokenClaims};
pub use services::{
    JwtConfig, JwtError, JwtService, PaymentGateway, RateLimitConfig, RateLimitResult,
    RateLimitService, StripeClient,
};
pub use utils::service_error::ServiceError;

/// Build the full application state from configuration: database pool,
/// embedded migrations, Redis and the Stripe client.
pub async fn initialize_app_state() -> Result<AppState, Box<dyn std::error::Error + Send + Sync>> {
    use std::sync::Arc;
    use tracing::info;

    let config = app_config::config();

    info!("Initializing database pool...");
    let db_config = db::DieselDatabaseConfig::default();
    let diesel_pool = db::create_diesel_pool(db_config).await?;

    if migrations::should_run_migrations() {
        info!("Running embedded migrations...");
        migrations::run_all_migrations(&config.database.url).await?;
    }

    info!("Initializing Redis pool...");
    let redis_pool = RedisPool::new(RedisConfig::from_env()).await?;

    let gateway: Arc<dyn PaymentGateway> = Arc::new(StripeClient::new(&config.stripe)?);

    Ok(AppState::new(config, diesel_pool, redis_pool, gateway)?)
}
