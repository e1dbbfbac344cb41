// Diesel-async connection pool backed by bb8

use bb8::Pool;
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::AsyncPgConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations};
use std::time::Duration;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations/diesel");

pub type DieselPool = Pool<AsyncDieselConnectionManager<AsyncPgConnection>>;

/// Database pool settings
#[derive(Debug, Clone)]
pub struct DieselDatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connection_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_lifetime: Duration,
    pub test_on_checkout: bool,
}

impl Default for DieselDatabaseConfig {
    fn default() -> Self {
        let database = &crate::app_config::config().database;
        Self {
            url: database.url.clone(),
            max_connections: database.max_connections,
            min_connections: database.min_connections,
            connection_timeout: Duration::from_secs(database.connect_timeout),
            idle_timeout: Duration::from_secs(database.idle_timeout),
            max_lifetime: Duration::from_secs(database.max_lifetime),
            test_on_checkout: true,
        }
    }
}

/// Create the Diesel connection pool and check one connection out
pub async fn create_diesel_pool(
    config: DieselDatabaseConfig,
) -> Result<DieselPool, Box<dyn std::error::Error + Send + Sync>> {
    let manager = AsyncDieselConnectionManager::<AsyncPgConnection>::new(config.url.clone());

    let pool = Pool::builder()
        .max_size(config.max_connections)
        .min_idle(Some(config.min_connections.min(config.max_connections)))
        .connection_timeout(config.connection_timeout)
        .idle_timeout(Some(config.idle_timeout))
        .max_lifetime(Some(config.max_lifetime))
        .test_on_check_out(config.test_on_checkout)
        .build(manager)
        .await?;

    let conn = pool.get().await?;
    drop(conn);

    tracing::info!(
        "Diesel pool initialized for {} with {} max connections",
        mask_connection_string(&config.url),
        config.max_connections
    );

    Ok(pool)
}

/// Health check for database pool
pub async fn check_diesel_health(
    pool: &DieselPool,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    use diesel_async::RunQueryDsl;

    let mut conn = pool.get().await?;
    diesel::sql_query("SELECT 1").execute(&mut conn).await?;
    Ok(())
}

/// Mask database connection string for logging
pub fn mask_connection_string(url: &str) -> String {
    if let Ok(parsed) = url::Url::parse(url) {
        let scheme = if parsed.scheme() == "postgres" {
            "postgresql"
        } else {
            parsed.scheme()
        };
        let host = parsed.host_str().unwrap_or("***");
        let path = parsed.path();

        if parsed.username().is_empty() && parsed.password().is_none() {
            format!("{}://{}{}", scheme, host, path)
        } else {
            format!("{}://***:***@{}{}", scheme, host, path)
        }
    } else {
        "postgresql://***:***@***".to_string()
    }
}
