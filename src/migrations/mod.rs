// Embedded schema migrations, applied at startup so the binary carries its own schema

pub mod diesel;

use std::error::Error;
use tracing::{error, info};

/// Run pending PostgreSQL migrations unless disabled in config
pub async fn run_all_migrations(database_url: &str) -> Result<usize, Box<dyn Error + Send + Sync>> {
    if !should_run_migrations() {
        info!("[MIGRATIONS] Skipping embedded migrations (DISABLE_EMBEDDED_MIGRATIONS=true)");
        return Ok(0);
    }

    match diesel::run_migrations(database_url).await {
        Ok(0) => {
            info!("[MIGRATIONS] Schema up to date");
            Ok(0)
        },
        Ok(applied) => {
            info!("[MIGRATIONS] Applied {} migrations", applied);
            Ok(applied)
        },
        Err(e) => {
            error!("[MIGRATIONS] Migration failed: {}", e);
            Err(format!("Migration failed: {}", e).into())
        },
    }
}

pub fn should_run_migrations() -> bool {
    !crate::app_config::config().database.disable_embedded_migrations
}
