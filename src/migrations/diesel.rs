// diesel_migrations needs a sync connection, so everything here runs on the blocking pool

use crate::db::MIGRATIONS;
use diesel::{Connection, PgConnection};
use diesel_migrations::MigrationHarness;
use std::error::Error;
use tracing::{debug, info};

type BoxError = Box<dyn Error + Send + Sync>;

/// Run all pending migrations, returning how many were applied
pub async fn run_migrations(database_url: &str) -> Result<usize, BoxError> {
    let database_url = database_url.to_string();

    tokio::task::spawn_blocking(move || -> Result<usize, BoxError> {
        let mut conn = PgConnection::establish(&database_url)
            .map_err(|e| format!("Failed to establish sync connection: {}", e))?;

        let applied = conn
            .run_pending_migrations(MIGRATIONS)
            .map_err(|e| format!("Failed to run migrations: {}", e))?;

        for migration in &applied {
            debug!("[DIESEL] Applied migration: {}", migration);
        }
        info!("[DIESEL] {} migrations applied", applied.len());

        Ok(applied.len())
    })
    .await
    .map_err(|e| format!("Migration task panicked: {}", e))?
}

/// Applied and pending migration names
#[derive(Debug)]
pub struct MigrationStatus {
    pub applied: Vec<String>,
    pub pending: Vec<String>,
}

impl MigrationStatus {
    pub fn is_up_to_date(&self) -> bool {
        self.pending.is_empty()
    }
}

pub async fn check_migration_status(database_url: &str) -> Result<MigrationStatus, BoxError> {
    let database_url = database_url.to_string();

    tokio::task::spawn_blocking(move || -> Result<MigrationStatus, BoxError> {
        let mut conn = PgConnection::establish(&database_url)
            .map_err(|e| format!("Failed to establish sync connection: {}", e))?;

        let applied = conn
            .applied_migrations()
            .map_err(|e| format!("Failed to get applied migrations: {}", e))?;
        let pending = conn
            .pending_migrations(MIGRATIONS)
            .map_err(|e| format!("Failed to get pending migrations: {}", e))?;

        Ok(MigrationStatus {
            applied: applied.iter().map(|m| m.to_string()).collect(),
            pending: pending.iter().map(|m| m.name().to_string()).collect(),
        })
    })
    .await
    .map_err(|e| format!("Status check task panicked: {}", e))?
}
