//! Database migration commands.
//!
//! # Usage
//!
//! ```bash
//! grocer-cli migrate
//! ```
//!
//! # Environment Variables
//!
//! - `GROCER_DATABASE_URL` (or `DATABASE_URL`) - `PostgreSQL` connection string
//!
//! Migrations live in `crates/storefront/migrations/` and are embedded at
//! compile time.

use thiserror::Error;
use tracing::info;

use grocer_storefront::config::StorefrontConfig;
use grocer_storefront::db;

use super::{CommandError, require_database_url};

/// Errors that can occur while migrating.
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Run storefront database migrations.
///
/// # Errors
///
/// Returns an error if the database URL is missing, the database is
/// unreachable, or a migration fails.
pub async fn run(config: &StorefrontConfig) -> Result<(), MigrationError> {
    let database_url = require_database_url(config)?;

    info!(
        host = grocer_storefront::config::database_host(database_url)
            .as_deref()
            .unwrap_or("unknown"),
        "Connecting to storefront database..."
    );
    let pool = db::create_pool(database_url).await?;

    info!("Running storefront migrations...");
    sqlx::migrate!("../storefront/migrations").run(&pool).await?;

    info!("Storefront migrations complete!");
    Ok(())
}
