//! CLI command implementations.

pub mod cart;
pub mod migrate;
pub mod seed;

use secrecy::SecretString;
use thiserror::Error;

use grocer_storefront::config::{ConfigError, StorefrontConfig};

/// Errors shared by commands that need storefront configuration.
#[derive(Debug, Error)]
pub enum CommandError {
    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Required environment variable is missing.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    /// Database connection error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Database URL from configuration, or an error naming the variable to set.
pub fn require_database_url(config: &StorefrontConfig) -> Result<&SecretString, CommandError> {
    config
        .database_url
        .as_ref()
        .ok_or(CommandError::MissingEnvVar("GROCER_DATABASE_URL"))
}
