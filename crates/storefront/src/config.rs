//! Storefront configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Optional
//! - `GROCER_CART_QUIET_PERIOD_MS` - Debounce quiet period before remote cart writes (default: 500)
//! - `GROCER_CART_STORAGE_DIR` - Directory for device-local cart storage (default: .grocer)
//! - `GROCER_CART_STORAGE_KEY` - Storage key of the cart blob (default: cart)
//! - `GROCER_DATABASE_URL` - `PostgreSQL` connection string of the remote record store
//!   (falls back to `DATABASE_URL`)
//! - `GROCER_AUTH_URL` - Hosted auth endpoint used to mint anonymous identities
//! - `GROCER_AUTH_API_KEY` - API key for the auth endpoint (required with `GROCER_AUTH_URL`)
//! - `SENTRY_DSN` - Sentry error tracking DSN

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use url::Url;

use crate::storage::CART_STORAGE_KEY;

const DEFAULT_QUIET_PERIOD_MS: u64 = 500;
const MAX_QUIET_PERIOD_MS: u64 = 60_000;
const DEFAULT_STORAGE_DIR: &str = ".grocer";
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Storefront application configuration.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// Cart synchronization settings
    pub cart: CartConfig,
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: Option<SecretString>,
    /// Hosted auth endpoint, when anonymous identities are minted remotely
    pub auth: Option<AuthConfig>,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
}

/// Cart synchronization settings.
#[derive(Debug, Clone)]
pub struct CartConfig {
    /// Quiet period a burst of cart changes must end with before remote writes start
    pub quiet_period: Duration,
    /// Directory for device-local cart storage
    pub storage_dir: PathBuf,
    /// Storage key of the cart blob
    pub storage_key: String,
}

impl Default for CartConfig {
    fn default() -> Self {
        Self {
            quiet_period: Duration::from_millis(DEFAULT_QUIET_PERIOD_MS),
            storage_dir: PathBuf::from(DEFAULT_STORAGE_DIR),
            storage_key: CART_STORAGE_KEY.to_string(),
        }
    }
}

/// Hosted auth endpoint configuration.
///
/// Implements `Debug` manually to redact secret fields.
#[derive(Clone)]
pub struct AuthConfig {
    /// Base URL of the auth service (e.g., <https://auth.grocer.dev/auth/v1>)
    pub url: Url,
    /// API key sent with every auth request
    pub api_key: SecretString,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("url", &self.url.as_str())
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

impl StorefrontConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if variables are invalid, or if the auth API key
    /// fails validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Self::from_lookup(&|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// See [`StorefrontConfig::from_env`].
    pub fn from_lookup(env: &dyn Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let cart = CartConfig::from_lookup(env)?;
        let database_url = env("GROCER_DATABASE_URL")
            .or_else(|| env("DATABASE_URL"))
            .map(SecretString::from);
        let auth = AuthConfig::from_lookup(env)?;
        let sentry_dsn = env("SENTRY_DSN").filter(|dsn| !dsn.is_empty());

        Ok(Self {
            cart,
            database_url,
            auth,
            sentry_dsn,
        })
    }
}

impl CartConfig {
    fn from_lookup(env: &dyn Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let quiet_period = match env("GROCER_CART_QUIET_PERIOD_MS") {
            Some(raw) => parse_quiet_period(&raw)?,
            None => defaults.quiet_period,
        };
        let storage_dir = env("GROCER_CART_STORAGE_DIR")
            .map_or(defaults.storage_dir, PathBuf::from);
        let storage_key = env("GROCER_CART_STORAGE_KEY").unwrap_or(defaults.storage_key);

        Ok(Self {
            quiet_period,
            storage_dir,
            storage_key,
        })
    }
}

impl AuthConfig {
    fn from_lookup(env: &dyn Fn(&str) -> Option<String>) -> Result<Option<Self>, ConfigError> {
        let Some(raw_url) = env("GROCER_AUTH_URL") else {
            return Ok(None);
        };
        let url = Url::parse(&raw_url).map_err(|e| {
            ConfigError::InvalidEnvVar("GROCER_AUTH_URL".to_string(), e.to_string())
        })?;
        let api_key = env("GROCER_AUTH_API_KEY")
            .ok_or_else(|| ConfigError::MissingEnvVar("GROCER_AUTH_API_KEY".to_string()))?;
        validate_secret_strength(&api_key, "GROCER_AUTH_API_KEY")?;

        Ok(Some(Self {
            url,
            api_key: SecretString::from(api_key),
        }))
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Parse the quiet period in milliseconds (1..=60000).
fn parse_quiet_period(raw: &str) -> Result<Duration, ConfigError> {
    let invalid = |reason: String| {
        ConfigError::InvalidEnvVar("GROCER_CART_QUIET_PERIOD_MS".to_string(), reason)
    };
    let ms = raw.trim().parse::<u64>().map_err(|e| invalid(e.to_string()))?;
    if ms == 0 || ms > MAX_QUIET_PERIOD_MS {
        return Err(invalid(format!(
            "must be between 1 and {MAX_QUIET_PERIOD_MS} (got {ms})"
        )));
    }
    Ok(Duration::from_millis(ms))
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.len() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    // Real API keys have high entropy
    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use a randomly generated key."
            ),
        ));
    }

    Ok(())
}

/// Expose the database URL for logging-safe contexts (host only).
#[must_use]
pub fn database_host(url: &SecretString) -> Option<String> {
    Url::parse(url.expose_secret())
        .ok()
        .and_then(|u| u.host_str().map(str::to_owned))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const STRONG_KEY: &str = "aB3$xY9!mK2@nL5#pQ7&rT0*uW4^zC6";

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = StorefrontConfig::from_lookup(&lookup(&[])).unwrap();
        assert_eq!(config.cart.quiet_period, Duration::from_millis(500));
        assert_eq!(config.cart.storage_dir, PathBuf::from(".grocer"));
        assert_eq!(config.cart.storage_key, "cart");
        assert!(config.database_url.is_none());
        assert!(config.auth.is_none());
        assert!(config.sentry_dsn.is_none());
    }

    #[test]
    fn test_database_url_fallback() {
        let config =
            StorefrontConfig::from_lookup(&lookup(&[("DATABASE_URL", "postgres://db/grocer")]))
                .unwrap();
        assert_eq!(
            config.database_url.unwrap().expose_secret(),
            "postgres://db/grocer"
        );

        let config = StorefrontConfig::from_lookup(&lookup(&[
            ("DATABASE_URL", "postgres://fallback/grocer"),
            ("GROCER_DATABASE_URL", "postgres://primary/grocer"),
        ]))
        .unwrap();
        assert_eq!(
            database_host(&config.database_url.unwrap()).as_deref(),
            Some("primary")
        );
    }

    #[test]
    fn test_quiet_period_bounds() {
        assert!(parse_quiet_period("0").is_err());
        assert!(parse_quiet_period("60001").is_err());
        assert!(parse_quiet_period("abc").is_err());
        assert_eq!(
            parse_quiet_period(" 250 ").unwrap(),
            Duration::from_millis(250)
        );
    }

    #[test]
    fn test_auth_requires_api_key() {
        let err = StorefrontConfig::from_lookup(&lookup(&[(
            "GROCER_AUTH_URL",
            "https://auth.grocer.dev/auth/v1",
        )]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(_)));
    }

    #[test]
    fn test_auth_rejects_placeholder_key() {
        let err = StorefrontConfig::from_lookup(&lookup(&[
            ("GROCER_AUTH_URL", "https://auth.grocer.dev/auth/v1"),
            ("GROCER_AUTH_API_KEY", "your-api-key-here"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InsecureSecret(_, _)));
    }

    #[test]
    fn test_auth_config_loaded() {
        let config = StorefrontConfig::from_lookup(&lookup(&[
            ("GROCER_AUTH_URL", "https://auth.grocer.dev/auth/v1"),
            ("GROCER_AUTH_API_KEY", STRONG_KEY),
        ]))
        .unwrap();
        let auth = config.auth.unwrap();
        assert_eq!(auth.url.as_str(), "https://auth.grocer.dev/auth/v1");
    }

    #[test]
    fn test_shannon_entropy() {
        assert!((shannon_entropy("") - 0.0).abs() < f64::EPSILON);
        assert!((shannon_entropy("aaaaaaa") - 0.0).abs() < f64::EPSILON);
        assert!((shannon_entropy("ab") - 1.0).abs() < 0.01);
        assert!(shannon_entropy(STRONG_KEY) > 3.3);
    }

    #[test]
    fn test_auth_config_debug_redacts_secrets() {
        let config = AuthConfig {
            url: Url::parse("https://auth.grocer.dev/").unwrap(),
            api_key: SecretString::from("super_secret_api_key"),
        };

        let debug_output = format!("{config:?}");

        assert!(debug_output.contains("auth.grocer.dev"));
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("super_secret_api_key"));
    }
}
