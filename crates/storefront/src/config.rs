//! Client configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `STOREFRONT_API_BASE_URL` - Base URL of the storefront backend API
//!
//! ## Optional
//! - `STOREFRONT_STORAGE_DIR` - Directory for the file-backed origin (default: .storefront)
//! - `STOREFRONT_STORAGE_QUOTA_BYTES` - Byte quota for stored values
//! - `STOREFRONT_CHECKOUT_MIRROR` - `immediate` or `on_commit` (default: immediate)
//! - `STOREFRONT_CATALOG_CACHE_TTL_SECS` - Catalog cache lifetime (default: 300)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::checkout::MirrorPolicy;

const DEFAULT_STORAGE_DIR: &str = ".storefront";
const DEFAULT_CATALOG_CACHE_TTL_SECS: u64 = 300;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Storefront client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL for `users/me`, `orders` and `products/{id}`
    pub api_base_url: Url,
    /// Directory backing the persistent origin
    pub storage_dir: PathBuf,
    /// Optional byte quota across all stored values
    pub storage_quota_bytes: Option<usize>,
    /// How checkout stepper edits reach the persisted cart
    pub checkout_mirror: MirrorPolicy,
    /// Catalog response cache lifetime
    pub catalog_cache_ttl: Duration,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
}

impl ClientConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let api_base_url = parse_base_url(
            "STOREFRONT_API_BASE_URL",
            &get_required_env("STOREFRONT_API_BASE_URL")?,
        )?;
        let storage_dir =
            PathBuf::from(get_env_or_default("STOREFRONT_STORAGE_DIR", DEFAULT_STORAGE_DIR));
        let storage_quota_bytes = get_optional_env("STOREFRONT_STORAGE_QUOTA_BYTES")
            .map(|raw| parse_number::<usize>("STOREFRONT_STORAGE_QUOTA_BYTES", &raw))
            .transpose()?;
        let checkout_mirror = get_env_or_default("STOREFRONT_CHECKOUT_MIRROR", "immediate")
            .parse::<MirrorPolicy>()
            .map_err(|e| ConfigError::InvalidEnvVar("STOREFRONT_CHECKOUT_MIRROR".to_string(), e))?;
        let catalog_cache_ttl = Duration::from_secs(parse_number::<u64>(
            "STOREFRONT_CATALOG_CACHE_TTL_SECS",
            &get_env_or_default(
                "STOREFRONT_CATALOG_CACHE_TTL_SECS",
                &DEFAULT_CATALOG_CACHE_TTL_SECS.to_string(),
            ),
        )?);

        Ok(Self {
            api_base_url,
            storage_dir,
            storage_quota_bytes,
            checkout_mirror,
            catalog_cache_ttl,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
        })
    }

    /// Configuration for a given API base URL with every optional setting at
    /// its default.
    #[must_use]
    pub fn with_base_url(api_base_url: Url) -> Self {
        Self {
            api_base_url,
            storage_dir: PathBuf::from(DEFAULT_STORAGE_DIR),
            storage_quota_bytes: None,
            checkout_mirror: MirrorPolicy::default(),
            catalog_cache_ttl: Duration::from_secs(DEFAULT_CATALOG_CACHE_TTL_SECS),
            sentry_dsn: None,
            sentry_environment: None,
        }
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an optional environment variable. Blank values count as unset.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    get_optional_env(key).unwrap_or_else(|| default.to_string())
}

fn parse_number<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// Parse an API base URL. Only `http` and `https` are accepted.
fn parse_base_url(key: &str, raw: &str) -> Result<Url, ConfigError> {
    let url =
        Url::parse(raw).map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            format!("unsupported scheme '{}'", url.scheme()),
        ));
    }
    Ok(url)
}
