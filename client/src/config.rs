//! Configuration management for the client.

use std::env;
use std::time::Duration;

/// Default collection administrators authenticate against.
pub const DEFAULT_AUTH_COLLECTION: &str = "_superusers";

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Client configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Base URL of the PocketBase instance
    pub url: String,
    /// Identity to authenticate with
    pub username: Option<String>,
    pub password: Option<String>,
    /// Auth collection the credentials belong to
    pub auth_collection: String,
    /// Per-request timeout
    pub timeout: Duration,
}

impl Config {
    /// Unauthenticated configuration for `url` with default settings.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            username: None,
            password: None,
            auth_collection: DEFAULT_AUTH_COLLECTION.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Set password credentials.
    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let url = lookup("POCKETBASE_URL")
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::MissingUrl)?;
        url::Url::parse(&url).map_err(|e| ConfigError::InvalidUrl(e.to_string()))?;

        let username = lookup("POCKETBASE_USERNAME").filter(|v| !v.is_empty());
        let password = lookup("POCKETBASE_PASSWORD").filter(|v| !v.is_empty());
        if username.is_some() != password.is_some() {
            return Err(ConfigError::IncompleteCredentials);
        }

        let auth_collection = lookup("POCKETBASE_AUTH_COLLECTION")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_AUTH_COLLECTION.to_string());

        let timeout = lookup("POCKETBASE_TIMEOUT_SECS")
            .unwrap_or_else(|| DEFAULT_TIMEOUT_SECS.to_string())
            .parse()
            .map(Duration::from_secs)
            .map_err(|_| ConfigError::InvalidTimeout)?;

        Ok(Self {
            url: url.trim_end_matches('/').to_string(),
            username,
            password,
            auth_collection,
            timeout,
        })
    }
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("POCKETBASE_URL environment variable is required")]
    MissingUrl,

    #[error("Invalid POCKETBASE_URL: {0}")]
    InvalidUrl(String),

    #[error("POCKETBASE_USERNAME and POCKETBASE_PASSWORD must be set together")]
    IncompleteCredentials,

    #[error("Invalid POCKETBASE_TIMEOUT_SECS value")]
    InvalidTimeout,
}
