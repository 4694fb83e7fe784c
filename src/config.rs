//! Operator configuration.
//!
//! [`WaitConfig`] carries the polling policies and API endpoints. Every
//! field has a default, so an empty YAML document is a valid config.
//!
//! # Example
//!
//! ```
//! use bq_wait::config::WaitConfig;
//!
//! let yaml = "poll:\n  initial_interval_secs: 10\n  max_interval_secs: 600\n";
//! let config = WaitConfig::from_yaml_str(yaml).unwrap();
//! assert_eq!(config.poll.initial_interval_secs, 10);
//! assert_eq!(config.retry.initial_interval_secs, 1);
//! ```

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, WaitError};
use crate::poll::BackoffPolicy;

/// Environment variable overriding [`WaitConfig::api_base_url`].
pub const API_BASE_URL_ENV: &str = "BQ_WAIT_API_BASE_URL";
/// Environment variable overriding [`WaitConfig::request_timeout_secs`].
pub const REQUEST_TIMEOUT_ENV: &str = "BQ_WAIT_REQUEST_TIMEOUT_SECS";

/// Configuration for the wait operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaitConfig {
    /// Backoff for retryable remote errors.
    pub retry: BackoffPolicy,

    /// Backoff between "not yet satisfied" checks.
    pub poll: BackoffPolicy,

    /// Base URL of the table metadata API.
    pub api_base_url: String,

    /// OAuth token endpoint for refresh-token credentials.
    pub token_url: String,

    /// Metadata server token endpoint for the ambient credential.
    pub metadata_token_url: String,

    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,

    /// `User-Agent` sent with every request.
    pub user_agent: String,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            retry: BackoffPolicy::retry_default(),
            poll: BackoffPolicy::poll_default(),
            api_base_url: "https://bigquery.googleapis.com/bigquery/v2".to_string(),
            token_url: "https://oauth2.googleapis.com/token".to_string(),
            metadata_token_url:
                "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token"
                    .to_string(),
            request_timeout_secs: 30,
            user_agent: format!("bq-wait/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl WaitConfig {
    /// Parse and validate a YAML document.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)
            .map_err(|e| WaitError::invalid_input(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a YAML config file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml_str(&content).map_err(|e| match e {
            WaitError::InvalidInput { message } => WaitError::InvalidInput {
                message: format!("{}: {}", path.display(), message),
            },
            other => other,
        })
    }

    /// Apply `BQ_WAIT_*` overrides read through `env`.
    pub fn with_env_overrides<F>(mut self, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = env(API_BASE_URL_ENV).filter(|v| !v.is_empty()) {
            self.api_base_url = url;
        }
        if let Some(raw) = env(REQUEST_TIMEOUT_ENV).filter(|v| !v.is_empty()) {
            self.request_timeout_secs = raw.trim().parse().map_err(|_| {
                WaitError::invalid_input(format!(
                    "{} must be a whole number of seconds (got '{}')",
                    REQUEST_TIMEOUT_ENV, raw
                ))
            })?;
        }
        self.validate()?;
        Ok(self)
    }

    /// Check that policies and endpoints are usable.
    pub fn validate(&self) -> Result<()> {
        self.retry.validate("retry")?;
        self.poll.validate("poll")?;
        if self.api_base_url.trim().is_empty() {
            return Err(WaitError::invalid_input("api_base_url must not be empty"));
        }
        if self.request_timeout_secs == 0 {
            return Err(WaitError::invalid_input(
                "request_timeout_secs must be greater than zero",
            ));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
