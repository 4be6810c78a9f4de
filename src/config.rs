//! Configuration and settings management
//!
//! Loads settings from environment variables and defines client tuning
//! constants.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

/// Application settings loaded from environment variables
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Base URL of the content-library API, e.g. `https://api.example.com`
    pub api_base_url: String,

    /// Bearer token for the authenticated API wrapper
    pub api_token: Option<String>,
}

impl Settings {
    /// Create new settings by loading from environment and files
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use lectern::config::Settings;
    ///
    /// let settings = Settings::new().expect("Failed to load configuration");
    /// ```
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading fails.
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            // Start off by merging in the "default" configuration file
            .add_source(File::with_name("config/default").required(false))
            // Add in the current environment file
            .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
            // Add in a local configuration file
            // This file shouldn't be checked into git
            .add_source(File::with_name("config/local").required(false))
            // Add in settings from the environment (with a prefix of LECTERN)
            .add_source(Environment::with_prefix("LECTERN").separator("__"))
            // Also add settings from environment variables directly (without prefix)
            // Note: Environment::default() auto-converts UPPER_SNAKE_CASE to snake_case
            // ignore_empty treats empty env vars as unset
            .add_source(Environment::default().ignore_empty(true))
            .build()?;

        let mut settings: Self = s.try_deserialize()?;

        // Fallback: check environment variables directly if config didn't pick them up
        if settings.api_token.is_none() {
            if let Ok(val) = std::env::var("API_TOKEN") {
                if !val.is_empty() {
                    settings.api_token = Some(val);
                }
            }
        }

        Ok(settings)
    }
}

/// Reads the API HTTP timeout from `API_HTTP_TIMEOUT_SECS` or falls back to 30s
#[must_use]
pub fn get_api_http_timeout_secs() -> u64 {
    std::env::var("API_HTTP_TIMEOUT_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_API_HTTP_TIMEOUT_SECS)
}

/// Default timeout for API requests
pub const DEFAULT_API_HTTP_TIMEOUT_SECS: u64 = 30;

// Progress polling configuration
/// Interval between progress polls for an active upload session
pub const PROGRESS_POLL_INTERVAL_MS: u64 = 2000;
/// Consecutive failed polls tolerated before the session is abandoned
pub const POLL_MAX_CONSECUTIVE_FAILURES: u32 = 5;
/// Initial extra delay after a failed poll
pub const POLL_FAILURE_INITIAL_BACKOFF_MS: u64 = 500;
/// Ceiling for the failed-poll backoff
pub const POLL_FAILURE_MAX_BACKOFF_MS: u64 = 8_000;

// Start-upload retry configuration
/// Attempts for the start-upload request before giving up
pub const START_UPLOAD_MAX_RETRIES: usize = 3;
/// Initial backoff between start-upload attempts
pub const START_UPLOAD_INITIAL_BACKOFF_MS: u64 = 500;
/// Ceiling for the start-upload backoff
pub const START_UPLOAD_MAX_BACKOFF_MS: u64 = 4_000;

// Query cache configuration
/// Time-to-live for cached listing responses (mirrors the dashboard stale time)
pub const QUERY_CACHE_TTL_SECS: u64 = 300;
/// Maximum number of cached listing responses
pub const QUERY_CACHE_MAX_CAPACITY: u64 = 1_000;
