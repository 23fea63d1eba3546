//! Configuration for sync runs
//!
//! [`SyncConfig`] carries what the engine itself needs (rate, limit, resume,
//! resource name, storage directories). [`ApiSettings`] carries what the DIP
//! collaborator needs and is loaded from (in order of priority):
//! 1. JSON file (~/.config/dip-sync/settings.json)
//! 2. Runtime environment variables (fallback)

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default DIP API base URL
pub const DEFAULT_BASE_URL: &str = "https://search.dip.bundestag.de/api/v1";

/// Configuration validation error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {field}: {message}")]
pub struct ConfigError {
    pub field: &'static str,
    pub message: String,
}

/// Rate at which outbound fetches are admitted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    pub max_requests: u32,
    pub interval: Duration,
}

impl RateLimit {
    pub fn new(max_requests: u32, interval: Duration) -> Self {
        Self {
            max_requests,
            interval,
        }
    }

    pub fn per_minute(max_requests: u32) -> Self {
        Self::new(max_requests, Duration::from_secs(60))
    }
}

impl Default for RateLimit {
    /// The DIP API allows 24 requests per minute; keep one in reserve.
    fn default() -> Self {
        Self::per_minute(23)
    }
}

/// Configuration for a single resource sync run
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Name used to namespace checkpoint and failed-record files
    pub resource_name: String,
    /// Throttle for outbound fetches (None = no throttling at this layer)
    pub rate_limit: Option<RateLimit>,
    /// Maximum number of items to process (0 = unbounded)
    pub limit: usize,
    /// Resume from the last checkpoint if one exists
    pub resume: bool,
    /// Directory holding `<resource>.checkpoint.json`
    pub checkpoint_dir: PathBuf,
    /// Directory holding `<resource>.failed.json`
    pub failed_dir: PathBuf,
    /// Install OS signal handlers for the duration of the run
    pub listen_for_signals: bool,
}

impl SyncConfig {
    /// Create a config with defaults for the given resource
    pub fn new(resource_name: impl Into<String>) -> Self {
        Self {
            resource_name: resource_name.into(),
            rate_limit: Some(RateLimit::default()),
            limit: 0,
            resume: false,
            checkpoint_dir: PathBuf::from(".checkpoints"),
            failed_dir: PathBuf::from(".failed"),
            listen_for_signals: true,
        }
    }

    pub fn with_rate_limit(mut self, rate_limit: Option<RateLimit>) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_resume(mut self, resume: bool) -> Self {
        self.resume = resume;
        self
    }

    pub fn with_checkpoint_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.checkpoint_dir = dir.into();
        self
    }

    pub fn with_failed_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.failed_dir = dir.into();
        self
    }

    pub fn with_signal_handling(mut self, listen: bool) -> Self {
        self.listen_for_signals = listen;
        self
    }

    /// Check that required configuration is present and sane
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.resource_name.trim().is_empty() {
            return Err(ConfigError {
                field: "resource_name",
                message: "resource name must be set".to_string(),
            });
        }
        if self
            .resource_name
            .contains(|c: char| c == '/' || c == '\\')
        {
            return Err(ConfigError {
                field: "resource_name",
                message: format!("'{}' must not contain path separators", self.resource_name),
            });
        }
        if let Some(rate) = self.rate_limit {
            if rate.max_requests == 0 {
                return Err(ConfigError {
                    field: "rate_limit",
                    message: "at least one request per interval is required".to_string(),
                });
            }
            if rate.interval.is_zero() {
                return Err(ConfigError {
                    field: "rate_limit",
                    message: "interval must be non-zero".to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Connection settings for the DIP API
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ApiSettings {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    pub api_key: String,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

impl ApiSettings {
    /// Load settings using the following priority:
    /// 1. JSON file (~/.config/dip-sync/settings.json)
    /// 2. Runtime environment variables
    pub fn load() -> Result<Self> {
        if config::config_exists(config::SETTINGS_FILE) {
            return config::load_json(config::SETTINGS_FILE);
        }

        Self::from_env()
    }

    /// Load settings from a specific JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        config::load_json_file(path)
    }

    /// Parse settings from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse settings JSON")
    }

    /// Load settings from environment variables
    pub fn from_env() -> Result<Self> {
        let api_key =
            std::env::var("DIP_API_KEY").context("DIP_API_KEY environment variable not set")?;
        let base_url = std::env::var("DIP_BASE_URL").unwrap_or_else(|_| default_base_url());

        Ok(Self { base_url, api_key })
    }

    /// Get the default settings file path (~/.config/dip-sync/settings.json)
    pub fn default_settings_path() -> Option<PathBuf> {
        config::config_path(config::SETTINGS_FILE)
    }

    /// Check if settings are available (file or env vars)
    pub fn is_available() -> bool {
        config::config_exists(config::SETTINGS_FILE) || std::env::var("DIP_API_KEY").is_ok()
    }
}
