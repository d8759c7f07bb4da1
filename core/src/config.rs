//! Configuration for the sync client.
//!
//! Loaded from a TOML file or the environment. Every field has a default so
//! an empty file is a valid configuration pointing at a local backend.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::binder::DEFAULT_STALE_AFTER;
use crate::cache::ResourceKey;

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000";
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

pub const ENV_API_BASE_URL: &str = "HMS_API_BASE_URL";
pub const ENV_STALE_AFTER_MS: &str = "HMS_STALE_AFTER_MS";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct SyncConfig {
    pub api_base_url: String,
    /// Staleness window applied to resources without an override.
    pub stale_after_ms: u64,
    pub request_timeout_ms: u64,
    /// Per-resource overrides, keyed by resource key.
    pub resources: HashMap<String, ResourceConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceConfig {
    pub stale_after_ms: Option<u64>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid config value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            stale_after_ms: DEFAULT_STALE_AFTER.as_millis() as u64,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            resources: HashMap::new(),
        }
    }
}

impl SyncConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: SyncConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by `HMS_API_BASE_URL` and `HMS_STALE_AFTER_MS`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(url) = lookup(ENV_API_BASE_URL) {
            config.api_base_url = url;
        }
        if let Some(raw) = lookup(ENV_STALE_AFTER_MS) {
            config.stale_after_ms = raw.trim().parse().map_err(|err| ConfigError::InvalidValue {
                field: "stale_after_ms",
                reason: format!("{raw:?}: {err}"),
            })?;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.api_base_url.starts_with("http://") || self.api_base_url.starts_with("https://")) {
            return Err(ConfigError::InvalidValue {
                field: "api_base_url",
                reason: format!("{:?} is not an http(s) URL", self.api_base_url),
            });
        }
        if self.stale_after_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "stale_after_ms",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "request_timeout_ms",
                reason: "must be greater than zero".to_string(),
            });
        }
        for (key, resource) in &self.resources {
            if resource.stale_after_ms == Some(0) {
                return Err(ConfigError::InvalidValue {
                    field: "resources.stale_after_ms",
                    reason: format!("{key}: must be greater than zero"),
                });
            }
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Staleness window for `key`: its override if configured, else the default.
    pub fn stale_after(&self, key: &ResourceKey) -> Duration {
        let ms = self
            .resources
            .get(key.as_str())
            .and_then(|resource| resource.stale_after_ms)
            .unwrap_or(self.stale_after_ms);
        Duration::from_millis(ms)
    }
}
