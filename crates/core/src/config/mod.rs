//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (FAVIK_*)
//! 2. TOML config file (if FAVIK_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (FAVIK_*)
/// 2. TOML config file (if FAVIK_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Website URL to resolve when `get` is called without an override.
    ///
    /// Set via FAVIK_URL environment variable.
    #[serde(default)]
    pub url: String,

    /// Value returned when no favicon can be resolved.
    ///
    /// Set via FAVIK_DEFAULT environment variable.
    #[serde(default, rename = "default")]
    pub default_value: String,

    /// Directory cache entries are written to.
    ///
    /// Set via FAVIK_CACHE_DIR environment variable.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Cache entry lifetime in seconds. 0 disables caching.
    ///
    /// Set via FAVIK_CACHE_TIMEOUT_SECS environment variable.
    #[serde(default = "default_cache_timeout_secs")]
    pub cache_timeout_secs: u64,

    /// User-Agent string for HTTP requests.
    ///
    /// Set via FAVIK_USER_AGENT environment variable.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// HTTP request timeout in milliseconds.
    ///
    /// Set via FAVIK_TIMEOUT_MS environment variable.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Maximum redirect hops a probe follows before giving up.
    ///
    /// Set via FAVIK_MAX_REDIRECTS environment variable.
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
}

fn default_cache_dir() -> PathBuf {
    std::env::temp_dir()
}

fn default_cache_timeout_secs() -> u64 {
    604_800 // 7 days
}

fn default_user_agent() -> String {
    "favik/0.1".into()
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_max_redirects() -> usize {
    10
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            default_value: String::new(),
            cache_dir: default_cache_dir(),
            cache_timeout_secs: default_cache_timeout_secs(),
            user_agent: default_user_agent(),
            timeout_ms: default_timeout_ms(),
            max_redirects: default_max_redirects(),
        }
    }
}

impl AppConfig {
    /// Request timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Cache entry lifetime as Duration.
    pub fn cache_timeout(&self) -> Duration {
        Duration::from_secs(self.cache_timeout_secs)
    }

    /// Whether result caching is enabled.
    pub fn cache_enabled(&self) -> bool {
        self.cache_timeout_secs > 0
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `FAVIK_`
    /// 2. TOML file from `FAVIK_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("FAVIK_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("FAVIK_")
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
