//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (CHATCACHE_*)
//! 2. TOML config file (if CHATCACHE_CONFIG_FILE set)
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
/// 1. Environment variables (CHATCACHE_*)
/// 2. TOML config file (if CHATCACHE_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the SQLite database holding response buckets and the chat store.
    ///
    /// Set via CHATCACHE_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Origin the application is served from. Relative precache URLs resolve against it.
    ///
    /// Set via CHATCACHE_ORIGIN environment variable.
    #[serde(default = "default_origin")]
    pub origin: String,

    /// Prefix of every bucket name.
    #[serde(default = "default_cache_prefix")]
    pub cache_prefix: String,

    /// Deployment version tag. Bump it to retire every older bucket on activation.
    ///
    /// Set via CHATCACHE_CACHE_VERSION environment variable.
    #[serde(default = "default_cache_version")]
    pub cache_version: String,

    /// URLs warmed into the bucket on install.
    #[serde(default = "default_precache_urls")]
    pub precache_urls: Vec<String>,

    /// User-Agent string for HTTP requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// HTTP request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Largest response body stored in a bucket. Bigger responses are
    /// still returned to the requester.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// Usage ratio above which storage is reported unhealthy.
    #[serde(default = "default_warning_threshold")]
    pub warning_threshold: f64,

    /// Storage ceiling in bytes, reported as the quota of the SQLite estimator.
    #[serde(default = "default_max_storage_bytes")]
    pub max_storage_bytes: u64,

    /// Messages kept per conversation by compression.
    #[serde(default = "default_max_messages_per_chat")]
    pub max_messages_per_chat: usize,

    /// Name of the document that lists `characters` and `groups`.
    #[serde(default = "default_index_document")]
    pub index_document: String,

    /// Seconds between periodic storage checks. 0 disables the timer.
    #[serde(default = "default_maintenance_interval_secs")]
    pub maintenance_interval_secs: u64,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./chatcache.sqlite")
}

fn default_origin() -> String {
    "http://localhost:8080/".into()
}

fn default_cache_prefix() -> String {
    "chatcache-v".into()
}

fn default_cache_version() -> String {
    "1".into()
}

fn default_precache_urls() -> Vec<String> {
    vec!["./".into(), "./index.html".into()]
}

fn default_user_agent() -> String {
    "chatcache/0.1".into()
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_max_bytes() -> usize {
    5_242_880 // 5MB
}

fn default_warning_threshold() -> f64 {
    0.8
}

fn default_max_storage_bytes() -> u64 {
    50 * 1024 * 1024
}

fn default_max_messages_per_chat() -> usize {
    500
}

fn default_index_document() -> String {
    "chat-app".into()
}

fn default_maintenance_interval_secs() -> u64 {
    3600
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            origin: default_origin(),
            cache_prefix: default_cache_prefix(),
            cache_version: default_cache_version(),
            precache_urls: default_precache_urls(),
            user_agent: default_user_agent(),
            timeout_ms: default_timeout_ms(),
            max_bytes: default_max_bytes(),
            warning_threshold: default_warning_threshold(),
            max_storage_bytes: default_max_storage_bytes(),
            max_messages_per_chat: default_max_messages_per_chat(),
            index_document: default_index_document(),
            maintenance_interval_secs: default_maintenance_interval_secs(),
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Name of the live bucket for the configured version.
    pub fn bucket_name(&self) -> String {
        format!("{}{}", self.cache_prefix, self.cache_version)
    }

    /// Interval of the maintenance timer, `None` when disabled.
    pub fn maintenance_interval(&self) -> Option<Duration> {
        (self.maintenance_interval_secs > 0).then(|| Duration::from_secs(self.maintenance_interval_secs))
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `CHATCACHE_`
    /// 2. TOML file from `CHATCACHE_CONFIG_FILE` (if set)
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

        if let Ok(config_path) = std::env::var("CHATCACHE_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("CHATCACHE_")
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
