//! Application configuration structures.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application name and metadata.
    #[serde(default)]
    pub app: AppMetadata,

    /// Queue adapter configuration.
    #[serde(default)]
    pub queue: QueueConfig,

    /// Redis broker configuration.
    #[serde(default)]
    pub redis: RedisConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Application metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppMetadata {
    /// Application name.
    pub name: String,
    /// Environment (development, staging, production).
    pub environment: String,
}

impl Default for AppMetadata {
    fn default() -> Self {
        Self {
            name: "qless-bridge".to_string(),
            environment: "development".to_string(),
        }
    }
}

/// Queue adapter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Connection name reported by the adapter.
    #[serde(default = "default_connection")]
    pub connection: String,

    /// Queue used when an operation names none.
    #[serde(default)]
    pub default_queue: Option<String>,

    /// Prefix prepended to the worker name when popping jobs.
    #[serde(default = "default_worker_name_prefix")]
    pub worker_name_prefix: String,

    /// Explicit worker name. Falls back to the broker's worker identity.
    #[serde(default)]
    pub worker_name: Option<String>,

    /// Operation default options, the lowest-precedence option source.
    #[serde(default)]
    pub defaults: Map<String, Value>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            connection: default_connection(),
            default_queue: None,
            worker_name_prefix: default_worker_name_prefix(),
            worker_name: None,
            defaults: Map::new(),
        }
    }
}

impl QueueConfig {
    /// Creates a queue configuration with the given default queue.
    pub fn with_default_queue(name: impl Into<String>) -> Self {
        Self {
            default_queue: Some(name.into()),
            ..Self::default()
        }
    }
}

fn default_connection() -> String {
    "qless".to_string()
}

fn default_worker_name_prefix() -> String {
    "rust_".to_string()
}

/// Redis broker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis URL.
    #[serde(default = "default_redis_url")]
    pub url: String,

    /// Connection pool size.
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    /// Connection timeout in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Key prefix for bridge-owned keys.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Path of the broker's Lua script.
    #[serde(default = "default_script_path")]
    pub script_path: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            pool_size: default_pool_size(),
            connect_timeout_secs: default_connect_timeout(),
            key_prefix: default_key_prefix(),
            script_path: default_script_path(),
        }
    }
}

impl RedisConfig {
    /// Returns the connection timeout as a Duration.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_pool_size() -> usize {
    10
}

fn default_connect_timeout() -> u64 {
    5
}

fn default_key_prefix() -> String {
    "ql".to_string()
}

fn default_script_path() -> String {
    "qless.lua".to_string()
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON log lines instead of the human format.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
