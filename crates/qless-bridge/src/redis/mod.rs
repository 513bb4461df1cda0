//! Redis-backed broker client speaking the qless Lua script.

mod broker;

pub use broker::RedisBroker;

use crate::error::{JobError, JobResult};
use deadpool_redis::{Config, Pool, Runtime};
use qless_bridge_config::RedisConfig;
use tracing::info;

/// Create a Redis connection pool.
pub async fn create_pool(config: &RedisConfig) -> JobResult<Pool> {
    info!(url = %config.url, "Creating Redis connection pool for qless broker...");

    let cfg = Config::from_url(&config.url);

    let pool = cfg
        .builder()
        .map_err(|e| JobError::Configuration(format!("Invalid Redis config: {}", e)))?
        .max_size(config.pool_size)
        .runtime(Runtime::Tokio1)
        .create_timeout(Some(config.connect_timeout()))
        .wait_timeout(Some(config.connect_timeout()))
        .build()
        .map_err(|e| JobError::Configuration(format!("Failed to create pool: {}", e)))?;

    // Test connection
    let mut conn = pool.get().await?;
    redis::cmd("PING").query_async::<String>(&mut *conn).await?;

    info!("Redis connection pool created successfully");

    Ok(pool)
}

/// Key builder for bridge-owned Redis keys.
///
/// Queue and job keys belong to the qless script; only topic subscriptions
/// are kept by the bridge.
#[derive(Debug, Clone)]
pub struct BrokerKeys {
    prefix: String,
}

impl BrokerKeys {
    /// Create a new key builder with the given prefix.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Topic subscription set (members are queue names).
    pub fn topic(&self, topic: &str) -> String {
        format!("{}:t:{}", self.prefix, topic)
    }
}

impl Default for BrokerKeys {
    fn default() -> Self {
        Self::new("ql")
    }
}
