//! Adapter error types.

use crate::broker::BrokerJob;
use thiserror::Error;

/// Result type for adapter operations.
pub type JobResult<T> = Result<T, JobError>;

/// Adapter errors.
///
/// Three classes surface to callers: serialization failures (raised before
/// any broker call), broker failures (propagated unchanged, never retried
/// here) and configuration failures.
#[derive(Debug, Error)]
pub enum JobError {
    /// Payload could not be encoded, or wire data is not valid JSON.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Wire data is valid JSON but not a valid envelope or job data.
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// Redis error.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Redis pool error.
    #[error("Redis pool error: {0}")]
    Pool(#[from] deadpool_redis::PoolError),

    /// Broker rejected or failed the request.
    #[error("Broker error: {0}")]
    Broker(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A job was leased but its payload could not be decoded.
    ///
    /// Carries the lease handle so the caller can still fail or retry the
    /// job with the broker.
    #[error("Leased job {} could not be decoded: {source}", .handle.jid)]
    Undecodable {
        handle: Box<BrokerJob>,
        #[source]
        source: Box<JobError>,
    },
}

impl JobError {
    /// Returns true if the payload could not be encoded or decoded.
    pub fn is_serialization(&self) -> bool {
        matches!(
            self,
            JobError::Serialization(_) | JobError::InvalidPayload(_) | JobError::Undecodable { .. }
        )
    }

    /// Returns true if the broker signalled a transport, protocol or storage failure.
    pub fn is_broker(&self) -> bool {
        matches!(
            self,
            JobError::Redis(_) | JobError::Pool(_) | JobError::Broker(_)
        )
    }

    /// Lease handle of a popped job that failed to decode.
    pub fn leased_job(&self) -> Option<&BrokerJob> {
        match self {
            JobError::Undecodable { handle, .. } => Some(&**handle),
            _ => None,
        }
    }

    /// Returns true if no queue could be resolved or the adapter is misconfigured.
    pub fn is_configuration(&self) -> bool {
        matches!(self, JobError::Configuration(_))
    }
}

impl From<qless_bridge_config::ConfigError> for JobError {
    fn from(err: qless_bridge_config::ConfigError) -> Self {
        JobError::Configuration(err.to_string())
    }
}
