//! Broker client seam.
//!
//! The broker owns storage, leasing, retries and recurrence. The adapter
//! reaches it only through [`BrokerClient`].

use crate::error::{JobError, JobResult};
use crate::job::{JobId, ScheduleId};
use crate::payload::Envelope;
use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// One-shot job submission.
#[derive(Debug, Clone, PartialEq)]
pub struct PutRequest {
    /// Job identity.
    pub klass: String,
    /// Job data as a JSON object string, options embedded.
    pub data: String,
    pub jid: Option<JobId>,
    pub delay: Option<u64>,
    pub retries: Option<u32>,
    pub priority: Option<i64>,
    pub tags: Option<Vec<String>>,
    pub depends: Option<Vec<String>>,
}

impl PutRequest {
    /// Builds a submission from an envelope and the options it carries.
    pub fn from_envelope(envelope: &Envelope) -> JobResult<Self> {
        let options = envelope.options();

        Ok(Self {
            klass: envelope.job.clone(),
            data: serde_json::to_string(&envelope.data)?,
            jid: options.job_id.clone().map(JobId::from),
            delay: options.delay_seconds,
            retries: options.retries,
            priority: options.priority,
            tags: options.tags.clone().map(|t| t.into_iter().collect()),
            depends: options.depends_on.clone(),
        })
    }
}

/// Recurring schedule registration.
#[derive(Debug, Clone, PartialEq)]
pub struct RecurRequest {
    /// Job identity.
    pub klass: String,
    /// Job data as a JSON object string, options embedded.
    pub data: String,
    /// Seconds between materialised jobs.
    pub interval: u64,
    pub offset: Option<u64>,
    pub jid: Option<JobId>,
    pub retries: Option<u32>,
    pub priority: Option<i64>,
    pub backlog: Option<u32>,
    pub tags: Option<Vec<String>>,
}

impl RecurRequest {
    /// Builds a registration from an envelope. The envelope's options must
    /// carry an interval.
    pub fn from_envelope(envelope: &Envelope) -> JobResult<Self> {
        let options = envelope.options();
        let interval = options.interval.ok_or_else(|| {
            JobError::InvalidPayload("recurring job requires an interval".to_string())
        })?;

        Ok(Self {
            klass: envelope.job.clone(),
            data: serde_json::to_string(&envelope.data)?,
            interval,
            offset: options.offset,
            jid: options.job_id.clone().map(JobId::from),
            retries: options.retries,
            priority: options.priority,
            backlog: options.backlog,
            tags: options.tags.clone().map(|t| t.into_iter().collect()),
        })
    }
}

/// Job as returned by the broker's pop.
///
/// Doubles as the lease handle: the job handler uses `jid`, `queue` and
/// `worker` to complete, fail or retry the job with the broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerJob {
    pub jid: String,
    pub klass: String,
    #[serde(default)]
    pub queue: String,
    /// Job data as the JSON string stored by the broker.
    pub data: String,
    #[serde(default)]
    pub worker: String,
    #[serde(default)]
    pub priority: i64,
    #[serde(default, deserialize_with = "lenient_list")]
    pub tags: Vec<String>,
    #[serde(default)]
    pub retries: u32,
    #[serde(default)]
    pub remaining: i64,
    /// Lease expiry, broker clock seconds.
    #[serde(default)]
    pub expires: f64,
}

/// The broker's script encodes an empty list as `{}`.
fn lenient_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::String(s) => Ok(s),
                other => Err(serde::de::Error::custom(format!(
                    "expected string tag, got {}",
                    other
                ))),
            })
            .collect(),
        Value::Object(map) if map.is_empty() => Ok(Vec::new()),
        Value::Null => Ok(Vec::new()),
        other => Err(serde::de::Error::custom(format!(
            "expected list of tags, got {}",
            other
        ))),
    }
}

/// Primitives the adapter consumes from the distributed broker.
#[async_trait]
pub trait BrokerClient: Send + Sync {
    /// Pending job count for a queue.
    async fn queue_length(&self, queue: &str) -> JobResult<u64>;

    /// Submits a job to a queue.
    async fn queue_put(&self, queue: &str, request: PutRequest) -> JobResult<JobId>;

    /// Registers a recurring schedule on a queue.
    async fn queue_recur(&self, queue: &str, request: RecurRequest) -> JobResult<ScheduleId>;

    /// Leases the next job on a queue to `worker`, if any.
    async fn queue_pop(&self, queue: &str, worker: &str) -> JobResult<Option<BrokerJob>>;

    /// Submits a job to every queue subscribed to a topic.
    async fn topic_put(&self, topic: &str, request: PutRequest) -> JobResult<Vec<JobId>>;

    /// Subscribes a queue to a topic. Idempotent.
    async fn topic_subscribe(&self, topic: &str, queue: &str) -> JobResult<bool>;

    /// Unsubscribes a queue from a topic. Idempotent.
    async fn topic_unsubscribe(&self, topic: &str, queue: &str) -> JobResult<bool>;

    /// Worker name of this process as the broker knows it.
    fn current_worker_identity(&self) -> String;
}
