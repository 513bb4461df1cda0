//! qless bridge - Job Dispatch Adapter
//!
//! Lets an application's job-queue abstraction dispatch work through a qless
//! broker:
//! - One canonical payload envelope for every enqueue path
//! - Layered option reconciliation (defaults, embedded, call-site)
//! - Immediate, delayed, recurring and bulk enqueue
//! - Non-blocking pop with decoded payloads and lease handles
//! - Topic publish/subscribe fan-out
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     qless bridge                             │
//! ├──────────────────────────────────────────────────────────────┤
//! │                                                              │
//! │  push / later / recur / bulk / push_raw        publish       │
//! │              │                                    │          │
//! │              ▼                                    ▼          │
//! │  ┌────────────────────────┐      ┌─────────────────────────┐ │
//! │  │     Queue Adapter      │      │      Topic Adapter      │ │
//! │  └───────────┬────────────┘      └────────────┬────────────┘ │
//! │              └───────────────┬────────────────┘              │
//! │                              ▼                               │
//! │        Option Reconciler ──▶ Payload Codec                   │
//! │                              │                               │
//! │                              ▼                               │
//! │  ┌────────────────────────────────────────────────────────┐  │
//! │  │        BrokerClient  (RedisBroker over qless.lua)      │  │
//! │  └────────────────────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use qless_bridge::prelude::*;
//! use qless_bridge::redis::{create_pool, RedisBroker};
//! use std::sync::Arc;
//!
//! let pool = create_pool(&config.redis).await?;
//! let broker = RedisBroker::from_config(pool, &config.redis).await?;
//! let adapter = QueueAdapter::new(Arc::new(broker), config.queue.clone())?;
//!
//! let data = JobData::new()
//!     .with("to", "user@example.com")?
//!     .with_options(OptionSet::new().with_retries(3));
//!
//! let jid = adapter
//!     .push(&JobDescriptor::named("Mailer@send")?, data, Some("emails"))
//!     .await?;
//!
//! if let Some(job) = adapter.pop(Some("emails")).await? {
//!     println!("{} {:?}", job.job(), job.data().options());
//! }
//! ```

pub mod broker;
pub mod error;
mod finite;
pub mod job;
pub mod metrics;
pub mod options;
pub mod payload;
pub mod queue;
pub mod redis;
pub mod topic;

pub use broker::{BrokerClient, BrokerJob, PutRequest, RecurRequest};
pub use error::{JobError, JobResult};
pub use job::{Job, JobData, JobDescriptor, JobId, ScheduleId};
pub use metrics::{register_metrics, DispatchMetrics};
pub use options::{merge, OptionSet, OPTIONS_KEY};
pub use payload::Envelope;
pub use queue::{PoppedJob, QueueAdapter, QueueRef};
pub use topic::TopicRef;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::broker::BrokerClient;
    pub use crate::job::{Job, JobData, JobDescriptor, JobId};
    pub use crate::options::OptionSet;
    pub use crate::queue::QueueAdapter;
    pub use crate::{JobError, JobResult};
}
