//! Prometheus metrics for the dispatch adapter.
//!
//! Only the `metrics` facade is used here; installing an exporter is up to
//! the host process.

use metrics::{counter, describe_counter, describe_histogram, histogram};
use std::time::Duration;

/// Metric names for the dispatch adapter.
pub mod names {
    /// Total jobs submitted to queues.
    pub const JOBS_ENQUEUED_TOTAL: &str = "qless_bridge_jobs_enqueued_total";
    /// Total recurring schedules registered.
    pub const JOBS_RECURRING_TOTAL: &str = "qless_bridge_jobs_recurring_total";
    /// Total jobs popped.
    pub const JOBS_POPPED_TOTAL: &str = "qless_bridge_jobs_popped_total";
    /// Total pops that found no job.
    pub const POP_EMPTY_TOTAL: &str = "qless_bridge_pop_empty_total";
    /// Total jobs published to topics.
    pub const TOPIC_PUBLISHED_TOTAL: &str = "qless_bridge_topic_published_total";
    /// Total payloads that failed to encode or decode.
    pub const ENCODE_FAILURES_TOTAL: &str = "qless_bridge_encode_failures_total";
    /// Broker call duration in seconds.
    pub const BROKER_CALL_DURATION: &str = "qless_bridge_broker_call_duration_seconds";
}

/// Register all metric descriptions.
pub fn register_metrics() {
    describe_counter!(
        names::JOBS_ENQUEUED_TOTAL,
        "Total number of jobs submitted to queues"
    );
    describe_counter!(
        names::JOBS_RECURRING_TOTAL,
        "Total number of recurring schedules registered"
    );
    describe_counter!(
        names::JOBS_POPPED_TOTAL,
        "Total number of jobs popped for processing"
    );
    describe_counter!(
        names::POP_EMPTY_TOTAL,
        "Total number of pops that found no available job"
    );
    describe_counter!(
        names::TOPIC_PUBLISHED_TOTAL,
        "Total number of jobs fanned out through topics"
    );
    describe_counter!(
        names::ENCODE_FAILURES_TOTAL,
        "Total number of payloads that could not be encoded or decoded"
    );
    describe_histogram!(
        names::BROKER_CALL_DURATION,
        "Broker call duration in seconds"
    );
}

/// Dispatch metrics recorder.
#[derive(Clone)]
pub struct DispatchMetrics;

impl DispatchMetrics {
    /// Record a job submitted to a queue.
    pub fn job_enqueued(queue: &str, job_name: &str) {
        counter!(
            names::JOBS_ENQUEUED_TOTAL,
            "queue" => queue.to_string(),
            "job_name" => job_name.to_string()
        )
        .increment(1);
    }

    /// Record a recurring schedule registered.
    pub fn job_recurring(queue: &str, job_name: &str) {
        counter!(
            names::JOBS_RECURRING_TOTAL,
            "queue" => queue.to_string(),
            "job_name" => job_name.to_string()
        )
        .increment(1);
    }

    /// Record a pop, empty or not.
    pub fn job_popped(queue: &str, found: bool) {
        let name = if found {
            names::JOBS_POPPED_TOTAL
        } else {
            names::POP_EMPTY_TOTAL
        };
        counter!(name, "queue" => queue.to_string()).increment(1);
    }

    /// Record a topic publish and its fan-out width.
    pub fn topic_published(topic: &str, fan_out: usize) {
        counter!(
            names::TOPIC_PUBLISHED_TOTAL,
            "topic" => topic.to_string()
        )
        .increment(fan_out as u64);
    }

    /// Record a payload encode or decode failure.
    pub fn encode_failed() {
        counter!(names::ENCODE_FAILURES_TOTAL).increment(1);
    }

    /// Record a broker call duration.
    pub fn broker_call(operation: &str, duration: Duration) {
        histogram!(
            names::BROKER_CALL_DURATION,
            "op" => operation.to_string()
        )
        .record(duration.as_secs_f64());
    }
}
