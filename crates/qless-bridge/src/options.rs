//! Dispatch options and their reconciliation.
//!
//! Options reach the broker from three sources. From lowest to highest
//! precedence:
//!
//! 1. operation defaults (adapter configuration),
//! 2. options embedded in the job data,
//! 3. options passed explicitly at the call site.
//!
//! The merge is shallow and per key: a key set in a higher source replaces
//! the lower value outright. Collections are never unioned. No semantic
//! validation happens here; the broker boundary owns that.

use crate::error::{JobError, JobResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// Reserved job-data key that carries the option set on the wire.
pub const OPTIONS_KEY: &str = "__OPTIONS__";

/// Options controlling how the broker runs a job.
///
/// Durations are whole seconds. Keys the adapter does not recognise are kept
/// in `extra` and travel with the job untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionSet {
    /// Caller-chosen job identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,

    /// Seconds to wait before the job becomes available.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_seconds: Option<u64>,

    /// Retry budget.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retries: Option<u32>,

    /// Priority, higher runs first.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,

    /// Tags attached to the job.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<BTreeSet<String>>,

    /// Job ids that must complete first.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depends_on: Option<Vec<String>>,

    /// Recurrence interval in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<u64>,

    /// Recurrence offset in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,

    /// Maximum number of missed recurrences to materialise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backlog: Option<u32>,

    /// Unrecognised keys, preserved as-is.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl OptionSet {
    /// Creates an empty option set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses an option set from the value stored under [`OPTIONS_KEY`].
    pub fn from_value(value: Value) -> JobResult<Self> {
        if !value.is_object() {
            return Err(JobError::InvalidPayload(format!(
                "{} must be an object",
                OPTIONS_KEY
            )));
        }

        serde_json::from_value(value)
            .map_err(|e| JobError::InvalidPayload(format!("invalid {}: {}", OPTIONS_KEY, e)))
    }

    /// Parses operation defaults from a configuration map.
    pub fn from_map(map: &Map<String, Value>) -> JobResult<Self> {
        Self::from_value(Value::Object(map.clone()))
    }

    /// Converts the option set into its wire object.
    pub fn to_value(&self) -> Value {
        // Plain struct of strings, integers and string collections; cannot fail.
        serde_json::to_value(self).unwrap_or_else(|_| Value::Object(Map::new()))
    }

    /// Returns true if no option is set.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Set the job id.
    pub fn with_job_id(mut self, job_id: impl Into<String>) -> Self {
        self.job_id = Some(job_id.into());
        self
    }

    /// Set the delay in seconds.
    pub fn with_delay(mut self, seconds: u64) -> Self {
        self.delay_seconds = Some(seconds);
        self
    }

    /// Set the retry budget.
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }

    /// Set the priority.
    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Replace the tags.
    pub fn with_tags(mut self, tags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.tags = Some(tags.into_iter().map(Into::into).collect());
        self
    }

    /// Replace the dependencies.
    pub fn with_depends_on(mut self, jids: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.depends_on = Some(jids.into_iter().map(Into::into).collect());
        self
    }

    /// Set the recurrence interval in seconds.
    pub fn with_interval(mut self, seconds: u64) -> Self {
        self.interval = Some(seconds);
        self
    }

    /// Set the recurrence offset in seconds.
    pub fn with_offset(mut self, seconds: u64) -> Self {
        self.offset = Some(seconds);
        self
    }

    /// Set the recurrence backlog.
    pub fn with_backlog(mut self, backlog: u32) -> Self {
        self.backlog = Some(backlog);
        self
    }

    /// Set an option the adapter does not interpret.
    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Lays `higher` over `self`, key by key.
    pub fn overlay(self, higher: &OptionSet) -> Self {
        let mut extra = self.extra;
        for (key, value) in &higher.extra {
            extra.insert(key.clone(), value.clone());
        }

        Self {
            job_id: pick(self.job_id, &higher.job_id),
            delay_seconds: pick(self.delay_seconds, &higher.delay_seconds),
            retries: pick(self.retries, &higher.retries),
            priority: pick(self.priority, &higher.priority),
            tags: pick(self.tags, &higher.tags),
            depends_on: pick(self.depends_on, &higher.depends_on),
            interval: pick(self.interval, &higher.interval),
            offset: pick(self.offset, &higher.offset),
            backlog: pick(self.backlog, &higher.backlog),
            extra,
        }
    }
}

fn pick<T: Clone>(low: Option<T>, high: &Option<T>) -> Option<T> {
    high.clone().or(low)
}

/// Reconciles the three option sources into the set handed to the broker.
///
/// Precedence, low to high: `defaults` < `embedded` < `call`.
pub fn merge(defaults: &OptionSet, embedded: &OptionSet, call: &OptionSet) -> OptionSet {
    defaults.clone().overlay(embedded).overlay(call)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_precedence_example() {
        let defaults = OptionSet::new().with_retries(5);
        let embedded = OptionSet::new().with_retries(3).with_priority(1);
        let call = OptionSet::new().with_priority(9);

        let merged = merge(&defaults, &embedded, &call);
        assert_eq!(merged.retries, Some(3));
        assert_eq!(merged.priority, Some(9));
        assert_eq!(merged.delay_seconds, None);
    }

    #[test]
    fn test_precedence_every_combination() {
        // (defaults, embedded, call) -> expected
        let cases = [
            (None, None, None, None),
            (Some(1), None, None, Some(1)),
            (None, Some(2), None, Some(2)),
            (None, None, Some(3), Some(3)),
            (Some(1), Some(2), None, Some(2)),
            (Some(1), None, Some(3), Some(3)),
            (None, Some(2), Some(3), Some(3)),
            (Some(1), Some(2), Some(3), Some(3)),
        ];

        for (d, e, c, expected) in cases {
            let set = |v: Option<u64>| OptionSet { delay_seconds: v, ..OptionSet::default() };
            let merged = merge(&set(d), &set(e), &set(c));
            assert_eq!(merged.delay_seconds, expected, "case {:?}", (d, e, c));
        }
    }

    #[test]
    fn test_tags_replaced_not_unioned() {
        let embedded = OptionSet::new().with_tags(["a", "b"]);
        let call = OptionSet::new().with_tags(["c"]);

        let merged = merge(&OptionSet::new(), &embedded, &call);
        let tags: Vec<_> = merged.tags.unwrap().into_iter().collect();
        assert_eq!(tags, vec!["c".to_string()]);
    }

    #[test]
    fn test_extra_keys_merge_per_key() {
        let embedded = OptionSet::new()
            .with_extra("queueHint", json!("slow"))
            .with_extra("owner", json!("billing"));
        let call = OptionSet::new().with_extra("owner", json!("ops"));

        let merged = merge(&OptionSet::new(), &embedded, &call);
        assert_eq!(merged.extra["queueHint"], json!("slow"));
        assert_eq!(merged.extra["owner"], json!("ops"));
    }

    #[test]
    fn test_no_semantic_validation() {
        let call = OptionSet::new().with_priority(-1_000).with_retries(0);
        let merged = merge(&OptionSet::new(), &OptionSet::new(), &call);
        assert_eq!(merged.priority, Some(-1_000));
        assert_eq!(merged.retries, Some(0));
    }

    #[test]
    fn test_wire_names() {
        let options = OptionSet::new()
            .with_job_id("abc")
            .with_delay(30)
            .with_depends_on(["x"])
            .with_tags(["t"]);

        assert_eq!(
            options.to_value(),
            json!({"jobId": "abc", "delaySeconds": 30, "tags": ["t"], "dependsOn": ["x"]})
        );
    }

    #[test]
    fn test_from_value_keeps_unknown_keys() {
        let options = OptionSet::from_value(json!({"retries": 2, "color": "blue"})).unwrap();
        assert_eq!(options.retries, Some(2));
        assert_eq!(options.extra["color"], json!("blue"));
        assert_eq!(options.to_value(), json!({"retries": 2, "color": "blue"}));
    }

    #[test]
    fn test_from_value_rejects_non_object() {
        let err = OptionSet::from_value(json!([1, 2])).unwrap_err();
        assert!(matches!(err, JobError::InvalidPayload(_)));
    }

    #[test]
    fn test_from_value_rejects_mistyped_key() {
        let err = OptionSet::from_value(json!({"retries": "many"})).unwrap_err();
        assert!(matches!(err, JobError::InvalidPayload(_)));
    }

    #[test]
    fn test_is_empty() {
        assert!(OptionSet::new().is_empty());
        assert!(!OptionSet::new().with_backlog(1).is_empty());
        assert!(!OptionSet::new().with_extra("k", json!(1)).is_empty());
    }
}
