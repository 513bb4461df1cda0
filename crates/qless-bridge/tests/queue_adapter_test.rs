//! Integration tests for QueueAdapter over an in-memory broker.

mod common;

use common::{adapter, adapter_with, config_with_defaults, put_data, BrokerCall};
use qless_bridge::payload;
use qless_bridge::{BrokerJob, Job, JobData, JobDescriptor, JobError, OptionSet};
use qless_bridge_config::QueueConfig;
use serde::{Serialize, Serializer};
use serde_json::json;
use std::time::Duration;

fn mailer() -> JobDescriptor {
    JobDescriptor::named("Mailer@send").unwrap()
}

#[derive(Serialize)]
struct ResizeImage {
    path: String,
    width: u32,
}

impl Job for ResizeImage {
    const NAME: &'static str = "Media\\ResizeImage";

    fn options(&self) -> OptionSet {
        OptionSet::new().with_tags(["media"])
    }
}

struct Unserializable;

impl Serialize for Unserializable {
    fn serialize<S: Serializer>(&self, _serializer: S) -> Result<S::Ok, S::Error> {
        Err(serde::ser::Error::custom("resource handles cannot be serialized"))
    }
}

#[derive(Serialize)]
struct HoldsHandle {
    handle: Unserializable,
}

impl Job for HoldsHandle {
    const NAME: &'static str = "Files\\Stream";
}

#[tokio::test]
async fn test_push_then_pop_round_trip() {
    let (adapter, broker) = adapter();

    let data = JobData::new()
        .with("to", "ops@example.com")
        .unwrap()
        .with_options(OptionSet::new().with_retries(2));
    let jid = adapter.push(&mailer(), data, None).await.unwrap();

    let (queue, request) = broker.only_put();
    assert_eq!(queue, "default");
    assert_eq!(request.klass, "Mailer@send");
    assert_eq!(request.retries, Some(2));

    let popped = adapter.pop(None).await.unwrap().expect("job available");
    assert_eq!(popped.handle().jid, jid.to_string());
    assert_eq!(popped.job(), "Mailer@send");
    assert_eq!(popped.display_name(), "Mailer");
    assert_eq!(popped.data().get("to"), Some(&json!("ops@example.com")));
    assert_eq!(popped.data().options().retries, Some(2));
}

#[tokio::test]
async fn test_pop_empty_queue() {
    let (adapter, broker) = adapter();

    assert!(adapter.pop(Some("idle")).await.unwrap().is_none());
    assert_eq!(
        broker.calls(),
        vec![BrokerCall::Pop {
            queue: "idle".to_string(),
            worker: "rust_testhost-1".to_string(),
        }]
    );
}

#[tokio::test]
async fn test_pop_uses_configured_worker_name() {
    let config = QueueConfig {
        worker_name: Some("billing".to_string()),
        worker_name_prefix: "app_".to_string(),
        ..QueueConfig::with_default_queue("default")
    };
    let (adapter, broker) = adapter_with(config);

    adapter.push(&mailer(), JobData::new(), None).await.unwrap();
    let popped = adapter.pop(None).await.unwrap().unwrap();

    assert_eq!(popped.handle().worker, "app_billing");
    assert!(matches!(
        broker.calls().last(),
        Some(BrokerCall::Pop { worker, .. }) if worker == "app_billing"
    ));
}

#[tokio::test]
async fn test_size_counts_pending_jobs() {
    let (adapter, _broker) = adapter();

    assert_eq!(adapter.size(None).await.unwrap(), 0);
    adapter.push(&mailer(), JobData::new(), None).await.unwrap();
    adapter.push(&mailer(), JobData::new(), None).await.unwrap();
    assert_eq!(adapter.size(None).await.unwrap(), 2);
    assert_eq!(adapter.size(Some("other")).await.unwrap(), 0);
}

#[tokio::test]
async fn test_option_precedence() {
    let config = config_with_defaults(json!({
        "retries": 1,
        "priority": 1,
        "tags": ["defaults"]
    }));
    let (adapter, broker) = adapter_with(config);

    let data = JobData::new()
        .with("id", 7)
        .unwrap()
        .with_options(OptionSet::new().with_retries(2).with_priority(2));
    let envelope = payload::encode(&mailer(), data.clone(), data.options());
    let call = OptionSet::new().with_priority(3);

    adapter
        .push_raw(&envelope.to_bytes().unwrap(), None, &call)
        .await
        .unwrap();

    let (_, request) = broker.only_put();
    assert_eq!(request.retries, Some(2));
    assert_eq!(request.priority, Some(3));
    assert_eq!(request.tags, Some(vec!["defaults".to_string()]));

    let stored = put_data(&request);
    assert_eq!(
        stored["__OPTIONS__"],
        json!({"retries": 2, "priority": 3, "tags": ["defaults"]})
    );
}

#[tokio::test]
async fn test_defaults_apply_to_plain_push() {
    let (adapter, broker) = adapter_with(config_with_defaults(json!({"retries": 9})));

    adapter.push(&mailer(), JobData::new(), None).await.unwrap();

    let (_, request) = broker.only_put();
    assert_eq!(request.retries, Some(9));
}

#[tokio::test]
async fn test_later_delay_overrides_embedded_delay() {
    let (adapter, broker) = adapter();

    let data = JobData::new().with_options(OptionSet::new().with_delay(99).with_retries(4));
    adapter
        .later(Duration::from_secs(30), &mailer(), data, Some("emails"))
        .await
        .unwrap();

    let (queue, request) = broker.only_put();
    assert_eq!(queue, "emails");
    assert_eq!(request.delay, Some(30));
    assert_eq!(request.retries, Some(4));
    assert_eq!(put_data(&request)["__OPTIONS__"]["delaySeconds"], 30);
}

#[tokio::test]
async fn test_later_rounds_partial_seconds_up() {
    let (adapter, broker) = adapter();

    adapter
        .later(Duration::from_millis(1500), &mailer(), JobData::new(), None)
        .await
        .unwrap();

    assert_eq!(broker.only_put().1.delay, Some(2));
}

#[tokio::test]
async fn test_recur_registers_schedule_with_interval() {
    let (adapter, broker) = adapter();

    let data = JobData::new()
        .with("report", "daily")
        .unwrap()
        .with_options(OptionSet::new().with_job_id("nightly").with_backlog(1));
    let schedule = adapter
        .recur(Duration::from_secs(3600), &mailer(), data, Some("reports"))
        .await
        .unwrap();

    assert_eq!(schedule.as_str(), "nightly");

    let calls = broker.calls();
    let [BrokerCall::Recur { queue, request }] = calls.as_slice() else {
        panic!("expected one recur call, got {:?}", calls);
    };
    assert_eq!(queue, "reports");
    assert_eq!(request.interval, 3600);
    assert_eq!(request.backlog, Some(1));

    let stored: serde_json::Value = serde_json::from_str(&request.data).unwrap();
    assert_eq!(stored["report"], "daily");
    assert_eq!(stored["__OPTIONS__"]["interval"], 3600);
}

#[tokio::test]
async fn test_object_job_state_and_options() {
    let (adapter, broker) = adapter();

    let job = ResizeImage {
        path: "a.png".to_string(),
        width: 640,
    };
    let descriptor = JobDescriptor::from_job(&job).unwrap();
    let data = JobData::new().with("width", 320).unwrap();

    adapter.push(&descriptor, data, None).await.unwrap();

    let (_, request) = broker.only_put();
    assert_eq!(request.klass, "Media\\ResizeImage");
    assert_eq!(request.tags, Some(vec!["media".to_string()]));

    let stored = put_data(&request);
    assert_eq!(stored["path"], "a.png");
    assert_eq!(stored["width"], 320);
}

#[tokio::test]
async fn test_unserializable_job_makes_no_broker_call() {
    let (_adapter, broker) = adapter();

    let err = JobDescriptor::from_job(&HoldsHandle {
        handle: Unserializable,
    })
    .unwrap_err();
    assert!(err.is_serialization());

    let err = JobData::new().with("handle", Unserializable).unwrap_err();
    assert!(err.is_serialization());

    assert!(broker.calls().is_empty());
}

#[derive(Serialize)]
struct RecordMetric {
    ratio: f64,
}

impl Job for RecordMetric {
    const NAME: &'static str = "Stats\\RecordMetric";
}

#[tokio::test]
async fn test_non_finite_floats_never_reach_broker() {
    let (adapter, broker) = adapter();

    let err = JobData::new().with("ratio", f64::NAN).unwrap_err();
    assert!(err.is_serialization());

    let err = JobDescriptor::from_job(&RecordMetric {
        ratio: f64::INFINITY,
    })
    .unwrap_err();
    assert!(err.is_serialization());

    assert!(broker.calls().is_empty());

    let job = JobDescriptor::from_job(&RecordMetric { ratio: 0.25 }).unwrap();
    adapter.push(&job, JobData::new(), None).await.unwrap();
    assert_eq!(put_data(&broker.only_put().1)["ratio"], 0.25);
}

#[tokio::test]
async fn test_later_with_huge_delay_saturates() {
    let (adapter, broker) = adapter();

    adapter
        .later(Duration::MAX, &mailer(), JobData::new(), None)
        .await
        .unwrap();

    assert_eq!(broker.only_put().1.delay, Some(u64::MAX));
}

#[tokio::test]
async fn test_undecodable_pop_returns_lease_handle() {
    let (adapter, broker) = adapter();

    broker.inject(BrokerJob {
        jid: "leased-1".to_string(),
        klass: "Mailer@send".to_string(),
        queue: "default".to_string(),
        data: "not json".to_string(),
        worker: String::new(),
        priority: 0,
        tags: Vec::new(),
        retries: 5,
        remaining: 5,
        expires: 0.0,
    });

    let err = adapter.pop(None).await.unwrap_err();
    assert!(err.is_serialization());

    let handle = err.leased_job().expect("lease handle kept");
    assert_eq!(handle.jid, "leased-1");
    assert_eq!(handle.worker, "rust_testhost-1");
    assert!(matches!(
        err,
        JobError::Undecodable { ref source, .. } if matches!(**source, JobError::Serialization(_))
    ));
}

#[tokio::test]
async fn test_missing_queue_is_configuration_error() {
    let (adapter, broker) = adapter_with(QueueConfig::default());

    let err = adapter.push(&mailer(), JobData::new(), None).await.unwrap_err();
    assert!(err.is_configuration());

    let err = adapter.pop(Some("")).await.unwrap_err();
    assert!(err.is_configuration());

    assert!(broker.calls().is_empty());
}

#[tokio::test]
async fn test_broker_errors_propagate() {
    let (adapter, broker) = adapter();
    broker.fail_with("queue is paused");

    let err = adapter.push(&mailer(), JobData::new(), None).await.unwrap_err();
    assert!(matches!(err, JobError::Broker(ref m) if m == "queue is paused"));

    let err = adapter.size(None).await.unwrap_err();
    assert!(err.is_broker());
}

#[tokio::test]
async fn test_push_raw_rejects_malformed_payloads() {
    let (adapter, broker) = adapter();

    let err = adapter
        .push_raw(b"{not json", None, &OptionSet::new())
        .await
        .unwrap_err();
    assert!(err.is_serialization());

    let err = adapter
        .push_raw(br#"{"displayName": "A", "data": {}}"#, None, &OptionSet::new())
        .await
        .unwrap_err();
    assert!(matches!(err, JobError::InvalidPayload(_)));

    assert!(broker.calls().is_empty());
}

#[tokio::test]
async fn test_push_raw_keeps_unknown_options() {
    let (adapter, broker) = adapter();

    let raw = json!({
        "displayName": "Import",
        "job": "Import@run",
        "data": {"file": "a.csv", "__OPTIONS__": {"retries": 1, "sticky": true}}
    });
    adapter
        .push_raw(raw.to_string().as_bytes(), Some("imports"), &OptionSet::new())
        .await
        .unwrap();

    let (queue, request) = broker.only_put();
    assert_eq!(queue, "imports");
    assert_eq!(
        put_data(&request),
        json!({"file": "a.csv", "__OPTIONS__": {"retries": 1, "sticky": true}})
    );
}

#[tokio::test]
async fn test_bulk_pushes_each_job_in_order() {
    let (adapter, broker) = adapter();

    let jobs = vec![
        JobDescriptor::named("A@run").unwrap(),
        JobDescriptor::named("B@run").unwrap(),
    ];
    let data = JobData::new().with("batch", 1).unwrap();

    let jids = adapter.bulk(&jobs, data, Some("batch")).await.unwrap();
    assert_eq!(jids.len(), 2);

    let klasses: Vec<String> = broker.puts().into_iter().map(|(_, r)| r.klass).collect();
    assert_eq!(klasses, vec!["A@run", "B@run"]);
}
