//! Common test infrastructure for adapter integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use qless_bridge::{
    BrokerClient, BrokerJob, JobError, JobId, JobResult, PutRequest, QueueAdapter, RecurRequest,
    ScheduleId,
};
use qless_bridge_config::QueueConfig;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::Arc;

/// A broker call as seen by the test double.
#[derive(Debug, Clone, PartialEq)]
pub enum BrokerCall {
    Length { queue: String },
    Put { queue: String, request: PutRequest },
    Recur { queue: String, request: RecurRequest },
    Pop { queue: String, worker: String },
    TopicPut { topic: String, request: PutRequest },
    Subscribe { topic: String, queue: String },
    Unsubscribe { topic: String, queue: String },
}

#[derive(Default)]
struct State {
    calls: Vec<BrokerCall>,
    queues: HashMap<String, VecDeque<BrokerJob>>,
    subscriptions: BTreeMap<String, BTreeSet<String>>,
    failure: Option<String>,
}

/// In-memory broker that records every call.
///
/// Jobs put on a queue can be popped back in FIFO order. A failure set with
/// [`RecordingBroker::fail_with`] is returned by every later call.
pub struct RecordingBroker {
    state: Mutex<State>,
    worker: String,
}

impl RecordingBroker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(State::default()),
            worker: "testhost-1".to_string(),
        })
    }

    /// Make every subsequent call fail with a broker error.
    pub fn fail_with(&self, message: &str) {
        self.state.lock().failure = Some(message.to_string());
    }

    /// Places a job straight onto a queue, bypassing the adapter.
    pub fn inject(&self, job: BrokerJob) {
        self.state
            .lock()
            .queues
            .entry(job.queue.clone())
            .or_default()
            .push_back(job);
    }

    /// All calls, in order.
    pub fn calls(&self) -> Vec<BrokerCall> {
        self.state.lock().calls.clone()
    }

    /// Put requests submitted to queues, in order.
    pub fn puts(&self) -> Vec<(String, PutRequest)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                BrokerCall::Put { queue, request } => Some((queue, request)),
                _ => None,
            })
            .collect()
    }

    /// The single put request submitted so far.
    pub fn only_put(&self) -> (String, PutRequest) {
        let mut puts = self.puts();
        assert_eq!(puts.len(), 1, "expected exactly one put, got {:?}", puts);
        puts.remove(0)
    }

    /// Queues currently subscribed to a topic.
    pub fn subscribers(&self, topic: &str) -> Vec<String> {
        self.state
            .lock()
            .subscriptions
            .get(topic)
            .map(|queues| queues.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn record(&self, call: BrokerCall) -> JobResult<()> {
        let mut state = self.state.lock();
        state.calls.push(call);
        match &state.failure {
            Some(message) => Err(JobError::Broker(message.clone())),
            None => Ok(()),
        }
    }

    fn enqueue(state: &mut State, queue: &str, jid: JobId, request: &PutRequest) {
        let job = BrokerJob {
            jid: jid.to_string(),
            klass: request.klass.clone(),
            queue: queue.to_string(),
            data: request.data.clone(),
            worker: String::new(),
            priority: request.priority.unwrap_or(0),
            tags: request.tags.clone().unwrap_or_default(),
            retries: request.retries.unwrap_or(5),
            remaining: i64::from(request.retries.unwrap_or(5)),
            expires: 0.0,
        };
        state.queues.entry(queue.to_string()).or_default().push_back(job);
    }
}

#[async_trait]
impl BrokerClient for RecordingBroker {
    async fn queue_length(&self, queue: &str) -> JobResult<u64> {
        self.record(BrokerCall::Length { queue: queue.to_string() })?;
        let state = self.state.lock();
        Ok(state.queues.get(queue).map_or(0, |q| q.len() as u64))
    }

    async fn queue_put(&self, queue: &str, request: PutRequest) -> JobResult<JobId> {
        self.record(BrokerCall::Put {
            queue: queue.to_string(),
            request: request.clone(),
        })?;

        let jid = request.jid.clone().unwrap_or_default();
        Self::enqueue(&mut self.state.lock(), queue, jid.clone(), &request);
        Ok(jid)
    }

    async fn queue_recur(&self, queue: &str, request: RecurRequest) -> JobResult<ScheduleId> {
        let jid = request.jid.clone().unwrap_or_default();
        self.record(BrokerCall::Recur {
            queue: queue.to_string(),
            request,
        })?;
        Ok(ScheduleId::from(jid.to_string()))
    }

    async fn queue_pop(&self, queue: &str, worker: &str) -> JobResult<Option<BrokerJob>> {
        self.record(BrokerCall::Pop {
            queue: queue.to_string(),
            worker: worker.to_string(),
        })?;

        let mut state = self.state.lock();
        let job = state.queues.get_mut(queue).and_then(|q| q.pop_front());
        Ok(job.map(|mut job| {
            job.worker = worker.to_string();
            job
        }))
    }

    async fn topic_put(&self, topic: &str, request: PutRequest) -> JobResult<Vec<JobId>> {
        self.record(BrokerCall::TopicPut {
            topic: topic.to_string(),
            request: request.clone(),
        })?;

        let mut state = self.state.lock();
        let queues: Vec<String> = state
            .subscriptions
            .get(topic)
            .map(|queues| queues.iter().cloned().collect())
            .unwrap_or_default();

        let mut jids = Vec::with_capacity(queues.len());
        for queue in queues {
            let jid = JobId::new();
            Self::enqueue(&mut state, &queue, jid.clone(), &request);
            jids.push(jid);
        }
        Ok(jids)
    }

    async fn topic_subscribe(&self, topic: &str, queue: &str) -> JobResult<bool> {
        self.record(BrokerCall::Subscribe {
            topic: topic.to_string(),
            queue: queue.to_string(),
        })?;
        self.state
            .lock()
            .subscriptions
            .entry(topic.to_string())
            .or_default()
            .insert(queue.to_string());
        Ok(true)
    }

    async fn topic_unsubscribe(&self, topic: &str, queue: &str) -> JobResult<bool> {
        self.record(BrokerCall::Unsubscribe {
            topic: topic.to_string(),
            queue: queue.to_string(),
        })?;
        if let Some(queues) = self.state.lock().subscriptions.get_mut(topic) {
            queues.remove(queue);
        }
        Ok(true)
    }

    fn current_worker_identity(&self) -> String {
        self.worker.clone()
    }
}

/// Adapter over a fresh recording broker with `default` as the default queue.
pub fn adapter() -> (QueueAdapter, Arc<RecordingBroker>) {
    adapter_with(QueueConfig::with_default_queue("default"))
}

/// Adapter over a fresh recording broker with the given configuration.
pub fn adapter_with(config: QueueConfig) -> (QueueAdapter, Arc<RecordingBroker>) {
    let broker = RecordingBroker::new();
    let adapter = QueueAdapter::new(broker.clone(), config).expect("valid queue config");
    (adapter, broker)
}

/// Queue configuration with operation defaults.
pub fn config_with_defaults(defaults: Value) -> QueueConfig {
    let defaults: Map<String, Value> = match defaults {
        Value::Object(map) => map,
        other => panic!("defaults must be an object, got {}", other),
    };
    QueueConfig {
        defaults,
        ..QueueConfig::with_default_queue("default")
    }
}

/// Parses the data string of a put request.
pub fn put_data(request: &PutRequest) -> Value {
    serde_json::from_str(&request.data).expect("put data is JSON")
}
