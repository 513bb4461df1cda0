//! Queue adapter.

use crate::broker::{BrokerClient, BrokerJob, PutRequest, RecurRequest};
use crate::error::{JobError, JobResult};
use crate::job::{JobData, JobDescriptor, JobId, ScheduleId};
use crate::metrics::DispatchMetrics;
use crate::options::{merge, OptionSet};
use crate::payload::{self, job_data_for, Envelope};
use qless_bridge_config::QueueConfig;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Borrowed handle on a named broker queue, valid for one operation.
pub struct QueueRef<'a> {
    name: &'a str,
    broker: &'a dyn BrokerClient,
}

impl<'a> QueueRef<'a> {
    /// Queue name.
    pub fn name(&self) -> &str {
        self.name
    }

    /// Pending job count.
    pub async fn length(&self) -> JobResult<u64> {
        timed("length", self.broker.queue_length(self.name)).await
    }

    /// Submits a job.
    pub async fn put(&self, request: PutRequest) -> JobResult<JobId> {
        timed("put", self.broker.queue_put(self.name, request)).await
    }

    /// Registers a recurring schedule.
    pub async fn recur(&self, request: RecurRequest) -> JobResult<ScheduleId> {
        timed("recur", self.broker.queue_recur(self.name, request)).await
    }

    /// Leases the next job to `worker`.
    pub async fn pop(&self, worker: &str) -> JobResult<Option<BrokerJob>> {
        timed("pop", self.broker.queue_pop(self.name, worker)).await
    }

    /// Subscribes this queue to a topic.
    pub async fn subscribe(&self, topic: &str) -> JobResult<bool> {
        timed("subscribe", self.broker.topic_subscribe(topic, self.name)).await
    }

    /// Unsubscribes this queue from a topic.
    pub async fn unsubscribe(&self, topic: &str) -> JobResult<bool> {
        timed("unsubscribe", self.broker.topic_unsubscribe(topic, self.name)).await
    }
}

pub(crate) async fn timed<T>(
    operation: &str,
    call: impl std::future::Future<Output = JobResult<T>>,
) -> JobResult<T> {
    let started = Instant::now();
    let result = call.await;
    DispatchMetrics::broker_call(operation, started.elapsed());
    result
}

/// A job leased from the broker, decoded.
#[derive(Debug, Clone)]
pub struct PoppedJob {
    envelope: Envelope,
    handle: BrokerJob,
}

impl PoppedJob {
    /// Decoded job identity.
    pub fn job(&self) -> &str {
        &self.envelope.job
    }

    /// Display name derived from the identity.
    pub fn display_name(&self) -> &str {
        &self.envelope.display_name
    }

    /// Decoded job data. Embedded options are available via `data().options()`.
    pub fn data(&self) -> &JobData {
        &self.envelope.data
    }

    /// The decoded envelope.
    pub fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    /// Broker lease handle, for completing, failing or retrying the job.
    pub fn handle(&self) -> &BrokerJob {
        &self.handle
    }

    /// Splits into the envelope and the lease handle.
    pub fn into_parts(self) -> (Envelope, BrokerJob) {
        (self.envelope, self.handle)
    }
}

/// Adapter from framework job operations to broker primitives.
///
/// Holds no per-operation state: every call resolves its own queue handle
/// and runs its own merge, encode and submit sequence, so a shared adapter
/// can be used concurrently without locking.
pub struct QueueAdapter {
    broker: Arc<dyn BrokerClient>,
    config: QueueConfig,
    defaults: OptionSet,
}

impl QueueAdapter {
    /// Creates an adapter. Fails if the configured operation defaults are
    /// not a valid option set.
    pub fn new(broker: Arc<dyn BrokerClient>, config: QueueConfig) -> JobResult<Self> {
        let defaults = OptionSet::from_map(&config.defaults)
            .map_err(|e| JobError::Configuration(format!("invalid queue.defaults: {}", e)))?;

        Ok(Self {
            broker,
            config,
            defaults,
        })
    }

    /// The broker client.
    pub fn broker(&self) -> &dyn BrokerClient {
        self.broker.as_ref()
    }

    /// Connection name from configuration.
    pub fn connection_name(&self) -> &str {
        &self.config.connection
    }

    /// Configured default queue.
    pub fn default_queue(&self) -> Option<&str> {
        self.config.default_queue.as_deref()
    }

    /// Operation default options.
    pub fn defaults(&self) -> &OptionSet {
        &self.defaults
    }

    /// Resolves a queue handle from an explicit name or the configured default.
    ///
    /// An empty name counts as unset.
    pub fn resolve_queue<'a>(&'a self, name: Option<&'a str>) -> JobResult<QueueRef<'a>> {
        let name = name
            .filter(|n| !n.is_empty())
            .or_else(|| self.default_queue().filter(|n| !n.is_empty()))
            .ok_or_else(|| {
                JobError::Configuration(
                    "no queue name given and no default queue configured".to_string(),
                )
            })?;

        Ok(QueueRef {
            name,
            broker: self.broker.as_ref(),
        })
    }

    /// Worker identity used for pops: the configured prefix followed by the
    /// configured worker name, or the broker's worker identity.
    pub fn worker_identity(&self) -> String {
        let name = match &self.config.worker_name {
            Some(name) => name.clone(),
            None => self.broker.current_worker_identity(),
        };
        format!("{}{}", self.config.worker_name_prefix, name)
    }

    /// Pending job count.
    pub async fn size(&self, queue: Option<&str>) -> JobResult<u64> {
        self.resolve_queue(queue)?.length().await
    }

    /// Pushes a job for immediate execution.
    pub async fn push(
        &self,
        job: &JobDescriptor,
        data: JobData,
        queue: Option<&str>,
    ) -> JobResult<JobId> {
        self.submit(encode_embedded(job, data), queue, &OptionSet::new())
            .await
    }

    /// Pushes a pre-encoded envelope.
    ///
    /// The envelope's embedded options are reconciled with the configured
    /// defaults and `options`, and the result replaces the embedded options
    /// before submission.
    pub async fn push_raw(
        &self,
        payload: &[u8],
        queue: Option<&str>,
        options: &OptionSet,
    ) -> JobResult<JobId> {
        let envelope = payload::decode(payload).map_err(|e| {
            DispatchMetrics::encode_failed();
            e
        })?;
        self.submit(envelope, queue, options).await
    }

    /// Pushes a job that becomes available after `delay`, rounded up to whole
    /// seconds.
    ///
    /// The delay is a call-site option, so it overrides a delay embedded in
    /// the job data.
    pub async fn later(
        &self,
        delay: Duration,
        job: &JobDescriptor,
        data: JobData,
        queue: Option<&str>,
    ) -> JobResult<JobId> {
        let call = OptionSet::new().with_delay(whole_seconds(delay));
        self.submit(encode_embedded(job, data), queue, &call).await
    }

    /// Registers a recurring schedule that materialises the job every `interval`.
    pub async fn recur(
        &self,
        interval: Duration,
        job: &JobDescriptor,
        data: JobData,
        queue: Option<&str>,
    ) -> JobResult<ScheduleId> {
        let queue = self.resolve_queue(queue)?;
        let call = OptionSet::new().with_interval(whole_seconds(interval));
        let envelope = self.reconcile(encode_embedded(job, data), &call);
        let request = RecurRequest::from_envelope(&envelope)?;

        let schedule = queue.recur(request).await?;

        DispatchMetrics::job_recurring(queue.name(), &envelope.display_name);
        debug!(
            queue = %queue.name(),
            schedule = %schedule,
            job = %envelope.job,
            interval = ?envelope.options().interval,
            "Registered recurring job"
        );

        Ok(schedule)
    }

    /// Pushes each job in order with the same data, stopping at the first error.
    pub async fn bulk(
        &self,
        jobs: &[JobDescriptor],
        data: JobData,
        queue: Option<&str>,
    ) -> JobResult<Vec<JobId>> {
        let mut ids = Vec::with_capacity(jobs.len());
        for job in jobs {
            ids.push(self.push(job, data.clone(), queue).await?);
        }
        Ok(ids)
    }

    /// Leases the next job, or returns `None` when the queue has none.
    ///
    /// No waiting happens here; callers wanting to block loop with their
    /// own backoff and cancellation.
    pub async fn pop(&self, queue: Option<&str>) -> JobResult<Option<PoppedJob>> {
        let queue = self.resolve_queue(queue)?;
        let worker = self.worker_identity();

        let Some(handle) = queue.pop(&worker).await? else {
            DispatchMetrics::job_popped(queue.name(), false);
            return Ok(None);
        };

        let envelope = match payload::from_broker(&handle.klass, &handle.data) {
            Ok(envelope) => envelope,
            Err(source) => {
                DispatchMetrics::encode_failed();
                warn!(
                    queue = %queue.name(),
                    jid = %handle.jid,
                    error = %source,
                    "Leased job could not be decoded"
                );
                return Err(JobError::Undecodable {
                    handle: Box::new(handle),
                    source: Box::new(source),
                });
            }
        };

        DispatchMetrics::job_popped(queue.name(), true);
        debug!(
            queue = %queue.name(),
            jid = %handle.jid,
            job = %envelope.job,
            worker = %worker,
            "Popped job"
        );

        Ok(Some(PoppedJob { envelope, handle }))
    }

    /// Merges defaults, the envelope's embedded options and `call`, and
    /// writes the result back into the envelope.
    pub(crate) fn reconcile(&self, mut envelope: Envelope, call: &OptionSet) -> Envelope {
        let options = merge(&self.defaults, envelope.options(), call);
        envelope.data.set_options(options);
        envelope
    }

    /// The single funnel every one-shot enqueue passes through.
    async fn submit(
        &self,
        envelope: Envelope,
        queue: Option<&str>,
        call: &OptionSet,
    ) -> JobResult<JobId> {
        let queue = self.resolve_queue(queue)?;
        let envelope = self.reconcile(envelope, call);
        let request = PutRequest::from_envelope(&envelope)?;

        let jid = queue.put(request).await?;

        DispatchMetrics::job_enqueued(queue.name(), &envelope.display_name);
        debug!(
            queue = %queue.name(),
            jid = %jid,
            job = %envelope.job,
            delay = ?envelope.options().delay_seconds,
            "Enqueued job"
        );

        Ok(jid)
    }
}

/// Encodes a job with its embedded options only; reconciliation happens later.
pub(crate) fn encode_embedded(job: &JobDescriptor, data: JobData) -> Envelope {
    let data = job_data_for(job, data);
    let embedded = data.options().clone();
    payload::encode(job, data, &embedded)
}

fn whole_seconds(duration: Duration) -> u64 {
    let secs = duration.as_secs();
    if duration.subsec_nanos() > 0 {
        secs.saturating_add(1)
    } else {
        secs
    }
}
