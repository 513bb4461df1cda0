//! Topic adapter: publish/subscribe over the same codec and reconciler as
//! the queue path.

use crate::broker::{BrokerClient, PutRequest};
use crate::error::{JobError, JobResult};
use crate::job::{JobData, JobDescriptor, JobId};
use crate::metrics::DispatchMetrics;
use crate::options::OptionSet;
use crate::queue::{encode_embedded, timed, QueueAdapter};
use tracing::debug;

/// Borrowed handle on a named broker topic, valid for one operation.
pub struct TopicRef<'a> {
    name: &'a str,
    broker: &'a dyn BrokerClient,
}

impl<'a> TopicRef<'a> {
    /// Topic name.
    pub fn name(&self) -> &str {
        self.name
    }

    /// Fans a job out to every subscribed queue.
    pub async fn put(&self, request: PutRequest) -> JobResult<Vec<JobId>> {
        timed("topic_put", self.broker.topic_put(self.name, request)).await
    }
}

impl QueueAdapter {
    /// Resolves a topic handle. Topics have no default.
    pub fn resolve_topic<'a>(&'a self, name: &'a str) -> JobResult<TopicRef<'a>> {
        if name.is_empty() {
            return Err(JobError::Configuration("topic name cannot be empty".to_string()));
        }

        Ok(TopicRef {
            name,
            broker: self.broker(),
        })
    }

    /// Subscribes a queue (or the default queue) to a topic.
    ///
    /// Subscribing twice is a successful no-op.
    pub async fn subscribe(&self, topic: &str, queue: Option<&str>) -> JobResult<bool> {
        let topic = self.resolve_topic(topic)?;
        let queue = self.resolve_queue(queue)?;

        let subscribed = queue.subscribe(topic.name()).await?;
        debug!(topic = %topic.name(), queue = %queue.name(), "Subscribed queue to topic");
        Ok(subscribed)
    }

    /// Unsubscribes a queue (or the default queue) from a topic.
    pub async fn unsubscribe(&self, topic: &str, queue: Option<&str>) -> JobResult<bool> {
        let topic = self.resolve_topic(topic)?;
        let queue = self.resolve_queue(queue)?;

        let unsubscribed = queue.unsubscribe(topic.name()).await?;
        debug!(topic = %topic.name(), queue = %queue.name(), "Unsubscribed queue from topic");
        Ok(unsubscribed)
    }

    /// Publishes a job to every queue subscribed to `topic`.
    ///
    /// Embedded options are read from `data` itself and reconciled with the
    /// configured defaults and `options` exactly as on the queue path.
    /// Returns one job id per receiving queue.
    pub async fn publish(
        &self,
        topic: &str,
        job: &JobDescriptor,
        data: JobData,
        options: &OptionSet,
    ) -> JobResult<Vec<JobId>> {
        let topic = self.resolve_topic(topic)?;
        let envelope = self.reconcile(encode_embedded(job, data), options);
        let request = PutRequest::from_envelope(&envelope)?;

        let jids = topic.put(request).await?;

        DispatchMetrics::topic_published(topic.name(), jids.len());
        debug!(
            topic = %topic.name(),
            job = %envelope.job,
            fan_out = jids.len(),
            "Published job to topic"
        );

        Ok(jids)
    }
}
