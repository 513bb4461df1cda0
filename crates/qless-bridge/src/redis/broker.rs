//! Broker client over the qless Lua script.

use super::BrokerKeys;
use crate::broker::{BrokerClient, BrokerJob, PutRequest, RecurRequest};
use crate::error::{JobError, JobResult};
use crate::job::{JobId, ScheduleId};
use async_trait::async_trait;
use chrono::Utc;
use deadpool_redis::Pool;
use qless_bridge_config::RedisConfig;
use redis::{AsyncCommands, ErrorKind, FromRedisValue, RedisError, Script};
use serde_json::Value;
use tracing::{debug, info, warn};

/// Redis-backed broker client.
///
/// Queue and job state is owned by the qless script; every queue primitive
/// is one script call of the form `<command> <now> <args...>`.
pub struct RedisBroker {
    pool: Pool,
    script: Script,
    keys: BrokerKeys,
    worker_name: String,
}

impl RedisBroker {
    /// Create a broker client from the script source.
    pub fn new(pool: Pool, script_source: &str, key_prefix: impl Into<String>) -> Self {
        Self {
            pool,
            script: Script::new(script_source),
            keys: BrokerKeys::new(key_prefix),
            worker_name: host_worker_name(),
        }
    }

    /// Create a broker client, reading the script from `redis.script_path`.
    pub async fn from_config(pool: Pool, config: &RedisConfig) -> JobResult<Self> {
        let source = tokio::fs::read_to_string(&config.script_path)
            .await
            .map_err(|e| {
                JobError::Configuration(format!(
                    "Failed to read qless script {}: {}",
                    config.script_path, e
                ))
            })?;

        info!(script = %config.script_path, "Loaded qless script");
        Ok(Self::new(pool, &source, config.key_prefix.clone()))
    }

    /// Get a connection from the pool.
    async fn conn(&self) -> JobResult<deadpool_redis::Connection> {
        Ok(self.pool.get().await?)
    }

    /// Run one script command. The script is loaded on first use.
    async fn call<T: FromRedisValue>(&self, command: &str, args: &[String]) -> JobResult<T> {
        let mut conn = self.conn().await?;

        let mut invocation = self.script.prepare_invoke();
        invocation.arg(command).arg(now());
        for arg in args {
            invocation.arg(arg);
        }

        let result: T = invocation
            .invoke_async(&mut *conn)
            .await
            .map_err(script_error)?;
        Ok(result)
    }
}

/// Script-raised errors are broker rejections; the rest are transport errors.
fn script_error(err: RedisError) -> JobError {
    match err.kind() {
        ErrorKind::ResponseError | ErrorKind::ExtensionError => JobError::Broker(err.to_string()),
        _ => JobError::Redis(err),
    }
}

/// Broker clock in seconds.
fn now() -> String {
    let millis = Utc::now().timestamp_millis();
    format!("{:.3}", millis as f64 / 1000.0)
}

fn host_worker_name() -> String {
    let host = gethostname::gethostname().to_string_lossy().into_owned();
    let host = if host.is_empty() { "localhost".to_string() } else { host };
    format!("{}-{}", host, std::process::id())
}

fn json_list(items: &[String]) -> String {
    Value::from(items.to_vec()).to_string()
}

/// Arguments for `put`, after `now`.
pub(crate) fn put_args(worker: &str, queue: &str, jid: &JobId, request: &PutRequest) -> Vec<String> {
    let mut args = vec![
        worker.to_string(),
        queue.to_string(),
        jid.to_string(),
        request.klass.clone(),
        request.data.clone(),
        request.delay.unwrap_or(0).to_string(),
    ];

    if let Some(priority) = request.priority {
        args.extend(["priority".to_string(), priority.to_string()]);
    }
    if let Some(tags) = &request.tags {
        args.extend(["tags".to_string(), json_list(tags)]);
    }
    if let Some(retries) = request.retries {
        args.extend(["retries".to_string(), retries.to_string()]);
    }
    if let Some(depends) = &request.depends {
        args.extend(["depends".to_string(), json_list(depends)]);
    }

    args
}

/// One `put` per subscribed queue, each under a fresh jid.
pub(crate) fn fan_out_args(
    worker: &str,
    queues: &[String],
    request: &PutRequest,
) -> Vec<(JobId, Vec<String>)> {
    queues
        .iter()
        .map(|queue| {
            let jid = JobId::new();
            let args = put_args(worker, queue, &jid, request);
            (jid, args)
        })
        .collect()
}

/// Arguments for `cancel`, after `now`.
pub(crate) fn cancel_args(jids: &[JobId]) -> Vec<String> {
    jids.iter().map(JobId::to_string).collect()
}

/// Arguments for `recur`, after `now`.
pub(crate) fn recur_args(queue: &str, jid: &JobId, request: &RecurRequest) -> JobResult<Vec<String>> {
    if request.interval == 0 {
        return Err(JobError::Broker(
            "recurring interval must be at least one second".to_string(),
        ));
    }

    let mut args = vec![
        queue.to_string(),
        jid.to_string(),
        request.klass.clone(),
        request.data.clone(),
        "interval".to_string(),
        request.interval.to_string(),
        request.offset.unwrap_or(0).to_string(),
    ];

    if let Some(priority) = request.priority {
        args.extend(["priority".to_string(), priority.to_string()]);
    }
    if let Some(tags) = &request.tags {
        args.extend(["tags".to_string(), json_list(tags)]);
    }
    if let Some(retries) = request.retries {
        args.extend(["retries".to_string(), retries.to_string()]);
    }
    if let Some(backlog) = request.backlog {
        args.extend(["backlog".to_string(), backlog.to_string()]);
    }

    Ok(args)
}

/// Parses the script's pop reply. An empty result may arrive as `[]` or `{}`.
pub(crate) fn parse_pop(raw: &str) -> JobResult<Option<BrokerJob>> {
    match serde_json::from_str::<Value>(raw)? {
        Value::Array(jobs) => match jobs.into_iter().next() {
            Some(job) => Ok(Some(serde_json::from_value(job)?)),
            None => Ok(None),
        },
        Value::Object(map) if map.is_empty() => Ok(None),
        other => Err(JobError::Broker(format!("unexpected pop reply: {}", other))),
    }
}

impl RedisBroker {
    /// Withdraw the jobs of a fan-out that failed part way.
    async fn cancel_submitted(&self, topic: &str, jids: &[JobId]) {
        if jids.is_empty() {
            return;
        }
        match self.call::<redis::Value>("cancel", &cancel_args(jids)).await {
            Ok(_) => debug!(topic = %topic, cancelled = jids.len(), "Withdrew partial fan-out"),
            Err(e) => warn!(
                topic = %topic,
                jids = ?jids.iter().map(JobId::as_str).collect::<Vec<_>>(),
                error = %e,
                "Failed to withdraw partial fan-out"
            ),
        }
    }
}

#[async_trait]
impl BrokerClient for RedisBroker {
    async fn queue_length(&self, queue: &str) -> JobResult<u64> {
        self.call("length", &[queue.to_string()]).await
    }

    async fn queue_put(&self, queue: &str, request: PutRequest) -> JobResult<JobId> {
        let jid = request.jid.clone().unwrap_or_default();
        let args = put_args(&self.worker_name, queue, &jid, &request);

        let jid: String = self.call("put", &args).await?;
        debug!(queue = %queue, jid = %jid, "Broker accepted job");
        Ok(JobId::from(jid))
    }

    async fn queue_recur(&self, queue: &str, request: RecurRequest) -> JobResult<ScheduleId> {
        let jid = request.jid.clone().unwrap_or_default();
        let args = recur_args(queue, &jid, &request)?;

        let jid: String = self.call("recur", &args).await?;
        debug!(queue = %queue, jid = %jid, "Broker registered recurring job");
        Ok(ScheduleId::from(jid))
    }

    async fn queue_pop(&self, queue: &str, worker: &str) -> JobResult<Option<BrokerJob>> {
        let args = [queue.to_string(), worker.to_string(), "1".to_string()];
        let raw: String = self.call("pop", &args).await?;
        parse_pop(&raw)
    }

    async fn topic_put(&self, topic: &str, request: PutRequest) -> JobResult<Vec<JobId>> {
        let mut queues: Vec<String> = {
            let mut conn = self.conn().await?;
            conn.smembers(self.keys.topic(topic)).await?
        };
        queues.sort();

        let mut jids = Vec::with_capacity(queues.len());
        for (jid, args) in fan_out_args(&self.worker_name, &queues, &request) {
            if let Err(e) = self.call::<String>("put", &args).await {
                self.cancel_submitted(topic, &jids).await;
                return Err(e);
            }
            jids.push(jid);
        }

        debug!(topic = %topic, queues = queues.len(), "Fanned out topic job");
        Ok(jids)
    }

    async fn topic_subscribe(&self, topic: &str, queue: &str) -> JobResult<bool> {
        let mut conn = self.conn().await?;
        let _: i64 = conn.sadd(self.keys.topic(topic), queue).await?;
        Ok(true)
    }

    async fn topic_unsubscribe(&self, topic: &str, queue: &str) -> JobResult<bool> {
        let mut conn = self.conn().await?;
        let _: i64 = conn.srem(self.keys.topic(topic), queue).await?;
        Ok(true)
    }

    fn current_worker_identity(&self) -> String {
        self.worker_name.clone()
    }
}
