//! # qless bridge CLI
//!
//! Runs single adapter operations against a qless broker and prints the
//! result as one JSON value on stdout. Logs go to stderr.

mod args;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use qless_bridge::redis::{create_pool, RedisBroker};
use qless_bridge::{register_metrics, JobData, JobDescriptor, OptionSet, QueueAdapter};
use qless_bridge_config::{ConfigLoader, LoggingConfig};
use serde_json::{json, Value};
use tracing::info;

use crate::args::{Args, Command};

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    match run(args).await {
        Ok(output) => {
            println!("{}", output);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<Value> {
    let loader = ConfigLoader::new(args.config_dir.as_str()).context("loading configuration")?;
    let config = loader.get().await;

    init_logging(&config.logging);
    register_metrics();

    info!("Environment: {}", config.app.environment);

    let pool = create_pool(&config.redis)
        .await
        .context("connecting to Redis")?;
    let broker = RedisBroker::from_config(pool, &config.redis).await?;
    let adapter = QueueAdapter::new(Arc::new(broker), config.queue.clone())?;

    execute(&adapter, args.command).await
}

async fn execute(adapter: &QueueAdapter, command: Command) -> Result<Value> {
    let output = match command {
        Command::Size { queue } => json!(adapter.size(queue.as_deref()).await?),
        Command::Push { job, data, queue } => {
            let jid = adapter
                .push(&JobDescriptor::named(job)?, JobData::from_value(data)?, queue.as_deref())
                .await?;
            json!({ "jid": jid })
        }
        Command::Later {
            seconds,
            job,
            data,
            queue,
        } => {
            let jid = adapter
                .later(
                    Duration::from_secs(seconds),
                    &JobDescriptor::named(job)?,
                    JobData::from_value(data)?,
                    queue.as_deref(),
                )
                .await?;
            json!({ "jid": jid })
        }
        Command::Recur {
            seconds,
            job,
            data,
            queue,
        } => {
            let schedule = adapter
                .recur(
                    Duration::from_secs(seconds),
                    &JobDescriptor::named(job)?,
                    JobData::from_value(data)?,
                    queue.as_deref(),
                )
                .await?;
            json!({ "schedule": schedule })
        }
        Command::Pop { queue } => match adapter.pop(queue.as_deref()).await? {
            Some(popped) => {
                let (envelope, handle) = popped.into_parts();
                json!({
                    "jid": handle.jid,
                    "queue": handle.queue,
                    "worker": handle.worker,
                    "expires": handle.expires,
                    "envelope": envelope,
                })
            }
            None => Value::Null,
        },
        Command::Subscribe { topic, queue } => {
            json!(adapter.subscribe(&topic, queue.as_deref()).await?)
        }
        Command::Unsubscribe { topic, queue } => {
            json!(adapter.unsubscribe(&topic, queue.as_deref()).await?)
        }
        Command::Publish {
            topic,
            job,
            data,
            options,
        } => {
            let options = OptionSet::from_value(options)?;
            let jids = adapter
                .publish(
                    &topic,
                    &JobDescriptor::named(job)?,
                    JobData::from_value(data)?,
                    &options,
                )
                .await?;
            json!({ "jids": jids })
        }
    };

    Ok(output)
}

fn init_logging(config: &LoggingConfig) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let registry = tracing_subscriber::registry().with(filter);

    if config.json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}
