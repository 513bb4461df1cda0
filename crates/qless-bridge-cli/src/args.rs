use clap::{Parser, Subcommand};
use serde_json::Value;

#[derive(Parser, Debug)]
#[command(name = "qless-bridge", about, long_about = None, version)]
pub(crate) struct Args {
    /// Directory holding default.toml and per-environment overrides.
    #[arg(short, long, default_value = "./config")]
    pub(crate) config_dir: String,
    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Command {
    /// Prints the number of pending jobs.
    Size {
        #[arg(short, long)]
        queue: Option<String>,
    },
    /// Pushes a job for immediate execution.
    Push {
        job: String,
        /// Job data as a JSON object.
        #[arg(short, long, default_value = "{}", value_parser = parse_json)]
        data: Value,
        #[arg(short, long)]
        queue: Option<String>,
    },
    /// Pushes a job that becomes available after a delay.
    Later {
        seconds: u64,
        job: String,
        /// Job data as a JSON object.
        #[arg(short, long, default_value = "{}", value_parser = parse_json)]
        data: Value,
        #[arg(short, long)]
        queue: Option<String>,
    },
    /// Registers a recurring job.
    Recur {
        /// Interval between runs.
        seconds: u64,
        job: String,
        /// Job data as a JSON object.
        #[arg(short, long, default_value = "{}", value_parser = parse_json)]
        data: Value,
        #[arg(short, long)]
        queue: Option<String>,
    },
    /// Leases the next job, printing null when there is none.
    Pop {
        #[arg(short, long)]
        queue: Option<String>,
    },
    /// Subscribes a queue to a topic.
    Subscribe {
        topic: String,
        #[arg(short, long)]
        queue: Option<String>,
    },
    /// Unsubscribes a queue from a topic.
    Unsubscribe {
        topic: String,
        #[arg(short, long)]
        queue: Option<String>,
    },
    /// Publishes a job to every queue subscribed to a topic.
    Publish {
        topic: String,
        job: String,
        /// Job data as a JSON object.
        #[arg(short, long, default_value = "{}", value_parser = parse_json)]
        data: Value,
        /// Call-site options as a JSON object.
        #[arg(short, long, default_value = "{}", value_parser = parse_json)]
        options: Value,
    },
}

fn parse_json(raw: &str) -> Result<Value, String> {
    serde_json::from_str(raw).map_err(|e| format!("invalid JSON: {}", e))
}
