use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::ledger::RetryPolicy;

pub const DEFAULT_MAX_APPEND_ATTEMPTS: u32 = 8;
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 2;
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;

fn parse_millis(s: &str) -> Result<Duration, std::num::ParseIntError> {
    s.trim().parse::<u64>().map(Duration::from_millis)
}

/// Sidecar settings, from flags or `LECTURED_*` environment variables.
#[derive(Parser, Clone, Debug, PartialEq, Eq)]
#[command(name = "lectured")]
#[command(about = "Lecture progress ledger sidecar")]
pub struct Config {
    /// Read-modify-write attempts per append before reporting a conflict
    #[arg(
        long,
        env = "LECTURED_MAX_APPEND_ATTEMPTS",
        default_value_t = DEFAULT_MAX_APPEND_ATTEMPTS,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub max_append_attempts: u32,

    /// Linear backoff step between append attempts, in milliseconds
    #[arg(
        long = "retry-backoff-ms",
        env = "LECTURED_RETRY_BACKOFF_MS",
        default_value = "2",
        value_parser = parse_millis
    )]
    pub retry_backoff: Duration,

    /// How long a writer waits on a locked workspace database, in milliseconds
    #[arg(
        long = "busy-timeout-ms",
        env = "LECTURED_BUSY_TIMEOUT_MS",
        default_value = "5000",
        value_parser = parse_millis
    )]
    pub busy_timeout: Duration,

    /// `tracing_subscriber::EnvFilter` directive
    #[arg(long = "log", env = "LECTURED_LOG", default_value = "info")]
    pub log_filter: String,

    /// Workspace to open before the first request
    #[arg(long, env = "LECTURED_WORKSPACE")]
    pub workspace: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_append_attempts: DEFAULT_MAX_APPEND_ATTEMPTS,
            retry_backoff: Duration::from_millis(DEFAULT_RETRY_BACKOFF_MS),
            busy_timeout: Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS),
            log_filter: "info".to_string(),
            workspace: None,
        }
    }
}

impl Config {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_append_attempts,
            backoff: self.retry_backoff,
        }
    }
}
