// Environment settings for the grading worker
use anyhow::{Context, Result};
use grader_common::config::DEFAULT_CONFIG_PATH;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";
pub const DEFAULT_SUBMISSIONS_DIR: &str = "submissions";

#[derive(Debug, Clone, PartialEq)]
pub struct WorkerSettings {
    pub redis_url: String,
    pub config_path: PathBuf,
    pub submissions_dir: PathBuf,
    /// BLPOP timeout, also bounds how long shutdown waits for an idle worker
    pub pop_timeout_secs: f64,
    pub cancel_poll_interval: Duration,
}

impl WorkerSettings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from any key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let pop_timeout_secs = match lookup("GRADER_POP_TIMEOUT_SECS") {
            Some(raw) => raw
                .parse::<f64>()
                .with_context(|| format!("Invalid GRADER_POP_TIMEOUT_SECS: {}", raw))?,
            None => 5.0,
        };
        let cancel_poll_ms = match lookup("GRADER_CANCEL_POLL_MS") {
            Some(raw) => raw
                .parse::<u64>()
                .with_context(|| format!("Invalid GRADER_CANCEL_POLL_MS: {}", raw))?,
            None => 500,
        };

        Ok(Self {
            redis_url: lookup("REDIS_URL").unwrap_or_else(|| DEFAULT_REDIS_URL.to_string()),
            config_path: lookup("GRADER_CONFIG")
                .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string())
                .into(),
            submissions_dir: lookup("GRADER_SUBMISSIONS_DIR")
                .unwrap_or_else(|| DEFAULT_SUBMISSIONS_DIR.to_string())
                .into(),
            pop_timeout_secs,
            cancel_poll_interval: Duration::from_millis(cancel_poll_ms),
        })
    }
}
