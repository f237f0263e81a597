use std::time::Duration;

use anyhow::Context;
use tracing::trace;

/// Configuration of a single InfluxDB backend
///
/// All durations are in milliseconds.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct BackendConfig {
    /// Name used in logs (defaults to the URL)
    pub name: Option<String>,

    /// Base URL of the backend, e.g. `http://127.0.0.1:8086`
    pub url: String,

    /// Database buffered writes are sent to
    pub db: String,

    pub username: Option<String>,
    pub password: Option<String>,

    /// Buffered bytes that trigger an immediate flush
    #[serde(default = "default_flush_size")]
    pub flush_size: usize,

    /// Interval of the periodic flush
    #[serde(default = "default_flush_time")]
    pub flush_time: u64,

    /// Deadline of every HTTP request
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Interval of the health check ping
    #[serde(default = "default_check_interval")]
    pub check_interval: u64,

    /// Interval at which failed flushes are re-sent
    #[serde(default = "default_rewrite_interval")]
    pub rewrite_interval: u64,

    /// Backends that only receive writes refuse queries
    #[serde(default)]
    pub write_only: bool,

    /// Upper bound of bytes kept for re-sending
    #[serde(default = "default_retry_max_bytes")]
    pub retry_max_bytes: usize,

    /// Failed batches older than this are dropped
    #[serde(default = "default_retry_max_age")]
    pub retry_max_age: u64,
}

fn default_flush_size() -> usize {
    10_000
}

fn default_flush_time() -> u64 {
    1_000
}

fn default_timeout() -> u64 {
    10_000
}

fn default_check_interval() -> u64 {
    1_000
}

fn default_rewrite_interval() -> u64 {
    10_000
}

fn default_retry_max_bytes() -> usize {
    64 * 1024 * 1024
}

fn default_retry_max_age() -> u64 {
    10 * 60 * 1_000
}

impl BackendConfig {
    /// A config with default intervals for `url` / `db`
    pub fn new(url: impl Into<String>, db: impl Into<String>) -> Self {
        Self {
            name: None,
            url: url.into(),
            db: db.into(),
            username: None,
            password: None,
            flush_size: default_flush_size(),
            flush_time: default_flush_time(),
            timeout: default_timeout(),
            check_interval: default_check_interval(),
            rewrite_interval: default_rewrite_interval(),
            write_only: false,
            retry_max_bytes: default_retry_max_bytes(),
            retry_max_age: default_retry_max_age(),
        }
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.url)
    }

    pub fn flush_time(&self) -> Duration {
        Duration::from_millis(self.flush_time)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout)
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval)
    }

    pub fn rewrite_interval(&self) -> Duration {
        Duration::from_millis(self.rewrite_interval)
    }

    pub fn retry_max_age(&self) -> Duration {
        Duration::from_millis(self.retry_max_age)
    }

    /// Name of the first timer or deadline set to zero, if any
    pub fn zero_interval(&self) -> Option<&'static str> {
        [
            ("flush_time", self.flush_time),
            ("timeout", self.timeout),
            ("check_interval", self.check_interval),
            ("rewrite_interval", self.rewrite_interval),
        ]
        .into_iter()
        .find(|(_, value)| *value == 0)
        .map(|(field, _)| field)
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct ProxyConfig {
    pub backends: Vec<BackendConfig>,
}

pub fn read_config_file(path: &str) -> anyhow::Result<ProxyConfig> {
    let file_content =
        std::fs::read_to_string(path).with_context(|| format!("failed to read config {path}"))?;
    let config: ProxyConfig = serde_json::from_str(&file_content)
        .map_err(|e| anyhow::anyhow!("Invalid configuration file provided: {e}"))
        .inspect(|config| trace!("loaded config: {config:?}"))?;

    for backend in &config.backends {
        if let Some(field) = backend.zero_interval() {
            anyhow::bail!("backend {}: {field} must be non-zero", backend.display_name());
        }
    }
    Ok(config)
}
