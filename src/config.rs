//! Configuration for mcpool

use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub pool: PoolConfig,
    pub client: ClientConfig,
    pub workload: WorkloadConfig,
}

/// Connection pool limits
///
/// Both limits default to `None`, which keeps the pool unbounded.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum number of idle connections kept for reuse.
    /// Connections released beyond this are shut down.
    pub max_idle: Option<usize>,

    /// Maximum number of live connections (idle + bound).
    /// `acquire` fails with `PoolExhausted` once reached.
    pub max_total: Option<usize>,
}

/// Per-connection socket settings for the text protocol client
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ClientConfig {
    /// Connect timeout in milliseconds (0 = OS default)
    pub connect_timeout_ms: u64,

    /// Read timeout in milliseconds (0 = no timeout)
    pub read_timeout_ms: u64,

    /// Write timeout in milliseconds (0 = no timeout)
    pub write_timeout_ms: u64,

    /// Read buffer size per server socket (bytes)
    pub read_buffer_size: usize,

    /// Request buffer size per server socket (bytes)
    pub write_buffer_size: usize,

    /// Disable Nagle's algorithm
    pub nodelay: bool,

    /// Largest VALUE data block accepted from a server (bytes)
    pub max_value_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 1000,
            read_timeout_ms: 2500,
            write_timeout_ms: 2500,
            read_buffer_size: 8192,
            write_buffer_size: 8192,
            nodelay: true,
            max_value_size: crate::protocol::DEFAULT_MAX_VALUE_SIZE,
        }
    }
}

impl ClientConfig {
    pub fn connect_timeout(&self) -> Option<Duration> {
        millis(self.connect_timeout_ms)
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        millis(self.read_timeout_ms)
    }

    pub fn write_timeout(&self) -> Option<Duration> {
        millis(self.write_timeout_ms)
    }
}

fn millis(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

/// Workload driven by the `mcpool` binary
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WorkloadConfig {
    /// Whitespace or comma separated `host:port` list
    pub addresses: String,

    /// Number of concurrent execution contexts
    pub workers: usize,

    /// set/get/remove cycles per worker (0 = run until interrupted)
    pub iterations: u64,

    /// Expiration passed to every set
    pub exptime: u32,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            addresses: crate::resolver::DEFAULT_ADDRESS.to_string(),
            workers: 4,
            iterations: 1000,
            exptime: 0,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &str) -> crate::Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            crate::McPoolError::Config(format!("Failed to read config file: {e}"))
        })?;

        Self::from_toml(&contents)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(contents: &str) -> crate::Result<Self> {
        toml::from_str(contents)
            .map_err(|e| crate::McPoolError::Config(format!("Failed to parse config: {e}")))
    }

    /// Load configuration from environment variables or use defaults
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addresses) = std::env::var("MCPOOL_ADDRESSES") {
            config.workload.addresses = addresses;
        }

        if let Some(n) = env_parse("MCPOOL_MAX_IDLE") {
            config.pool.max_idle = Some(n);
        }

        if let Some(n) = env_parse("MCPOOL_MAX_TOTAL") {
            config.pool.max_total = Some(n);
        }

        if let Some(n) = env_parse("MCPOOL_WORKERS") {
            config.workload.workers = n;
        }

        if let Some(ms) = env_parse("MCPOOL_CONNECT_TIMEOUT_MS") {
            config.client.connect_timeout_ms = ms;
        }

        if let Some(ms) = env_parse("MCPOOL_READ_TIMEOUT_MS") {
            config.client.read_timeout_ms = ms;
        }

        config
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok()?.parse().ok()
}
