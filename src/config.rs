//! Configuration: file -> env vars -> CLI flags

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use logscope_client::{
    ChannelConfig, DEFAULT_LOG_EVENT, DEFAULT_RECONNECT_ATTEMPTS, DEFAULT_RECONNECT_DELAY,
    ReconnectPolicy,
};
use logscope_logs::{DEFAULT_CAPACITY, DEFAULT_INITIAL_FETCH, EngineConfig, InitialOrder};

/// Backend used when nothing else is configured
pub const DEFAULT_ENDPOINT: &str = "http://localhost:3000";

/// Resolved runtime configuration
#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    /// Backend base URL, serves both `/logs` and the push channel
    pub endpoint: String,

    /// Push event carrying log entries
    pub log_event: String,

    /// Live buffer capacity
    pub buffer_size: usize,

    /// Entries fetched on startup
    pub initial_fetch: usize,

    /// Automatic retries after a failed connection (0 = none)
    pub reconnect_attempts: u32,

    /// Delay between retries
    pub reconnect_delay: Duration,

    /// Drop search results superseded by a later search or clear
    pub discard_stale_queries: bool,

    /// Ordering convention of the initial batch
    pub initial_order: InitialOrder,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            log_event: DEFAULT_LOG_EVENT.to_string(),
            buffer_size: DEFAULT_CAPACITY,
            initial_fetch: DEFAULT_INITIAL_FETCH,
            reconnect_attempts: DEFAULT_RECONNECT_ATTEMPTS,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            discard_stale_queries: true,
            initial_order: InitialOrder::default(),
        }
    }
}

/// Config file structure
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    endpoint: Option<String>,
    log_event: Option<String>,
    buffer_size: Option<usize>,
    initial_fetch: Option<usize>,
    reconnect_attempts: Option<u32>,
    reconnect_delay_ms: Option<u64>,
    discard_stale_queries: Option<bool>,
    initial_order: Option<InitialOrder>,
}

/// Values given on the command line
#[derive(Debug, Default)]
pub struct CliOverrides {
    pub endpoint: Option<String>,
    pub buffer_size: Option<usize>,
    pub initial_fetch: Option<usize>,
}

impl Config {
    /// Get the config file path: ~/.config/logscope/config.toml
    pub fn config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|p| p.join(".config").join("logscope").join("config.toml"))
    }

    /// Load configuration from the file, the environment and the CLI.
    ///
    /// An explicit `path` must exist; the default path is optional.
    pub fn load(path: Option<&Path>, cli: CliOverrides) -> Result<Self> {
        let file = match path {
            Some(path) => read_file_config(path)?,
            None => match Self::config_path() {
                Some(path) if path.exists() => read_file_config(&path)?,
                _ => FileConfig::default(),
            },
        };

        let mut config = Self::from_sources(file, |key| std::env::var(key).ok())?;
        config.apply_cli(cli);
        config.validate()?;
        Ok(config)
    }

    /// Merge the file with environment overrides
    fn from_sources(file: FileConfig, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        // Endpoint: env > file > default
        let endpoint = env("LOGSCOPE_ENDPOINT")
            .or(file.endpoint)
            .unwrap_or(defaults.endpoint);

        let buffer_size = match env("LOGSCOPE_BUFFER_SIZE") {
            Some(v) => v
                .parse()
                .with_context(|| format!("LOGSCOPE_BUFFER_SIZE is not a number: {}", v))?,
            None => file.buffer_size.unwrap_or(defaults.buffer_size),
        };

        let initial_fetch = match env("LOGSCOPE_INITIAL_FETCH") {
            Some(v) => v
                .parse()
                .with_context(|| format!("LOGSCOPE_INITIAL_FETCH is not a number: {}", v))?,
            None => file.initial_fetch.unwrap_or(defaults.initial_fetch),
        };

        Ok(Self {
            endpoint,
            log_event: file.log_event.unwrap_or(defaults.log_event),
            buffer_size,
            initial_fetch,
            reconnect_attempts: file.reconnect_attempts.unwrap_or(defaults.reconnect_attempts),
            reconnect_delay: file
                .reconnect_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.reconnect_delay),
            discard_stale_queries: file
                .discard_stale_queries
                .unwrap_or(defaults.discard_stale_queries),
            initial_order: file.initial_order.unwrap_or(defaults.initial_order),
        })
    }

    fn apply_cli(&mut self, cli: CliOverrides) {
        if let Some(endpoint) = cli.endpoint {
            self.endpoint = endpoint;
        }
        if let Some(size) = cli.buffer_size {
            self.buffer_size = size;
        }
        if let Some(count) = cli.initial_fetch {
            self.initial_fetch = count;
        }
    }

    fn validate(&self) -> Result<()> {
        if self.buffer_size == 0 {
            anyhow::bail!("buffer_size must be at least 1");
        }
        if self.endpoint.trim().is_empty() {
            anyhow::bail!("endpoint must not be empty");
        }
        Ok(())
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            capacity: self.buffer_size,
            initial_fetch: self.initial_fetch,
            initial_order: self.initial_order,
            discard_stale_queries: self.discard_stale_queries,
        }
    }

    pub fn channel_config(&self) -> ChannelConfig {
        ChannelConfig {
            endpoint: self.endpoint.clone(),
            log_event: self.log_event.clone(),
            reconnect: ReconnectPolicy {
                enabled: self.reconnect_attempts > 0,
                attempts: self.reconnect_attempts,
                delay: self.reconnect_delay,
            },
        }
    }
}

fn read_file_config(path: &Path) -> Result<FileConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file {}", path.display()))
}
