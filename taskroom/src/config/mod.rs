//! Configuration system for the Taskroom client.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/taskroom/config.toml`)
//! 4. Compiled defaults
//!
//! Missing config file is not an error (defaults are used). An explicit
//! `--config` path that doesn't exist is an error.

use std::path::PathBuf;
use std::time::Duration;

use crate::connection::ConnectionConfig;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),
}

/// Reconnection policy: a fixed number of attempts with a fixed delay
/// between them. The budget applies per outage and resets after a
/// successful connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum connect attempts per outage.
    pub max_attempts: u32,
    /// Fixed delay between attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_secs(2),
        }
    }
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    connection: ConnectionFileConfig,
    auth: AuthFileConfig,
}

/// `[connection]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConnectionFileConfig {
    server_url: Option<String>,
    rest_url: Option<String>,
    connect_timeout_secs: Option<u64>,
    retry_attempts: Option<u32>,
    retry_delay_ms: Option<u64>,
    channel_capacity: Option<usize>,
    poll_wait_secs: Option<u64>,
}

/// `[auth]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct AuthFileConfig {
    token: Option<String>,
}

// ---------------------------------------------------------------------------
// Resolved configuration (concrete types, all fields populated)
// ---------------------------------------------------------------------------

/// Fully resolved client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Sync server HTTP base URL (the WebSocket endpoint is derived).
    pub server_url: Option<String>,
    /// REST collaborator base URL.
    pub rest_url: Option<String>,
    /// Session credential.
    pub token: Option<String>,
    /// Handshake ceiling for one connect attempt.
    pub connect_timeout: Duration,
    /// Reconnection policy.
    pub retry: RetryPolicy,
    /// Channel capacity for signal/command mpsc channels.
    pub channel_capacity: usize,
    /// How long the server may hold a long-poll request.
    pub poll_wait: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: None,
            rest_url: None,
            token: None,
            connect_timeout: Duration::from_secs(20),
            retry: RetryPolicy::default(),
            channel_capacity: 256,
            poll_wait: Duration::from_secs(25),
        }
    }
}

impl ClientConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// If `--config` is given and the file does not exist, returns an
    /// error. Otherwise the default path (`~/.config/taskroom/config.toml`)
    /// is tried and silently ignored if missing.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the config file cannot be read or parsed.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Ok(Self::resolve(cli, &file))
    }

    /// Resolve a `ClientConfig` from CLI args and a parsed config file.
    ///
    /// Priority: CLI > file > default. Separated from `load()` to enable
    /// unit testing without CLI parsing.
    #[must_use]
    fn resolve(cli: &CliArgs, file: &ConfigFile) -> Self {
        let defaults = Self::default();

        Self {
            server_url: cli
                .server_url
                .clone()
                .or_else(|| file.connection.server_url.clone()),
            rest_url: cli
                .rest_url
                .clone()
                .or_else(|| file.connection.rest_url.clone()),
            token: cli.token.clone().or_else(|| file.auth.token.clone()),
            connect_timeout: file
                .connection
                .connect_timeout_secs
                .map_or(defaults.connect_timeout, Duration::from_secs),
            retry: RetryPolicy {
                max_attempts: file
                    .connection
                    .retry_attempts
                    .unwrap_or(defaults.retry.max_attempts),
                delay: file
                    .connection
                    .retry_delay_ms
                    .map_or(defaults.retry.delay, Duration::from_millis),
            },
            channel_capacity: file
                .connection
                .channel_capacity
                .unwrap_or(defaults.channel_capacity),
            poll_wait: file
                .connection
                .poll_wait_secs
                .map_or(defaults.poll_wait, Duration::from_secs),
        }
    }

    /// Build a [`ConnectionConfig`] from this configuration, if a server
    /// URL is present.
    ///
    /// Returns `None` when no sync server is configured (REST-only mode).
    #[must_use]
    pub fn to_connection_config(&self) -> Option<ConnectionConfig> {
        let server_url = self.server_url.clone()?;
        Some(ConnectionConfig {
            server_url,
            connect_timeout: self.connect_timeout,
            retry: self.retry.clone(),
            channel_capacity: self.channel_capacity,
            poll_wait: self.poll_wait,
        })
    }
}

/// CLI arguments parsed by clap.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Real-time project room synchronization client")]
pub struct CliArgs {
    /// HTTP base URL of the sync server.
    #[arg(long, env = "TASKROOM_SERVER_URL")]
    pub server_url: Option<String>,

    /// Base URL of the REST API.
    #[arg(long, env = "TASKROOM_REST_URL")]
    pub rest_url: Option<String>,

    /// Session token.
    #[arg(long, env = "TASKROOM_TOKEN")]
    pub token: Option<String>,

    /// Project room to join on startup.
    #[arg(long)]
    pub project: Option<String>,

    /// Path to config file (default: `~/.config/taskroom/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "TASKROOM_LOG")]
    pub log_level: String,
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Load and parse a TOML config file.
///
/// If `explicit_path` is `Some`, the file must exist (error if not).
/// If `explicit_path` is `None`, the default path is tried and a missing
/// file is treated as empty config.
fn load_config_file(explicit_path: Option<&std::path::Path>) -> Result<ConfigFile, ConfigError> {
    let path = if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    } else {
        let Some(config_dir) = dirs::config_dir() else {
            // No config dir available — use defaults.
            return Ok(ConfigFile::default());
        };
        config_dir.join("taskroom").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
