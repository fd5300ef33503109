//! Configuration for the `tardichat` client.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/tardichat/config.toml`)
//! 4. Compiled defaults
//!
//! Missing config file is not an error (defaults are used). An explicit
//! `--config` path that doesn't exist is an error.

use std::path::PathBuf;
use std::time::Duration;

use tardichat_proto::message::ChannelId;

use crate::api::{ApiError, Endpoints};
use crate::reconnect::DEFAULT_RECONNECT_DELAY;
use crate::session::SessionConfig;
use crate::transport::ws::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_LINK_BUFFER, WsConnector};

/// Server used when nothing else is configured.
pub const DEFAULT_SERVER_URL: &str = "https://edu.tardigrade.land/msg";

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

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    server: ServerFileConfig,
    session: SessionFileConfig,
    ui: UiFileConfig,
}

/// `[server]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ServerFileConfig {
    url: Option<String>,
    request_timeout_secs: Option<u64>,
    connect_timeout_secs: Option<u64>,
}

/// `[session]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct SessionFileConfig {
    reconnect_delay_secs: Option<u64>,
    event_buffer: Option<usize>,
}

/// `[ui]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct UiFileConfig {
    timestamp_format: Option<String>,
}

// ---------------------------------------------------------------------------
// Resolved configuration (concrete types, all fields populated)
// ---------------------------------------------------------------------------

/// How the client obtains its bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Credentials {
    /// Use this token as is.
    Token(String),
    /// Log in first.
    Login {
        /// Account name.
        username: String,
        /// Account password.
        password: String,
    },
    /// Talk to the server unauthenticated.
    #[default]
    Anonymous,
}

/// Fully resolved client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    // -- Server --
    /// Base URL of the chat service (`https://host/msg`).
    pub server_url: String,
    /// Timeout for each HTTP request.
    pub request_timeout: Duration,
    /// Timeout for the WebSocket handshake.
    pub connect_timeout: Duration,
    /// Where the bearer token comes from.
    pub credentials: Credentials,

    // -- Session --
    /// Delay before reopening a closed channel connection.
    pub reconnect_delay: Duration,
    /// Capacity of each direction of a channel link.
    pub event_buffer: usize,

    // -- UI --
    /// Timestamp display format string (chrono).
    pub timestamp_format: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            request_timeout: Duration::from_secs(10),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            credentials: Credentials::Anonymous,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            event_buffer: DEFAULT_LINK_BUFFER,
            timestamp_format: "%H:%M".to_string(),
        }
    }
}

impl ClientConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// CLI args and env vars are parsed via `clap`. If `--config` is given
    /// and the file does not exist, returns an error. If no `--config` is
    /// given, the default path (`~/.config/tardichat/config.toml`) is tried
    /// and silently ignored if missing.
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
    /// Priority: CLI > file > default. Separated from `load()` so it can be
    /// tested without CLI parsing.
    #[must_use]
    fn resolve(cli: &CliArgs, file: &ConfigFile) -> Self {
        let defaults = Self::default();

        let credentials = match (&cli.token, &cli.username, &cli.password) {
            (Some(token), _, _) => Credentials::Token(token.clone()),
            (None, Some(username), Some(password)) => Credentials::Login {
                username: username.clone(),
                password: password.clone(),
            },
            _ => Credentials::Anonymous,
        };

        Self {
            server_url: cli
                .server_url
                .clone()
                .or_else(|| file.server.url.clone())
                .unwrap_or(defaults.server_url),
            request_timeout: file
                .server
                .request_timeout_secs
                .map_or(defaults.request_timeout, Duration::from_secs),
            connect_timeout: file
                .server
                .connect_timeout_secs
                .map_or(defaults.connect_timeout, Duration::from_secs),
            credentials,
            reconnect_delay: file
                .session
                .reconnect_delay_secs
                .map_or(defaults.reconnect_delay, Duration::from_secs),
            event_buffer: file
                .session
                .event_buffer
                .unwrap_or(defaults.event_buffer),
            timestamp_format: cli
                .timestamp_format
                .clone()
                .or_else(|| file.ui.timestamp_format.clone())
                .unwrap_or(defaults.timestamp_format),
        }
    }

    /// Endpoint set for the configured server.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::InvalidUrl`] if `server_url` is not an http(s) URL.
    pub fn endpoints(&self) -> Result<Endpoints, ApiError> {
        Endpoints::new(&self.server_url)
    }

    /// Session controller tunables.
    #[must_use]
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            reconnect_delay: self.reconnect_delay,
        }
    }

    /// WebSocket connector for `endpoints` with the configured timeouts.
    #[must_use]
    pub fn ws_connector(&self, endpoints: Endpoints) -> WsConnector {
        WsConnector::new(endpoints)
            .with_connect_timeout(self.connect_timeout)
            .with_buffer(self.event_buffer)
    }
}

/// CLI arguments parsed by clap.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Terminal client for the Tardigrade chat service")]
pub struct CliArgs {
    /// Base URL of the chat service.
    #[arg(long, env = "TARDICHAT_SERVER_URL")]
    pub server_url: Option<String>,

    /// Bearer token to use instead of logging in.
    #[arg(long, env = "TARDICHAT_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Account name to log in with.
    #[arg(long, env = "TARDICHAT_USERNAME")]
    pub username: Option<String>,

    /// Account password to log in with.
    #[arg(long, env = "TARDICHAT_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Path to config file (default: `~/.config/tardichat/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Timestamp display format (chrono format string).
    #[arg(long)]
    pub timestamp_format: Option<String>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "TARDICHAT_LOG")]
    pub log_level: String,

    /// Path to log file (default: `$TMPDIR/tardichat.log`).
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// What to do.
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Subcommands of the `tardichat` binary.
#[derive(clap::Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Log in and print the bearer token.
    Login,
    /// List the channels visible to the current user.
    Channels,
    /// Open a channel: print its messages and send each stdin line.
    Chat {
        /// Numeric id of the channel.
        channel: ChannelId,
    },
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Load and parse a TOML config file.
///
/// If `explicit_path` is `Some`, the file must exist (error if not).
/// If `explicit_path` is `None`, the default path is tried and missing file
/// is treated as empty config.
fn load_config_file(explicit_path: Option<&std::path::Path>) -> Result<ConfigFile, ConfigError> {
    let path = if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    } else {
        let Some(config_dir) = dirs::config_dir() else {
            return Ok(ConfigFile::default());
        };
        config_dir.join("tardichat").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
