use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::session::BookType;

/// Reading session client with local ticking and server heartbeats.
#[derive(Parser, Debug, Clone)]
#[command(name = "reading-session")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file.
    #[arg(short, long, env = "READING_SESSION_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Base URL of the reading session API (overrides config).
    #[arg(long, env = "READING_SESSION_URL", global = true)]
    pub url: Option<String>,

    /// Bearer token (overrides config).
    #[arg(long, env = "READING_SESSION_TOKEN", global = true, hide_env_values = true)]
    pub token: Option<String>,

    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Create a default config file with a fresh device id.
    Init {
        /// Force overwrite existing config.
        #[arg(short, long)]
        force: bool,
    },

    /// Show the active session (if any) and today's reading time.
    Status,

    /// Show today's reading time.
    Today,

    /// Start reading a book and drive the session from stdin.
    Read {
        /// Book or magazine id.
        book_id: i64,

        /// Content type.
        #[arg(short = 't', long = "type", value_enum, default_value = "ebook")]
        book_type: BookType,

        /// Opening position (page, CFI, ...).
        #[arg(short, long)]
        position: Option<String>,

        /// Opening chapter index.
        #[arg(long)]
        chapter: Option<u32>,
    },

    /// End the session currently active on the server.
    End,
}

/// Main configuration from TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Session service connection.
    #[serde(default)]
    pub server: ServerConfig,

    /// Session timing.
    #[serde(default)]
    pub session: SessionConfig,

    /// Client identity.
    #[serde(default)]
    pub client: ClientConfig,
}

/// Session service connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Base URL of the reading session API.
    #[serde(default = "default_url")]
    pub url: String,

    /// Bearer token.
    #[serde(default)]
    pub token: Option<String>,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            token: None,
            timeout_seconds: default_timeout(),
        }
    }
}

impl ServerConfig {
    /// Request timeout as a duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

fn default_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_timeout() -> u64 {
    15
}

/// Session timing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Seconds between heartbeats while a session is running.
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_seconds: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_seconds: default_heartbeat_interval(),
        }
    }
}

impl SessionConfig {
    /// Heartbeat period, never shorter than one second.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_seconds.max(1))
    }
}

fn default_heartbeat_interval() -> u64 {
    30
}

/// Client identity configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Device id sent with every request.
    #[serde(default)]
    pub device_id: Option<String>,
}

impl Config {
    /// Load configuration from file.
    pub fn load(path: &PathBuf) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            crate::error::SessionError::Config(format!("Failed to read config file: {}", e))
        })?;

        toml::from_str(&content).map_err(|e| {
            crate::error::SessionError::Config(format!("Failed to parse config file: {}", e))
        })
    }

    /// Find config file in default locations.
    pub fn find_config_file() -> Option<PathBuf> {
        let candidates = [
            PathBuf::from("config.toml"),
            PathBuf::from("reading-session.toml"),
            dirs::config_dir()
                .map(|p| p.join("reading-session").join("config.toml"))
                .unwrap_or_default(),
        ];

        candidates.into_iter().find(|p| p.exists())
    }

    /// Apply CLI overrides on top of the file configuration.
    pub fn apply_overrides(&mut self, cli: &Cli) {
        if let Some(url) = &cli.url {
            self.server.url = url.clone();
        }
        if let Some(token) = &cli.token {
            self.server.token = Some(token.clone());
        }
    }

    /// Generate default config file content.
    pub fn generate_default(device_id: &str) -> String {
        format!(
            r#"# reading-session configuration

[server]
url = "http://localhost:3000"
# token = "..."
# Request timeout in seconds
timeout_seconds = 15

[session]
# Seconds between heartbeats while reading
heartbeat_interval_seconds = 30

[client]
device_id = "{device_id}"
"#
        )
    }
}
