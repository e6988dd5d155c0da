//! Configuration file handling for the relay binary.
//!
//! The TOML file is split into `[relay]`, `[backend]`, `[players]` and
//! `[logging]` tables. Every key has a default, so a partial file is fine and
//! a missing file is created with the defaults written out.

use proxy_server::codec::DEFAULT_MAX_PAYLOAD;
use proxy_server::packet::DEFAULT_PROTOCOL_VERSION;
use proxy_server::RelayConfig;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use tracing::info;

/// Application configuration loaded from TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub relay: RelaySettings,
    #[serde(default)]
    pub backend: BackendSettings,
    #[serde(default)]
    pub players: PlayerSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// The listening side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelaySettings {
    /// Address players connect to
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Backend stream timeout in seconds
    #[serde(default = "default_socket_timeout")]
    pub socket_timeout: u64,
    /// Largest accepted frame payload in bytes
    #[serde(default = "default_max_payload_size")]
    pub max_payload_size: usize,
    /// Protocol version announced before a rejection
    #[serde(default = "default_protocol_version")]
    pub protocol_version: u32,
    /// Kick sweep period in milliseconds
    #[serde(default = "default_kick_sweep_interval")]
    pub kick_sweep_interval_ms: u64,
}

/// The game server being fronted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendSettings {
    /// Backend IP; `0.0.0.0` means this host
    #[serde(default = "default_backend_address")]
    pub address: String,
    #[serde(default = "default_backend_port")]
    pub port: u16,
    /// Dial timeout in seconds
    #[serde(default = "default_dial_timeout")]
    pub dial_timeout: u64,
    /// Failed dials in a row before the relay exits (0 never exits)
    #[serde(default = "default_max_failed_connections")]
    pub max_failed_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerSettings {
    /// Where player data is saved on disconnect
    #[serde(default = "default_player_directory")]
    pub directory: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Whether to output logs in JSON format
    #[serde(default)]
    pub json_format: bool,
}

fn default_bind_address() -> String {
    "0.0.0.0:21025".to_string()
}

fn default_socket_timeout() -> u64 {
    5
}

fn default_max_payload_size() -> usize {
    DEFAULT_MAX_PAYLOAD
}

fn default_protocol_version() -> u32 {
    DEFAULT_PROTOCOL_VERSION
}

fn default_kick_sweep_interval() -> u64 {
    1000
}

fn default_backend_address() -> String {
    "0.0.0.0".to_string()
}

fn default_backend_port() -> u16 {
    21024
}

fn default_dial_timeout() -> u64 {
    3
}

fn default_max_failed_connections() -> u32 {
    3
}

fn default_player_directory() -> String {
    "players".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            socket_timeout: default_socket_timeout(),
            max_payload_size: default_max_payload_size(),
            protocol_version: default_protocol_version(),
            kick_sweep_interval_ms: default_kick_sweep_interval(),
        }
    }
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            address: default_backend_address(),
            port: default_backend_port(),
            dial_timeout: default_dial_timeout(),
            max_failed_connections: default_max_failed_connections(),
        }
    }
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            directory: default_player_directory(),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: false,
        }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file, writing the defaults there
    /// first if the file does not exist.
    pub async fn load_from_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path).await?;
            let config: AppConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content).await?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    /// Applies a `--backend ip:port` override.
    pub fn set_backend(&mut self, address: &str) -> Result<(), String> {
        let target: SocketAddr = address
            .parse()
            .map_err(|_| format!("Invalid backend address: {address}"))?;
        self.backend.address = target.ip().to_string();
        self.backend.port = target.port();
        Ok(())
    }

    pub fn to_relay_config(&self) -> Result<RelayConfig, Box<dyn std::error::Error>> {
        Ok(RelayConfig {
            bind_address: self.relay.bind_address.parse()?,
            backend_address: self.backend.address.parse()?,
            backend_port: self.backend.port,
            socket_timeout: self.relay.socket_timeout,
            dial_timeout: self.backend.dial_timeout,
            max_failed_connections: self.backend.max_failed_connections,
            protocol_version: self.relay.protocol_version,
            max_payload_size: self.relay.max_payload_size,
            kick_sweep_interval_ms: self.relay.kick_sweep_interval_ms,
            player_data_directory: PathBuf::from(&self.players.directory),
        })
    }

    /// Checks addresses, limits and the log level.
    pub fn validate(&self) -> Result<(), String> {
        if self.relay.bind_address.parse::<SocketAddr>().is_err() {
            return Err(format!("Invalid bind address: {}", self.relay.bind_address));
        }

        if self.backend.address.parse::<IpAddr>().is_err() {
            return Err(format!("Invalid backend address: {}", self.backend.address));
        }
        if self.backend.port == 0 {
            return Err("Backend port cannot be 0".to_string());
        }

        if self.relay.socket_timeout == 0 {
            return Err("Socket timeout must be at least one second".to_string());
        }
        if self.relay.max_payload_size == 0 {
            return Err("Maximum payload size cannot be 0".to_string());
        }
        if self.relay.kick_sweep_interval_ms == 0 {
            return Err("Kick sweep interval cannot be 0".to_string());
        }

        if self.players.directory.is_empty() {
            return Err("Player data directory cannot be empty".to_string());
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {valid_levels:?}",
                &self.logging.level
            ));
        }

        Ok(())
    }
}
