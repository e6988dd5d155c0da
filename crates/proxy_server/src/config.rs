//! Relay configuration types and defaults.
//!
//! This module contains the configuration structure handed to the relay core
//! at construction. The binary builds it from the TOML file; tests build it
//! directly.

use crate::codec::DEFAULT_MAX_PAYLOAD;
use crate::packet::DEFAULT_PROTOCOL_VERSION;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration structure for the relay.
///
/// Covers the listening side, the backend game server being fronted, the
/// circuit breaker threshold and housekeeping intervals.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// The socket address players connect to
    pub bind_address: SocketAddr,

    /// Backend address; the unspecified address means loopback
    pub backend_address: IpAddr,

    /// Backend game server port
    pub backend_port: u16,

    /// Read/write timeout on established backend streams, in seconds
    pub socket_timeout: u64,

    /// Upper bound for dialing the backend, in seconds
    pub dial_timeout: u64,

    /// Consecutive failed dials that mark the server as crashed (0 disables)
    pub max_failed_connections: u32,

    /// Version announced to clients before a rejection
    pub protocol_version: u32,

    /// Largest payload accepted from either side
    pub max_payload_size: usize,

    /// How often pending kicks are checked, in milliseconds
    pub kick_sweep_interval_ms: u64,

    /// Directory holding saved player data
    pub player_data_directory: PathBuf,
}

impl RelayConfig {
    /// Address the backend connector dials.
    pub fn backend_target(&self) -> SocketAddr {
        let ip = if self.backend_address.is_unspecified() {
            match self.backend_address {
                IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::LOCALHOST),
                IpAddr::V6(_) => IpAddr::V6(std::net::Ipv6Addr::LOCALHOST),
            }
        } else {
            self.backend_address
        };
        SocketAddr::new(ip, self.backend_port)
    }

    /// Backend stream timeout; zero falls back to five seconds.
    pub fn socket_timeout(&self) -> Duration {
        match self.socket_timeout {
            0 => Duration::from_secs(5),
            secs => Duration::from_secs(secs),
        }
    }

    /// Dial bound; an unset (zero) value falls back to three seconds.
    pub fn dial_timeout(&self) -> Duration {
        match self.dial_timeout {
            0 => Duration::from_secs(3),
            secs => Duration::from_secs(secs),
        }
    }

    pub fn kick_sweep_interval(&self) -> Duration {
        Duration::from_millis(self.kick_sweep_interval_ms.max(1))
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 21025),
            backend_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            backend_port: 21024,
            socket_timeout: 5,
            dial_timeout: 3,
            max_failed_connections: 3,
            protocol_version: DEFAULT_PROTOCOL_VERSION,
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            kick_sweep_interval_ms: 1000,
            player_data_directory: PathBuf::from("players"),
        }
    }
}
