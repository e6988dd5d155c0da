//! Per-connection lifecycle.
//!
//! A [`Connection`] owns one client endpoint and, once admitted, one backend
//! endpoint. It moves `PendingConnect -> Connected -> Disposing`, runs the two
//! relay loops while connected, and tears everything down exactly once.

pub mod admission;
pub mod backend;
mod client;
mod endpoint;
mod relay;

#[cfg(test)]
pub(crate) mod test_support;

pub use client::{Connection, ConnectionState};
pub use endpoint::{BoxedReader, BoxedWriter, Endpoint};

/// Relay-assigned identifier, unique for the life of the process.
pub type ConnectionId = u64;

/// Seconds between scheduling a kick or ban and enforcing it.
pub const KICK_GRACE_SECS: u64 = 6;

/// Side of the connection a fault was observed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// The game client.
    Client,
    /// The backend game server.
    Backend,
}
