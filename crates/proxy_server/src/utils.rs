//! Small shared helpers.

use crate::config::RelayConfig;
use crate::context::ServerContext;
use crate::server::RelayServer;
use std::time::{SystemTime, UNIX_EPOCH};

/// Returns the current Unix timestamp in seconds.
///
/// A clock set before the epoch reads as zero rather than panicking.
pub fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
}

/// Builds a relay with the default collaborators for `config`.
pub fn create_relay(config: RelayConfig) -> RelayServer {
    RelayServer::new(ServerContext::new(config))
}
