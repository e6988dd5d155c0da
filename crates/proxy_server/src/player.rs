//! Identity and session data for one player.

use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// Player identity, filled in as the handshake completes.
///
/// Owned by its connection until the connection registers with the client
/// registry; saved by value on disconnect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerData {
    /// Display name, known once the client has identified
    pub name: Option<String>,

    /// Remote address the client connected from
    pub address: IpAddr,

    /// Relay-assigned client id
    pub client_id: u64,

    /// Unix time of the last save
    #[serde(default)]
    pub last_online: u64,
}

impl PlayerData {
    pub fn new(address: IpAddr, client_id: u64) -> Self {
        Self {
            name: None,
            address,
            client_id,
            last_online: 0,
        }
    }

    /// Name if known, otherwise the client id.
    pub fn display_name(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("client #{}", self.client_id),
        }
    }
}
