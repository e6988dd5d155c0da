//! Client registry and global broadcast.
//!
//! The connection core only sees the [`ClientRegistry`] and [`Broadcaster`]
//! traits. [`PlayerRegistry`] and [`RegistryBroadcaster`] are the in-process
//! implementations the binary wires in.

use crate::connection::{Connection, ConnectionId};
use crate::error::RegistryError;
use crate::packet::ChatMessage;
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

/// Lookup of identified players by name.
pub trait ClientRegistry: Send + Sync {
    fn get(&self, name: &str) -> Option<Arc<Connection>>;

    /// Registers `connection` under `name`; refuses a name already taken.
    fn add(&self, name: &str, connection: Arc<Connection>) -> Result<(), RegistryError>;

    /// Removes `name` only if it still maps to connection `id`.
    fn remove(&self, name: &str, id: ConnectionId) -> bool;

    fn connections(&self) -> Vec<Arc<Connection>>;
}

/// Sends a chat line to every connected player.
#[async_trait]
pub trait Broadcaster: Send + Sync {
    async fn broadcast(&self, message: &str);
}

#[derive(Default)]
pub struct PlayerRegistry {
    players: DashMap<String, Arc<Connection>>,
}

impl PlayerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }
}

impl ClientRegistry for PlayerRegistry {
    fn get(&self, name: &str) -> Option<Arc<Connection>> {
        self.players.get(name).map(|entry| entry.value().clone())
    }

    fn add(&self, name: &str, connection: Arc<Connection>) -> Result<(), RegistryError> {
        match self.players.entry(name.to_string()) {
            Entry::Occupied(_) => Err(RegistryError::NameInUse(name.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(connection);
                Ok(())
            }
        }
    }

    fn remove(&self, name: &str, id: ConnectionId) -> bool {
        self.players
            .remove_if(name, |_, connection| connection.id() == id)
            .is_some()
    }

    fn connections(&self) -> Vec<Arc<Connection>> {
        self.players.iter().map(|entry| entry.value().clone()).collect()
    }
}

/// Broadcasts through the registry's connections.
///
/// Players with a pending kick already got their own warning and are skipped.
pub struct RegistryBroadcaster {
    registry: Arc<dyn ClientRegistry>,
}

impl RegistryBroadcaster {
    pub fn new(registry: Arc<dyn ClientRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl Broadcaster for RegistryBroadcaster {
    async fn broadcast(&self, message: &str) {
        let recipients = self.registry.connections();
        debug!("Broadcasting to {} player(s): {}", recipients.len(), message);
        for connection in recipients {
            if connection.kick_pending() {
                continue;
            }
            connection
                .send_chat_message(ChatMessage::broadcast(message))
                .await;
        }
    }
}
