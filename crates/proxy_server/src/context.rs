//! Collaborator handles injected into every connection.

use crate::config::RelayConfig;
use crate::hooks::{ControlPacketInspector, PacketInterceptor};
use crate::registry::{Broadcaster, ClientRegistry, PlayerRegistry, RegistryBroadcaster};
use crate::state::ServerState;
use crate::storage::{JsonPlayerStore, PlayerStore};
use std::sync::Arc;

/// Everything a connection may reach outside itself.
///
/// Created once at process start and cloned into each connection; the
/// handles live until the last connection referencing them is gone.
#[derive(Clone)]
pub struct ServerContext {
    pub config: Arc<RelayConfig>,
    pub state: Arc<ServerState>,
    pub registry: Arc<dyn ClientRegistry>,
    pub store: Arc<dyn PlayerStore>,
    pub broadcaster: Arc<dyn Broadcaster>,
    pub interceptor: Arc<dyn PacketInterceptor>,
}

impl ServerContext {
    /// Default wiring: in-process registry and broadcaster, JSON player store
    /// under the configured directory, control packet inspector.
    pub fn new(config: RelayConfig) -> Self {
        let registry: Arc<dyn ClientRegistry> = Arc::new(PlayerRegistry::new());
        let store = Arc::new(JsonPlayerStore::new(config.player_data_directory.clone()));
        Self {
            config: Arc::new(config),
            state: Arc::new(ServerState::new()),
            broadcaster: Arc::new(RegistryBroadcaster::new(registry.clone())),
            registry,
            store,
            interceptor: Arc::new(ControlPacketInspector),
        }
    }

    pub fn with_state(mut self, state: Arc<ServerState>) -> Self {
        self.state = state;
        self
    }

    /// Replaces the registry. The broadcaster is rebuilt on top of it.
    pub fn with_registry(mut self, registry: Arc<dyn ClientRegistry>) -> Self {
        self.broadcaster = Arc::new(RegistryBroadcaster::new(registry.clone()));
        self.registry = registry;
        self
    }

    pub fn with_store(mut self, store: Arc<dyn PlayerStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_broadcaster(mut self, broadcaster: Arc<dyn Broadcaster>) -> Self {
        self.broadcaster = broadcaster;
        self
    }

    pub fn with_interceptor(mut self, interceptor: Arc<dyn PacketInterceptor>) -> Self {
        self.interceptor = interceptor;
        self
    }
}
