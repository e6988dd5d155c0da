//! Fixtures for driving a connection over in-memory pipes.

use super::{Connection, ConnectionId, Endpoint};
use crate::codec::{write_frame, Frame};
use crate::config::RelayConfig;
use crate::context::ServerContext;
use crate::error::StoreError;
use crate::hooks::{PacketInterceptor, PassThrough};
use crate::player::PlayerData;
use crate::registry::{Broadcaster, PlayerRegistry};
use crate::storage::PlayerStore;
use async_trait::async_trait;
use std::ops::Deref;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{duplex, DuplexStream};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

const PIPE_CAPACITY: usize = 64 * 1024;

#[derive(Default)]
pub(crate) struct RecordingBroadcaster {
    messages: Mutex<Vec<String>>,
}

impl RecordingBroadcaster {
    pub async fn messages(&self) -> Vec<String> {
        self.messages.lock().await.clone()
    }
}

#[async_trait]
impl Broadcaster for RecordingBroadcaster {
    async fn broadcast(&self, message: &str) {
        self.messages.lock().await.push(message.to_string());
    }
}

#[derive(Default)]
pub(crate) struct RecordingStore {
    saved: Mutex<Vec<PlayerData>>,
}

impl RecordingStore {
    pub async fn saved(&self) -> Vec<PlayerData> {
        self.saved.lock().await.clone()
    }
}

#[async_trait]
impl PlayerStore for RecordingStore {
    async fn save(&self, player: PlayerData) -> Result<(), StoreError> {
        self.saved.lock().await.push(player);
        Ok(())
    }
}

/// Shared collaborators, so several connections can see one registry.
#[derive(Clone)]
pub(crate) struct Fixtures {
    pub context: ServerContext,
    pub registry: Arc<PlayerRegistry>,
    pub store: Arc<RecordingStore>,
    pub broadcasts: Arc<RecordingBroadcaster>,
}

impl Fixtures {
    pub fn new() -> Self {
        Self::with_interceptor(Arc::new(PassThrough))
    }

    pub fn with_interceptor(interceptor: Arc<dyn PacketInterceptor>) -> Self {
        Self::build(RelayConfig::default(), interceptor)
    }

    pub fn build(config: RelayConfig, interceptor: Arc<dyn PacketInterceptor>) -> Self {
        let registry = Arc::new(PlayerRegistry::new());
        let store = Arc::new(RecordingStore::default());
        let broadcasts = Arc::new(RecordingBroadcaster::default());
        let context = ServerContext::new(config)
            .with_registry(registry.clone())
            .with_store(store.clone())
            .with_broadcaster(broadcasts.clone())
            .with_interceptor(interceptor);
        Self {
            context,
            registry,
            store,
            broadcasts,
        }
    }
}

/// A connection plus the far ends of its client and backend pipes.
pub(crate) struct Harness {
    pub connection: Arc<Connection>,
    pub client_peer: DuplexStream,
    pub backend_peer: DuplexStream,
    pub fixtures: Fixtures,
}

impl Deref for Harness {
    type Target = Fixtures;

    fn deref(&self) -> &Fixtures {
        &self.fixtures
    }
}

pub(crate) fn pending() -> Harness {
    let (harness, _backend) = pending_in(&Fixtures::new(), 1);
    harness
}

pub(crate) async fn connected() -> Harness {
    connected_in(&Fixtures::new(), 1).await
}

fn pending_in(fixtures: &Fixtures, id: ConnectionId) -> (Harness, DuplexStream) {
    let (client_near, client_peer) = duplex(PIPE_CAPACITY);
    let (backend_near, backend_peer) = duplex(PIPE_CAPACITY);
    let peer_addr = format!("127.0.0.1:{}", 40000 + id).parse().unwrap();
    let connection = Connection::new(
        id,
        peer_addr,
        Endpoint::split(client_near),
        fixtures.context.clone(),
    );
    let harness = Harness {
        connection,
        client_peer,
        backend_peer,
        fixtures: fixtures.clone(),
    };
    (harness, backend_near)
}

pub(crate) async fn connected_in(fixtures: &Fixtures, id: ConnectionId) -> Harness {
    let (harness, backend_near) = pending_in(fixtures, id);
    harness
        .connection
        .attach_backend(Endpoint::split(backend_near))
        .await
        .unwrap();
    harness
}

/// Polls `condition` until it holds, failing after two seconds.
pub(crate) async fn wait_until<F: Fn() -> bool>(condition: F) {
    let deadline = Instant::now() + Duration::from_secs(2);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Floods the relay from the backend side with frames larger than the client
/// pipe can hold. With nobody reading the client end, the relay ends up
/// blocked mid-write to the client.
pub(crate) fn flood_from_backend(mut backend_peer: DuplexStream) -> JoinHandle<()> {
    tokio::spawn(async move {
        let frame = Frame::new(6, vec![0; 16 * 1024]);
        for _ in 0..16 {
            if write_frame(&mut backend_peer, &frame).await.is_err() {
                break;
            }
        }
    })
}
