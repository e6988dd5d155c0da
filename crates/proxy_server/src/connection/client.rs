//! The connection state machine.

use super::endpoint::{BoxedReader, BoxedWriter, Endpoint};
use super::{relay, ConnectionId, Direction, KICK_GRACE_SECS};
use crate::codec::{write_frame, CodecError, Frame};
use crate::context::ServerContext;
use crate::error::{ConnectionError, RegistryError, TeardownError};
use crate::packet::{self, ChatMessage, ConnectResponse, WARNING_COLOR};
use crate::player::PlayerData;
use crate::utils::current_timestamp;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, Notify, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    /// Accepted; admission and backend dial still in progress.
    PendingConnect = 0,
    /// Both relay loops running.
    Connected = 1,
    /// Teardown has started. Terminal.
    Disposing = 2,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::PendingConnect,
            1 => Self::Connected,
            _ => Self::Disposing,
        }
    }
}

/// One client session and, once connected, its backend session.
///
/// The two write halves sit behind their own locks so one relay loop can
/// write to the client while the other writes to the backend. The client
/// read half is parked here until the relay loops take it.
pub struct Connection {
    id: ConnectionId,
    peer_addr: SocketAddr,
    context: ServerContext,
    state: AtomicU8,
    player: RwLock<PlayerData>,
    connected_time: AtomicU64,
    kick_target: AtomicU64,
    client_open: AtomicBool,
    backend_open: AtomicBool,
    client_reader: Mutex<Option<BoxedReader>>,
    client_writer: Mutex<Option<BoxedWriter>>,
    backend_writer: Mutex<Option<BoxedWriter>>,
    pending_chat: Mutex<VecDeque<Frame>>,
    chat_ready: Notify,
    cancel: CancellationToken,
    relays: Mutex<Vec<JoinHandle<()>>>,
}

impl Connection {
    pub fn new(
        id: ConnectionId,
        peer_addr: SocketAddr,
        client: Endpoint,
        context: ServerContext,
    ) -> Arc<Self> {
        let Endpoint { reader, writer } = client;
        Arc::new(Self {
            id,
            peer_addr,
            context,
            state: AtomicU8::new(ConnectionState::PendingConnect as u8),
            player: RwLock::new(PlayerData::new(peer_addr.ip(), id)),
            connected_time: AtomicU64::new(0),
            kick_target: AtomicU64::new(0),
            client_open: AtomicBool::new(true),
            backend_open: AtomicBool::new(false),
            client_reader: Mutex::new(Some(reader)),
            client_writer: Mutex::new(Some(writer)),
            backend_writer: Mutex::new(None),
            pending_chat: Mutex::new(VecDeque::new()),
            chat_ready: Notify::new(),
            cancel: CancellationToken::new(),
            relays: Mutex::new(Vec::new()),
        })
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Log prefix for this connection.
    pub fn label(&self) -> String {
        format!("[client #{}]", self.id)
    }

    pub fn context(&self) -> &ServerContext {
        &self.context
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// True while both streams are open and teardown has not begun.
    pub fn is_alive(&self) -> bool {
        self.state() != ConnectionState::Disposing
            && self.client_open.load(Ordering::Acquire)
            && self.backend_open.load(Ordering::Acquire)
    }

    /// Unix time the backend was attached, zero before that.
    pub fn connected_time(&self) -> u64 {
        self.connected_time.load(Ordering::Acquire)
    }

    /// Unix time at which a scheduled kick is enforced, zero when none is.
    pub fn kick_target(&self) -> u64 {
        self.kick_target.load(Ordering::Acquire)
    }

    pub fn kick_pending(&self) -> bool {
        self.kick_target() != 0
    }

    /// Whether a scheduled kick is due at `now`.
    pub fn kick_elapsed(&self, now: u64) -> bool {
        let target = self.kick_target();
        target != 0 && now >= target
    }

    pub async fn player_data(&self) -> PlayerData {
        self.player.read().await.clone()
    }

    pub(crate) fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub(crate) fn chat_ready(&self) -> &Notify {
        &self.chat_ready
    }

    /// Names the player and registers them with the client registry.
    pub async fn identify(self: &Arc<Self>, name: impl Into<String>) -> Result<(), RegistryError> {
        if self.state() != ConnectionState::Connected {
            return Err(RegistryError::NotConnected);
        }

        let name = name.into();
        self.context.registry.add(&name, self.clone())?;
        self.player.write().await.name = Some(name.clone());

        // Teardown may have run between the state check and the insert.
        if self.state() == ConnectionState::Disposing {
            self.context.registry.remove(&name, self.id);
            return Err(RegistryError::NotConnected);
        }

        info!("{} Identified as {}", self.label(), name);
        Ok(())
    }

    /// Installs the backend endpoint and starts both relay loops.
    ///
    /// Fails with [`ConnectionError::Disposing`] if teardown won the race; the
    /// backend endpoint is closed in that case.
    pub async fn attach_backend(self: &Arc<Self>, backend: Endpoint) -> Result<(), ConnectionError> {
        let Endpoint {
            reader: backend_reader,
            writer: backend_writer,
        } = backend;

        *self.backend_writer.lock().await = Some(backend_writer);
        self.backend_open.store(true, Ordering::Release);

        let promoted = self.state.compare_exchange(
            ConnectionState::PendingConnect as u8,
            ConnectionState::Connected as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        if promoted.is_err() {
            if let Err(e) = self.close_backend().await {
                debug!("{} {}", self.label(), e);
            }
            return Err(ConnectionError::Disposing);
        }
        self.connected_time.store(current_timestamp(), Ordering::Release);

        let client_reader = self
            .client_reader
            .lock()
            .await
            .take()
            .ok_or(ConnectionError::NotOpen("client"))?;

        let handles = relay::spawn(self, client_reader, backend_reader);
        self.relays.lock().await.extend(handles);

        debug!("{} Relay loops started", self.label());
        Ok(())
    }

    /// Sends a frame to the client. Suppressed once a kick is pending; a
    /// write failure tears the connection down.
    pub async fn send_to_client(&self, id: u32, payload: Vec<u8>) {
        if self.kick_pending() {
            return;
        }
        if let Err(e) = self.write_client_frame(&Frame::new(id, payload)).await {
            self.force_disconnect(Direction::Client, &format!("Failed to send packet: {}", e))
                .await;
        }
    }

    /// Sends a frame to the backend. A write failure is handled as a backend
    /// fault.
    pub async fn send_to_backend(&self, id: u32, payload: Vec<u8>) {
        if let Err(e) = self.write_backend_frame(&Frame::new(id, payload)).await {
            self.force_disconnect(Direction::Backend, &format!("Failed to send packet: {}", e))
                .await;
        }
    }

    /// Writes one frame to the client under the socket timeout, so a client
    /// that stopped reading cannot hold the writer forever.
    pub(crate) async fn write_client_frame(&self, frame: &Frame) -> Result<(), ConnectionError> {
        let limit = self.context.config.socket_timeout();
        let mut guard = self.client_writer.lock().await;
        let writer = guard.as_mut().ok_or(ConnectionError::NotOpen("client"))?;
        let result = match tokio::time::timeout(limit, write_frame(writer, frame)).await {
            Ok(result) => result,
            Err(_) => Err(CodecError::TimedOut),
        };
        if let Err(e) = result {
            self.client_open.store(false, Ordering::Release);
            return Err(e.into());
        }
        Ok(())
    }

    pub(crate) async fn write_backend_frame(&self, frame: &Frame) -> Result<(), ConnectionError> {
        let limit = self.context.config.socket_timeout();
        let mut guard = self.backend_writer.lock().await;
        let writer = guard.as_mut().ok_or(ConnectionError::NotOpen("backend"))?;
        let result = match tokio::time::timeout(limit, write_frame(writer, frame)).await {
            Ok(result) => result,
            Err(_) => Err(CodecError::TimedOut),
        };
        if let Err(e) = result {
            self.backend_open.store(false, Ordering::Release);
            return Err(e.into());
        }
        Ok(())
    }

    /// Queues a chat line for delivery by the backend-to-client loop.
    ///
    /// Ignored unless connected. Queued lines are delivered even while a kick
    /// is pending so the player sees why they are leaving.
    pub async fn send_chat_message(&self, message: ChatMessage) {
        if self.state() != ConnectionState::Connected {
            return;
        }
        self.pending_chat.lock().await.push_back(message.to_frame());
        self.chat_ready.notify_one();
    }

    pub async fn pending_chat_len(&self) -> usize {
        self.pending_chat.lock().await.len()
    }

    /// Writes all queued chat lines in order. Returns how many went out.
    pub(crate) async fn flush_pending_chat(&self) -> Result<usize, ConnectionError> {
        let frames: Vec<Frame> = self.pending_chat.lock().await.drain(..).collect();
        for frame in &frames {
            self.write_client_frame(frame).await?;
        }
        Ok(frames.len())
    }

    /// Schedules a kick. Returns false if a kick or ban is already pending.
    pub async fn schedule_kick(&self, reason: Option<&str>) -> bool {
        let name = self.player_data().await.display_name();
        match reason {
            Some(reason) => {
                self.delay_disconnect(
                    &format!("You have been kicked from the server for {}.", reason),
                    Some(format!("{} has been kicked from the server for {}!", name, reason)),
                )
                .await
            }
            None => {
                self.delay_disconnect(
                    "You have been kicked from the server.",
                    Some(format!("{} has been kicked from the server!", name)),
                )
                .await
            }
        }
    }

    /// Schedules a ban. Returns false if a kick or ban is already pending.
    pub async fn schedule_ban(&self, reason: &str) -> bool {
        let name = self.player_data().await.display_name();
        self.delay_disconnect(
            &format!("You have been banned from the server for {}.", reason),
            Some(format!("{} has been banned from the server for {}!", name, reason)),
        )
        .await
    }

    /// Arms the kick grace period.
    ///
    /// The player gets `reason` in chat, the backend is told the client left,
    /// and everyone else gets `notice`. The connection itself stays up until
    /// the sweep enforces the kick.
    pub async fn delay_disconnect(&self, reason: &str, notice: Option<String>) -> bool {
        if self.state() == ConnectionState::Disposing {
            return false;
        }

        let target = current_timestamp() + KICK_GRACE_SECS;
        if self
            .kick_target
            .compare_exchange(0, target, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        self.send_chat_message(ChatMessage::broadcast(format!("{}{}", WARNING_COLOR, reason)))
            .await;

        if let Err(e) = self.write_backend_frame(&packet::client_disconnect()).await {
            debug!("{} Could not notify backend of disconnect: {}", self.label(), e);
        }

        match notice {
            Some(notice) => {
                self.context
                    .broadcaster
                    .broadcast(&format!("{}{}", WARNING_COLOR, notice))
                    .await;
                info!("{} {}", self.label(), notice);
            }
            None => info!("{} {}", self.label(), reason),
        }
        true
    }

    /// Routes a fault observed on one side of the connection.
    ///
    /// A backend fault before connect rejects the client; after connect it
    /// starts the kick grace period so queued chat can still reach the
    /// client. A client fault disposes immediately.
    pub async fn force_disconnect(&self, direction: Direction, reason: &str) {
        if self.state() == ConnectionState::Disposing {
            return;
        }

        match direction {
            Direction::Backend if self.state() != ConnectionState::Connected => {
                self.reject_pre_connected(&format!("Connection Failed: {}", reason))
                    .await;
            }
            Direction::Backend => {
                self.delay_disconnect(&format!("Dropped by parent server for {}", reason), None)
                    .await;
            }
            Direction::Client => {
                self.dispose(&format!("Dropped by parent client for {}", reason))
                    .await;
            }
        }
    }

    /// Sends a failed connect response, then tears down.
    pub async fn reject_pre_connected(&self, reason: &str) {
        let response = ConnectResponse::rejection(format!("{}{}", WARNING_COLOR, reason));
        if let Err(e) = self.write_client_frame(&response.to_frame()).await {
            debug!("{} Could not deliver rejection: {}", self.label(), e);
        }
        self.dispose(reason).await;
    }

    /// Announces the protocol version first so the client can parse the
    /// rejection that follows.
    pub async fn reject_with_handshake(&self, reason: &str) {
        let version = packet::protocol_version(self.context.config.protocol_version);
        if let Err(e) = self.write_client_frame(&version).await {
            debug!("{} Could not announce protocol version: {}", self.label(), e);
        }
        self.reject_pre_connected(reason).await;
    }

    /// Orderly disconnect initiated by the relay.
    pub async fn close_connection(&self) -> bool {
        self.dispose("has left the server.").await
    }

    /// Enforces an elapsed kick.
    pub async fn finalize_kick(&self) -> bool {
        self.dispose("Kick grace period elapsed.").await
    }

    /// Tears the connection down. Only the first call does anything.
    ///
    /// The relay loops are stopped first so neither still holds a writer.
    /// Every later step runs regardless of earlier failures; failures are
    /// logged.
    pub(crate) async fn dispose(&self, message: &str) -> bool {
        let previous = self
            .state
            .swap(ConnectionState::Disposing as u8, Ordering::AcqRel);
        if previous == ConnectionState::Disposing as u8 {
            return false;
        }

        let label = self.label();
        info!("{} {}", label, message);

        self.cancel.cancel();
        debug!("{} Relay loops signalled to stop", label);

        report(&label, "release registration", self.release_registration().await);
        report(&label, "notify backend", self.notify_backend().await);
        report(&label, "close client stream", self.close_client().await);
        report(&label, "close backend stream", self.close_backend().await);
        true
    }

    async fn release_registration(&self) -> Result<(), TeardownError> {
        let player = self.player_data().await;
        let Some(name) = player.name.clone() else {
            return Ok(());
        };

        let registered = self
            .context
            .registry
            .get(&name)
            .is_some_and(|connection| connection.id() == self.id);
        if !registered {
            return Ok(());
        }

        let saved = self.context.store.save(player).await;
        self.context.registry.remove(&name, self.id);

        if !self.kick_pending() {
            self.context
                .broadcaster
                .broadcast(&format!("{} has left the server.", name))
                .await;
        }

        saved.map_err(TeardownError::from)
    }

    async fn notify_backend(&self) -> Result<(), TeardownError> {
        if self.backend_writer.lock().await.is_none() {
            return Ok(());
        }
        self.write_backend_frame(&packet::client_disconnect())
            .await
            .map_err(TeardownError::NotifyBackend)
    }

    async fn close_client(&self) -> Result<(), TeardownError> {
        self.client_open.store(false, Ordering::Release);
        self.client_reader.lock().await.take();
        let writer = self.client_writer.lock().await.take();
        shutdown_writer("client", writer, self.context.config.socket_timeout()).await
    }

    async fn close_backend(&self) -> Result<(), TeardownError> {
        self.backend_open.store(false, Ordering::Release);
        let writer = self.backend_writer.lock().await.take();
        shutdown_writer("backend", writer, self.context.config.socket_timeout()).await
    }

    /// Waits for both relay loops to finish. Returns false on timeout.
    pub async fn wait_for_relays(&self, limit: Duration) -> bool {
        let handles: Vec<_> = self.relays.lock().await.drain(..).collect();
        tokio::time::timeout(limit, futures::future::join_all(handles))
            .await
            .is_ok()
    }
}

async fn shutdown_writer(
    stream: &'static str,
    writer: Option<BoxedWriter>,
    limit: Duration,
) -> Result<(), TeardownError> {
    let Some(mut writer) = writer else {
        return Ok(());
    };
    match tokio::time::timeout(limit, writer.shutdown()).await {
        Ok(result) => result.map_err(|source| TeardownError::Close { stream, source }),
        Err(_) => Err(TeardownError::Close {
            stream,
            source: std::io::Error::new(std::io::ErrorKind::TimedOut, "shutdown timed out"),
        }),
    }
}

fn report(label: &str, step: &str, outcome: Result<(), TeardownError>) {
    match outcome {
        Ok(()) => debug!("{} Teardown step '{}' done", label, step),
        Err(e) => warn!("{} Teardown step '{}' failed: {}", label, step, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::read_frame;
    use crate::config::RelayConfig;
    use crate::connection::test_support::{
        connected, connected_in, flood_from_backend, pending, wait_until, Fixtures, Harness,
    };
    use crate::hooks::PassThrough;
    use crate::packet::{ChatContext, PacketId};
    use tokio::io::AsyncWriteExt;

    const MAX: usize = 1 << 20;
    /// An id the relay has no meaning for.
    const OPAQUE_ID: u32 = 6;

    async fn next_frame(harness: &mut Harness, from_backend: bool) -> Frame {
        let stream = if from_backend {
            &mut harness.backend_peer
        } else {
            &mut harness.client_peer
        };
        tokio::time::timeout(Duration::from_secs(2), read_frame(stream, MAX))
            .await
            .expect("frame in time")
            .expect("frame decodes")
    }

    #[tokio::test]
    async fn test_kick_grace_period_is_armed_once() {
        let mut h = connected().await;
        h.connection.identify("Alice").await.unwrap();

        let before = current_timestamp();
        assert!(h.connection.schedule_kick(Some("spamming")).await);
        let after = current_timestamp();

        let target = h.connection.kick_target();
        assert!(target >= before + KICK_GRACE_SECS && target <= after + KICK_GRACE_SECS);

        assert!(!h.connection.schedule_kick(None).await);
        assert!(!h.connection.schedule_ban("griefing").await);
        assert_eq!(h.connection.kick_target(), target);
        assert_eq!(h.connection.state(), ConnectionState::Connected);

        assert_eq!(
            h.broadcasts.messages().await,
            vec![format!("{}Alice has been kicked from the server for spamming!", WARNING_COLOR)]
        );

        let disconnect = next_frame(&mut h, true).await;
        assert_eq!(disconnect.id, PacketId::ClientDisconnect.as_u32());

        let warning = next_frame(&mut h, false).await;
        let chat = ChatMessage::decode(&warning.payload).unwrap();
        assert_eq!(chat.context, ChatContext::Broadcast);
        assert_eq!(
            chat.message,
            format!("{}You have been kicked from the server for spamming.", WARNING_COLOR)
        );
    }

    #[tokio::test]
    async fn test_teardown_runs_once() {
        let mut h = connected().await;
        h.connection.identify("Alice").await.unwrap();

        assert!(h.connection.close_connection().await);
        assert!(!h.connection.close_connection().await);
        assert!(!h.connection.finalize_kick().await);

        assert_eq!(h.connection.state(), ConnectionState::Disposing);
        assert!(!h.connection.is_alive());
        assert_eq!(h.store.saved().await.len(), 1);
        assert!(h.registry.is_empty());
        assert_eq!(h.broadcasts.messages().await, vec!["Alice has left the server.".to_string()]);

        let notice = next_frame(&mut h, true).await;
        assert_eq!(notice.id, PacketId::ClientDisconnect.as_u32());
        assert!(h.connection.wait_for_relays(Duration::from_secs(2)).await);
    }

    #[tokio::test]
    async fn test_kicked_player_leaves_without_notice() {
        let h = connected().await;
        h.connection.identify("Bob").await.unwrap();
        assert!(h.connection.schedule_ban("cheating").await);
        assert!(h.connection.finalize_kick().await);

        let messages = h.broadcasts.messages().await;
        assert_eq!(messages.len(), 1);
        assert!(messages[0].ends_with("Bob has been banned from the server for cheating!"));
        assert_eq!(h.store.saved().await.len(), 1);
    }

    #[tokio::test]
    async fn test_client_fault_disposes_immediately() {
        let mut h = connected().await;
        h.client_peer.shutdown().await.unwrap();

        let connection = h.connection.clone();
        wait_until(|| connection.state() == ConnectionState::Disposing).await;
        assert_eq!(h.connection.kick_target(), 0);
        assert!(h.connection.wait_for_relays(Duration::from_secs(2)).await);
    }

    #[tokio::test]
    async fn test_backend_fault_waits_out_grace_period() {
        let mut h = connected().await;
        h.backend_peer.shutdown().await.unwrap();

        let connection = h.connection.clone();
        wait_until(|| connection.kick_pending()).await;
        assert_eq!(h.connection.state(), ConnectionState::Connected);

        let warning = next_frame(&mut h, false).await;
        let chat = ChatMessage::decode(&warning.payload).unwrap();
        assert!(chat.message.contains("Dropped by parent server for"));

        // The client-to-backend loop is unaffected by the backend read fault.
        let frame = Frame::new(PacketId::ChatSend.as_u32(), vec![1, 2, 3]);
        write_frame(&mut h.client_peer, &frame).await.unwrap();
        assert_eq!(next_frame(&mut h, true).await.id, PacketId::ClientDisconnect.as_u32());
        assert_eq!(next_frame(&mut h, true).await, frame);

        assert!(h.connection.finalize_kick().await);
        assert!(h.connection.wait_for_relays(Duration::from_secs(2)).await);
    }

    #[tokio::test]
    async fn test_backend_fault_before_connect_rejects() {
        let mut h = pending();
        h.connection
            .force_disconnect(Direction::Backend, "refused")
            .await;

        let frame = next_frame(&mut h, false).await;
        assert_eq!(frame.id, PacketId::ConnectResponse.as_u32());
        let response = ConnectResponse::decode(&frame.payload).unwrap();
        assert_eq!(response.reason, format!("{}Connection Failed: refused", WARNING_COLOR));
        assert_eq!(h.connection.state(), ConnectionState::Disposing);
    }

    #[tokio::test]
    async fn test_handshake_rejection_leads_with_protocol_version() {
        let mut h = pending();
        h.connection
            .reject_with_handshake("Connection Failed: The server is not ready yet.")
            .await;

        let version = next_frame(&mut h, false).await;
        assert_eq!(version, packet::protocol_version(packet::DEFAULT_PROTOCOL_VERSION));
        let rejection = next_frame(&mut h, false).await;
        assert_eq!(rejection.id, PacketId::ConnectResponse.as_u32());
    }

    #[tokio::test]
    async fn test_chat_requires_connected_state() {
        let h = pending();
        h.connection.send_chat_message(ChatMessage::command_result("hi")).await;
        assert_eq!(h.connection.pending_chat_len().await, 0);
        assert_eq!(
            h.connection.identify("Alice").await.unwrap_err().to_string(),
            RegistryError::NotConnected.to_string()
        );
    }

    #[tokio::test]
    async fn test_sends_to_client_stop_once_kick_pending() {
        let mut h = connected().await;
        h.connection.send_to_client(OPAQUE_ID, vec![7]).await;
        assert_eq!(next_frame(&mut h, false).await.payload, vec![7]);

        assert!(h.connection.schedule_kick(None).await);
        h.connection.send_to_client(OPAQUE_ID, vec![8]).await;

        // Only the kick warning follows.
        let warning = next_frame(&mut h, false).await;
        assert_eq!(warning.id, PacketId::ChatReceive.as_u32());
        let idle = tokio::time::timeout(Duration::from_millis(200), read_frame(&mut h.client_peer, MAX)).await;
        assert!(idle.is_err());
    }

    #[tokio::test]
    async fn test_duplicate_names_are_refused() {
        let first = connected().await;
        first.connection.identify("Alice").await.unwrap();

        let second = connected_in(&first.fixtures, 2).await;
        assert!(matches!(
            second.connection.identify("Alice").await,
            Err(RegistryError::NameInUse(_))
        ));
    }

    #[tokio::test]
    async fn test_teardown_finishes_with_stalled_client() {
        let Harness {
            connection,
            client_peer: _client_peer,
            backend_peer,
            ..
        } = connected().await;

        let flood = flood_from_backend(backend_peer);
        tokio::time::sleep(Duration::from_millis(200)).await;

        let closed = tokio::time::timeout(Duration::from_secs(3), connection.close_connection()).await;
        assert_eq!(closed.ok(), Some(true));
        assert!(connection.wait_for_relays(Duration::from_secs(2)).await);
        flood.abort();
    }

    #[tokio::test]
    async fn test_stalled_client_write_is_a_client_fault() {
        let config = RelayConfig {
            socket_timeout: 1,
            ..Default::default()
        };
        let fixtures = Fixtures::build(config, Arc::new(PassThrough));
        let Harness {
            connection,
            client_peer: _client_peer,
            backend_peer,
            ..
        } = connected_in(&fixtures, 1).await;

        let flood = flood_from_backend(backend_peer);
        let disposed = tokio::time::timeout(Duration::from_secs(4), async {
            while connection.state() != ConnectionState::Disposing {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await;
        assert!(disposed.is_ok());
        assert!(!connection.kick_pending());
        flood.abort();
    }
}
