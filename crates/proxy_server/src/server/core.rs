//! The relay server: owns the listener and every live connection.

use super::handlers::handle_connection;
use super::sweep::{self, ConnectionTable};
use crate::connection::{Connection, ConnectionId, Endpoint};
use crate::context::ServerContext;
use crate::error::RelayError;
use socket2::{Domain, Protocol, Socket, Type};
use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// How long shutdown waits for teardown and for relay loops to wind down.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Accepts game clients and pairs each with a backend session.
///
/// The server runs until [`shutdown`](Self::shutdown) is called or the
/// consecutive backend failure threshold trips, in which case
/// [`serve`](Self::serve) returns [`RelayError::Crashed`] so the supervisor
/// can restart the process.
pub struct RelayServer {
    context: ServerContext,
    connections: Arc<ConnectionTable>,
    next_id: AtomicU64,
    shutdown: CancellationToken,
}

impl RelayServer {
    pub fn new(context: ServerContext) -> Self {
        Self {
            context,
            connections: Arc::new(ConnectionTable::new()),
            next_id: AtomicU64::new(1),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn context(&self) -> &ServerContext {
        &self.context
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn connection(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        self.connections.get(&id).map(|entry| entry.value().clone())
    }

    /// Binds the configured address.
    pub fn bind(&self) -> Result<TcpListener, RelayError> {
        let address = self.context.config.bind_address;
        let domain = if address.is_ipv4() { Domain::IPV4 } else { Domain::IPV6 };

        let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))
            .map_err(|e| RelayError::Network(format!("Socket creation failed: {e}")))?;
        if let Err(e) = socket.set_reuse_address(true) {
            warn!("Failed to set SO_REUSEADDR: {}", e);
        }
        socket
            .bind(&address.into())
            .map_err(|e| RelayError::Network(format!("Bind failed: {e}")))?;
        socket
            .listen(1024)
            .map_err(|e| RelayError::Network(format!("Listen failed: {e}")))?;
        socket
            .set_nonblocking(true)
            .map_err(|e| RelayError::Network(format!("Failed to set non-blocking: {e}")))?;

        let std_listener: StdTcpListener = socket.into();
        TcpListener::from_std(std_listener)
            .map_err(|e| RelayError::Network(format!("Tokio listener creation failed: {e}")))
    }

    /// Binds and serves until shutdown or crash.
    pub async fn start(&self) -> Result<(), RelayError> {
        let listener = self.bind()?;
        self.serve(listener).await
    }

    /// Runs the accept loop on an already bound listener.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), RelayError> {
        let local_addr = listener
            .local_addr()
            .map_err(|e| RelayError::Network(e.to_string()))?;

        let sweeper = sweep::spawn(
            self.connections.clone(),
            self.context.config.kick_sweep_interval(),
        );

        self.context.state.mark_running();
        info!(
            "Relay listening on {}, forwarding to {}",
            local_addr,
            self.context.config.backend_target()
        );

        let outcome = loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => self.spawn_connection(stream, addr),
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                },
                _ = self.context.state.wait_for_crash() => {
                    let failures = self.context.state.failed_connections();
                    break Err(RelayError::Crashed(failures));
                }
                _ = self.shutdown.cancelled() => {
                    info!("Shutdown signal received");
                    break Ok(());
                }
            }
        };

        drop(listener);
        sweeper.abort();
        self.context.state.begin_shutdown();
        self.close_all().await;

        info!("Relay stopped");
        outcome
    }

    fn spawn_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let connection = Connection::new(id, addr, Endpoint::from_tcp(stream), self.context.clone());
        self.connections.insert(id, connection.clone());
        tokio::spawn(handle_connection(connection));
    }

    /// Disconnects everyone and waits, bounded, for their relay loops.
    async fn close_all(&self) {
        let connections: Vec<Arc<Connection>> = self
            .connections
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        if connections.is_empty() {
            return;
        }

        info!("Closing {} connection(s)", connections.len());
        let closing = futures::future::join_all(connections.iter().map(|c| c.close_connection()));
        if tokio::time::timeout(DRAIN_TIMEOUT, closing).await.is_err() {
            warn!("Teardown did not finish within {:?}", DRAIN_TIMEOUT);
        }

        let drained = futures::future::join_all(
            connections.iter().map(|c| c.wait_for_relays(DRAIN_TIMEOUT)),
        )
        .await;
        let stuck = drained.iter().filter(|finished| !**finished).count();
        if stuck > 0 {
            warn!("{} connection(s) did not stop within {:?}", stuck, DRAIN_TIMEOUT);
        }
        self.connections.clear();
    }

    /// Asks the accept loop to stop. Takes effect even before `serve` runs.
    pub fn shutdown(&self) {
        info!("Shutting down relay...");
        self.shutdown.cancel();
    }
}
