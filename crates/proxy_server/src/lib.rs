//! # Proxy Server - Starbound Relay Core
//!
//! Sits between game clients and a backend game server and forwards frames
//! in both directions without interpreting them. On top of that plain relay
//! it adds the pieces a server operator needs:
//!
//! * **Admission** - clients are turned away with a readable reason while the
//!   relay is starting, shutting down or about to restart
//! * **Backend circuit breaker** - consecutive dial failures are counted and,
//!   past a threshold, the relay stops so a supervisor can restart it
//! * **Kicks and bans** - the player is told why, everyone else is told who,
//!   and the connection is closed after a short grace period
//! * **Chat injection** - relay-originated chat lines are queued per
//!   connection and delivered between relayed frames
//!
//! ## Connection lifecycle
//!
//! Each [`Connection`] goes `PendingConnect -> Connected -> Disposing`.
//! Teardown runs once no matter how many faults race to trigger it; its steps
//! (stop loops, save player, leave registry, notify backend, close streams)
//! each run even if an earlier one failed.
//!
//! ## Wire format
//!
//! Frames are `VLQ id, signed VLQ length, payload`. A negative length marks a
//! compressed payload, which is relayed untouched. See [`codec`].
//!
//! ## Error Handling
//!
//! Each failure domain has its own error enum in [`error`]. Per-connection
//! failures never escape their connection: they are logged and, when the
//! client can still hear it, reported to the client.

pub use config::RelayConfig;
pub use connection::{Connection, ConnectionId, ConnectionState, Direction, Endpoint};
pub use context::ServerContext;
pub use error::RelayError;
pub use server::RelayServer;
pub use state::{ServerLifecycle, ServerState};
pub use utils::{create_relay, current_timestamp};

pub mod codec;
pub mod config;
pub mod connection;
pub mod context;
pub mod error;
pub mod hooks;
pub mod packet;
pub mod player;
pub mod registry;
pub mod server;
pub mod state;
pub mod storage;
pub mod utils;
