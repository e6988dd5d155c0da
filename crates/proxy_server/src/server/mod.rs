//! Listener, accept loop and background maintenance.

mod core;
mod handlers;
mod sweep;

pub use self::core::RelayServer;
pub use handlers::handle_connection;
pub use sweep::{sweep_once, ConnectionTable};
