//! Setup path for a freshly accepted client.

use crate::connection::{admission, backend, Connection, Endpoint};
use crate::error::ConnectionError;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

const BACKEND_UNREACHABLE: &str = "Connection Failed: Unable to connect to the parent server.";
const INTERNAL_ERROR: &str = "Connection Failed: An internal server error occurred (1)";

/// Admits the client, dials the backend and starts relaying.
///
/// Every failure ends in a handshake rejection so the client sees a reason.
/// Dial failures and setup errors count toward the consecutive-failure
/// threshold; a completed attach resets it.
pub async fn handle_connection(connection: Arc<Connection>) {
    let context = connection.context().clone();
    let label = connection.label();
    info!("{} Accepting new connection from {}.", label, connection.peer_addr());

    if let Err(rejection) = admission::evaluate(&context.state) {
        info!("{} Turned away: {}", label, rejection);
        connection.reject_with_handshake(&rejection.to_string()).await;
        return;
    }

    let threshold = context.config.max_failed_connections;
    let stream = match backend::dial(&context.config).await {
        Ok(stream) => stream,
        Err(e) => {
            warn!(
                "{} Unable to reach backend {}: {}",
                label,
                context.config.backend_target(),
                e
            );
            context.state.record_dial_failure(threshold);
            connection.reject_with_handshake(BACKEND_UNREACHABLE).await;
            return;
        }
    };

    match connection.attach_backend(Endpoint::from_tcp(stream)).await {
        Ok(()) => {
            context.state.reset_failures();
            debug!("{} Connected to backend {}", label, context.config.backend_target());
        }
        Err(ConnectionError::Disposing) => {
            debug!("{} Closed before the backend was attached", label);
        }
        Err(e) => {
            error!("{} Connection setup failed: {}", label, e);
            context.state.record_dial_failure(threshold);
            connection.reject_with_handshake(INTERNAL_ERROR).await;
        }
    }
}
