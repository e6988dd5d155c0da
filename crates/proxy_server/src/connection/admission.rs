//! Admission gate evaluated once per new connection, before any backend dial.

use crate::state::{ServerLifecycle, ServerState};

/// Why a client was turned away. `Display` is the client-visible reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AdmissionError {
    #[error("Connection Failed: The server is not ready yet.")]
    NotReady,

    #[error("Connection Failed: The server is shutting down.")]
    ShuttingDown,

    #[error("Connection Failed: The server is restarting.")]
    Restarting,
}

/// Checks readiness, shutdown and pending restart, in that order.
pub fn evaluate(state: &ServerState) -> Result<(), AdmissionError> {
    match state.lifecycle() {
        ServerLifecycle::Starting => Err(AdmissionError::NotReady),
        ServerLifecycle::ShuttingDown | ServerLifecycle::Crashed => Err(AdmissionError::ShuttingDown),
        ServerLifecycle::Running if state.restart_time() != 0 => Err(AdmissionError::Restarting),
        ServerLifecycle::Running => Ok(()),
    }
}
