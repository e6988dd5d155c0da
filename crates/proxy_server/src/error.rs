//! Error types for the relay core.
//!
//! Each failure domain has its own enum. None of the per-connection errors
//! escape the connection boundary; they end up logged and, where a client is
//! still listening, turned into a rejection or kick message.

use crate::codec::CodecError;

/// Failures of the relay as a whole (listener, crash escalation).
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Internal error: {0}")]
    Internal(String),

    /// Too many consecutive backend dials failed.
    #[error("backend unreachable after {0} consecutive attempts")]
    Crashed(u32),
}

/// Failures while sending on, or setting up, one connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("{0} stream is not open")]
    NotOpen(&'static str),

    #[error("connection is already being disposed")]
    Disposing,

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure of a single teardown step.
#[derive(Debug, thiserror::Error)]
pub enum TeardownError {
    #[error("failed to save player data: {0}")]
    Persist(#[from] StoreError),

    #[error("failed to notify backend: {0}")]
    NotifyBackend(#[source] ConnectionError),

    #[error("failed to close {stream} stream: {source}")]
    Close {
        stream: &'static str,
        #[source]
        source: std::io::Error,
    },
}

/// Errors from the player data store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("player has no name to save under")]
    Anonymous,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from the client registry.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("a player named {0} is already connected")]
    NameInUse(String),

    #[error("connection is not accepting identification")]
    NotConnected,
}
