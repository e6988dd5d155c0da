//! Outbound dial to the backend game server.

use crate::config::RelayConfig;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;

#[derive(Debug, thiserror::Error)]
pub enum DialError {
    #[error("timed out after {0:?}")]
    TimedOut(Duration),

    #[error("connect failed: {0}")]
    Connect(#[from] std::io::Error),
}

/// Dials the configured backend, bounded by the dial timeout.
///
/// Failure accounting is left to the caller so the state transition and the
/// client rejection stay in one place.
pub async fn dial(config: &RelayConfig) -> Result<TcpStream, DialError> {
    let target = config.backend_target();
    let limit = config.dial_timeout();
    match timeout(limit, TcpStream::connect(target)).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(e)) => Err(DialError::Connect(e)),
        Err(_) => Err(DialError::TimedOut(limit)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_dial_reaches_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let config = RelayConfig {
            backend_address: "0.0.0.0".parse().unwrap(),
            backend_port: listener.local_addr().unwrap().port(),
            ..Default::default()
        };
        let (dialed, accepted) = tokio::join!(dial(&config), listener.accept());
        assert!(dialed.is_ok());
        assert!(accepted.is_ok());
    }

    #[tokio::test]
    async fn test_dial_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let config = RelayConfig {
            backend_address: "127.0.0.1".parse().unwrap(),
            backend_port: port,
            ..Default::default()
        };
        assert!(matches!(dial(&config).await, Err(DialError::Connect(_))));
    }
}
