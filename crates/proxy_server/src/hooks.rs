//! Per-frame interception on the client-to-backend path.
//!
//! Every frame the client sends is offered to the configured
//! [`PacketInterceptor`] before it reaches the backend. Permission checks,
//! commands and persistence hooks plug in here.

use crate::codec::Frame;
use crate::connection::Connection;
use crate::error::RegistryError;
use crate::packet::{ChatSend, ClientConnect, PacketId};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What to do with an intercepted frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameAction {
    /// Forward the frame unchanged.
    Forward,
    /// Forward this frame instead.
    Replace(Frame),
    /// Swallow the frame.
    Drop,
}

#[async_trait]
pub trait PacketInterceptor: Send + Sync {
    async fn on_client_frame(&self, connection: &Arc<Connection>, frame: &Frame) -> FrameAction;
}

/// Forwards everything untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassThrough;

#[async_trait]
impl PacketInterceptor for PassThrough {
    async fn on_client_frame(&self, _connection: &Arc<Connection>, _frame: &Frame) -> FrameAction {
        FrameAction::Forward
    }
}

/// Identifies players from their connect handshake and logs chat lines.
///
/// A handshake carrying a name that is already connected is answered with a
/// rejection and never reaches the backend.
#[derive(Debug, Default, Clone, Copy)]
pub struct ControlPacketInspector;

impl ControlPacketInspector {
    async fn on_client_connect(&self, connection: &Arc<Connection>, frame: &Frame) -> FrameAction {
        if frame.compressed {
            return FrameAction::Forward;
        }
        let handshake = match ClientConnect::decode(&frame.payload) {
            Ok(handshake) => handshake,
            Err(e) => {
                debug!("{} Undecodable connect handshake: {}", connection.label(), e);
                return FrameAction::Forward;
            }
        };

        if let Some(name) = connection.player_data().await.name {
            debug!("{} Repeated handshake from {}", connection.label(), name);
            return FrameAction::Forward;
        }

        match connection.identify(handshake.name).await {
            Ok(()) => FrameAction::Forward,
            Err(RegistryError::NameInUse(name)) => {
                warn!("{} Refused duplicate player name {}", connection.label(), name);
                connection
                    .reject_pre_connected(&format!(
                        "Connection Failed: A player named {} is already logged in.",
                        name
                    ))
                    .await;
                FrameAction::Drop
            }
            Err(RegistryError::NotConnected) => FrameAction::Drop,
        }
    }
}

#[async_trait]
impl PacketInterceptor for ControlPacketInspector {
    async fn on_client_frame(&self, connection: &Arc<Connection>, frame: &Frame) -> FrameAction {
        match PacketId::from_u32(frame.id) {
            Some(PacketId::ClientConnect) => return self.on_client_connect(connection, frame).await,
            Some(PacketId::ChatSend) if !frame.compressed => match ChatSend::decode(&frame.payload) {
                Ok(chat) => {
                    let player = connection.player_data().await;
                    info!("[chat] <{}> {}", player.display_name(), chat.message);
                }
                Err(e) => debug!("{} Undecodable chat packet: {}", connection.label(), e),
            },
            _ => {}
        }
        FrameAction::Forward
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::test_support::connected;
    use crate::packet::ChatMessage;

    #[tokio::test]
    async fn test_inspector_forwards_everything() {
        let h = connected().await;
        let inspector = ControlPacketInspector;

        let chat = ChatSend {
            message: "hello".to_string(),
            channel: 0,
        }
        .to_frame();
        let garbage = Frame::new(PacketId::ChatSend.as_u32(), vec![0xff]);
        let other = ChatMessage::broadcast("x").to_frame();

        for frame in [chat, garbage, other] {
            assert_eq!(
                inspector.on_client_frame(&h.connection, &frame).await,
                FrameAction::Forward
            );
        }
    }

    #[tokio::test]
    async fn test_malformed_handshake_is_forwarded_anonymously() {
        let h = connected().await;
        let truncated = Frame::new(PacketId::ClientConnect.as_u32(), vec![0x20, 1, 2]);

        assert_eq!(
            ControlPacketInspector.on_client_frame(&h.connection, &truncated).await,
            FrameAction::Forward
        );
        assert!(h.connection.player_data().await.name.is_none());
        assert!(h.registry.is_empty());
    }
}
