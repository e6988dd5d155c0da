//! The two forwarding loops of a connected session.
//!
//! Each loop owns one read half. A fault in one loop is routed through
//! [`Connection::force_disconnect`] and ends that loop only; the other keeps
//! running until teardown cancels it. Writes race the cancellation too, so a
//! stalled peer never keeps a loop, or the writer lock, past teardown.

use super::endpoint::BoxedReader;
use super::{Connection, Direction};
use crate::codec::{read_frame, CodecError, Frame};
use crate::hooks::FrameAction;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::debug;

pub(super) fn spawn(
    connection: &Arc<Connection>,
    client_reader: BoxedReader,
    backend_reader: BoxedReader,
) -> Vec<JoinHandle<()>> {
    vec![
        tokio::spawn(backend_to_client(connection.clone(), backend_reader)),
        tokio::spawn(client_to_backend(connection.clone(), client_reader)),
    ]
}

/// Reads one backend frame under the socket timeout, handing the reader back
/// so the read can live across `select!` iterations without being dropped
/// mid-frame.
async fn next_backend_frame(
    mut reader: BoxedReader,
    limit: Duration,
    max_payload: usize,
) -> (BoxedReader, Result<Frame, CodecError>) {
    let result = match timeout(limit, read_frame(&mut reader, max_payload)).await {
        Ok(result) => result,
        Err(_) => Err(CodecError::TimedOut),
    };
    (reader, result)
}

/// Backend to client. Also delivers queued chat, between frames.
async fn backend_to_client(connection: Arc<Connection>, reader: BoxedReader) {
    let label = connection.label();
    let cancel = connection.cancel_token();
    let limit = connection.context().config.socket_timeout();
    let max_payload = connection.context().config.max_payload_size;

    let pending = next_backend_frame(reader, limit, max_payload);
    tokio::pin!(pending);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            _ = connection.chat_ready().notified() => {
                let flushed = tokio::select! {
                    _ = cancel.cancelled() => break,
                    flushed = connection.flush_pending_chat() => flushed,
                };
                if let Err(e) = flushed {
                    connection.force_disconnect(Direction::Client, &e.to_string()).await;
                    break;
                }
            }

            (reader, result) = &mut pending => match result {
                Ok(frame) => {
                    let written = tokio::select! {
                        _ = cancel.cancelled() => break,
                        written = connection.write_client_frame(&frame) => written,
                    };
                    if let Err(e) = written {
                        connection.force_disconnect(Direction::Client, &e.to_string()).await;
                        break;
                    }
                    pending.set(next_backend_frame(reader, limit, max_payload));
                }
                Err(e) => {
                    connection.force_disconnect(Direction::Backend, &e.to_string()).await;
                    // Whatever the fault queued (the kick warning) still goes out.
                    tokio::select! {
                        _ = cancel.cancelled() => {}
                        flushed = connection.flush_pending_chat() => {
                            if let Err(e) = flushed {
                                debug!("{} Could not deliver queued chat: {}", label, e);
                            }
                        }
                    }
                    break;
                }
            },
        }
    }

    debug!("{} Backend relay finished", label);
}

/// Client to backend, passing every frame through the interceptor.
async fn client_to_backend(connection: Arc<Connection>, mut reader: BoxedReader) {
    let label = connection.label();
    let cancel = connection.cancel_token();
    let interceptor = connection.context().interceptor.clone();
    let max_payload = connection.context().config.max_payload_size;

    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => break,
            result = read_frame(&mut reader, max_payload) => match result {
                Ok(frame) => frame,
                Err(e) => {
                    connection.force_disconnect(Direction::Client, &e.to_string()).await;
                    break;
                }
            },
        };

        let frame = match interceptor.on_client_frame(&connection, &frame).await {
            FrameAction::Forward => frame,
            FrameAction::Replace(replacement) => replacement,
            FrameAction::Drop => continue,
        };

        let written = tokio::select! {
            _ = cancel.cancelled() => break,
            written = connection.write_backend_frame(&frame) => written,
        };
        if let Err(e) = written {
            connection.force_disconnect(Direction::Backend, &e.to_string()).await;
            break;
        }
    }

    debug!("{} Client relay finished", label);
}
