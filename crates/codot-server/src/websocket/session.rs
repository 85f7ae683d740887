//! Client session lifecycle: one connected client from handshake through
//! disconnect.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use metrics::{counter, histogram};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use super::connection::ConnectionState;
use super::handler::handle_message;
use super::heartbeat::{HeartbeatResult, run_heartbeat};
use super::registry::{DisconnectReason, PendingConnection, SendStatus};
use crate::metrics::{WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_TOTAL};
use crate::server::AppState;

/// Text carried by a data frame. Binary frames holding UTF-8 are accepted
/// as text.
pub(crate) fn frame_text(msg: &Message) -> Option<String> {
    match msg {
        Message::Text(t) => Some(t.to_string()),
        Message::Binary(data) => std::str::from_utf8(data).ok().map(str::to_owned),
        _ => None,
    }
}

/// Run a client session.
///
/// 1. Promotes the pending slot to an open connection
/// 2. Spawns the writer (responses, pushed events, Ping frames) and the
///    heartbeat monitor
/// 3. Dispatches every complete text frame on its own task, so a slow
///    command never holds up the next frame
/// 4. Removes the connection and runs disconnect hooks on exit
///
/// In-flight commands are not cancelled when the socket closes; their
/// responses are discarded.
#[instrument(skip_all, fields(conn_id))]
pub async fn run_ws_session(ws: WebSocket, slot: PendingConnection, state: AppState) {
    let (mut ws_tx, mut ws_rx) = ws.split();

    let (send_tx, mut send_rx) = mpsc::channel::<String>(state.config.outbound_queue);
    let connection = state.connections.promote(slot, send_tx);
    let conn_id = connection.id;
    let _ = tracing::Span::current().record("conn_id", tracing::field::display(conn_id));
    let ctx = state.ctx.for_connection(conn_id);
    let session_cancel = state.ctx.shutdown.child_token();
    counter!(WS_CONNECTIONS_TOTAL).increment(1);

    // Outbound writer with periodic Ping frames.
    let writer_cancel = session_cancel.clone();
    let ping_every = state.config.heartbeat_interval;
    let writer = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(ping_every);
        // Skip the immediate first tick
        let _ = ping_interval.tick().await;

        loop {
            tokio::select! {
                msg = send_rx.recv() => {
                    match msg {
                        Some(text) => {
                            if ws_tx.send(Message::Text(text.into())).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                _ = ping_interval.tick() => {
                    if ws_tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
                () = writer_cancel.cancelled() => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    // Heartbeat monitor.
    let hb_cancel = session_cancel.clone();
    let hb_conn = Arc::clone(&connection);
    let (interval, timeout) = (state.config.heartbeat_interval, state.config.heartbeat_timeout);
    let heartbeat = tokio::spawn(async move {
        let result = run_heartbeat(hb_conn, interval, timeout, hb_cancel.clone()).await;
        if result == HeartbeatResult::TimedOut {
            warn!("client unresponsive for {timeout:?}, disconnecting");
            hb_cancel.cancel();
        }
        result
    });

    // Inbound frames.
    let reason = loop {
        let frame = tokio::select! {
            frame = ws_rx.next() => frame,
            () = session_cancel.cancelled() => {
                break if state.ctx.shutdown.is_cancelled() {
                    DisconnectReason::ServerShutdown
                } else {
                    DisconnectReason::HeartbeatTimeout
                };
            }
        };
        let msg = match frame {
            Some(Ok(msg)) => msg,
            Some(Err(e)) => {
                warn!(error = %e, "socket error");
                break DisconnectReason::SocketError;
            }
            None => break DisconnectReason::ClientClosed,
        };
        connection.mark_alive();

        if let Message::Close(_) = msg {
            debug!("client sent close frame");
            break DisconnectReason::ClientClosed;
        }
        let Some(text) = frame_text(&msg) else {
            if let Message::Binary(data) = &msg {
                info!(len = data.len(), "received non-UTF8 binary frame");
            }
            continue;
        };

        let registry = Arc::clone(&state.registry);
        let connections = Arc::clone(&state.connections);
        let ctx = ctx.clone();
        let _ = tokio::spawn(async move {
            let Some(response) = handle_message(&text, &registry, &ctx).await else {
                return;
            };
            if connections.send_response(conn_id, &response) == SendStatus::NotFound {
                debug!(conn_id = %conn_id, "client gone before response was ready");
            }
        });
    };

    // Clean up
    connection.set_state(ConnectionState::Closing);
    session_cancel.cancel();
    let _ = writer.await;
    heartbeat.abort();
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(connection.age().as_secs_f64());
    let _ = state.connections.disconnect(conn_id, reason);
}

#[cfg(test)]
mod tests {
    use super::*;

    // Full sessions need a real socket and are covered by
    // tests/integration.rs.

    #[test]
    fn text_frames_pass_through() {
        assert_eq!(frame_text(&Message::Text(String::from("{}").into())).as_deref(), Some("{}"));
    }

    #[test]
    fn utf8_binary_frames_are_text() {
        let msg = Message::Binary(b"{\"id\":1}".to_vec().into());
        assert_eq!(frame_text(&msg).as_deref(), Some("{\"id\":1}"));
    }

    #[test]
    fn invalid_utf8_and_control_frames_are_skipped() {
        assert!(frame_text(&Message::Binary(vec![0xff, 0xfe].into())).is_none());
        assert!(frame_text(&Message::Ping(Vec::new().into())).is_none());
        assert!(frame_text(&Message::Close(None)).is_none());
    }
}
