//! `/game` endpoint: the instrumented game process.
//!
//! Frames in both directions are `{"message": <tag>, "data": <any>}`. The
//! connection is registered with the debugger bridge as a session for its
//! whole lifetime.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use codot_debugger::{DebuggerBridge, GameMessage, SessionChannel};
use futures::{SinkExt, StreamExt};
use metrics::counter;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use super::session::frame_text;
use crate::metrics::{GAME_SESSIONS_TOTAL, WS_MALFORMED_FRAMES_TOTAL};

/// Session channel writing to the game socket's outbound queue.
pub struct GameChannel {
    tx: mpsc::Sender<String>,
}

impl GameChannel {
    /// Wrap the writer queue.
    pub fn new(tx: mpsc::Sender<String>) -> Self {
        Self { tx }
    }
}

impl SessionChannel for GameChannel {
    fn send(&self, message: GameMessage) -> bool {
        match serde_json::to_string(&message) {
            Ok(json) => self.tx.try_send(json).is_ok(),
            Err(e) => {
                warn!(error = %e, tag = %message.message, "failed to serialize game message");
                false
            }
        }
    }
}

/// Run a game-process session until the socket closes or the server stops.
#[instrument(skip_all, fields(session_id))]
pub async fn run_game_session(
    ws: WebSocket,
    bridge: Arc<DebuggerBridge>,
    outbound_queue: usize,
    shutdown: CancellationToken,
) {
    let (mut ws_tx, mut ws_rx) = ws.split();
    let (send_tx, mut send_rx) = mpsc::channel::<String>(outbound_queue);
    let session_id = bridge.register_session(Arc::new(GameChannel::new(send_tx)));
    let _ = tracing::Span::current().record("session_id", tracing::field::display(session_id));
    counter!(GAME_SESSIONS_TOTAL).increment(1);

    let cancel = shutdown.child_token();
    let writer_cancel = cancel.clone();
    let writer = tokio::spawn(async move {
        loop {
            tokio::select! {
                msg = send_rx.recv() => {
                    let Some(text) = msg else { break };
                    if ws_tx.send(Message::Text(text.into())).await.is_err() {
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

    loop {
        let frame = tokio::select! {
            frame = ws_rx.next() => frame,
            () = cancel.cancelled() => break,
        };
        let msg = match frame {
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(msg)) => msg,
            Some(Err(e)) => {
                warn!(error = %e, "game socket error");
                break;
            }
        };
        let Some(text) = frame_text(&msg) else { continue };
        match serde_json::from_str::<GameMessage>(&text) {
            Ok(GameMessage { message, data }) => bridge.ingest(session_id, &message, data),
            Err(e) => {
                counter!(WS_MALFORMED_FRAMES_TOTAL).increment(1);
                debug!(error = %e, "dropping malformed game frame");
            }
        }
    }

    cancel.cancel();
    let _ = writer.await;
    let _ = bridge.end_session(session_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    #[tokio::test]
    async fn channel_writes_tagged_frames() {
        let (tx, mut rx) = mpsc::channel(4);
        let channel = GameChannel::new(tx);
        assert!(channel.send(GameMessage::new("codot:ping", json!({"sent_at": 1.0}))));
        let frame: Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(frame["message"], "codot:ping");
        assert_eq!(frame["data"]["sent_at"], 1.0);
    }

    #[test]
    fn channel_reports_full_queue() {
        let (tx, _rx) = mpsc::channel(1);
        let channel = GameChannel::new(tx);
        assert!(channel.send(GameMessage::new("codot:ping", Value::Null)));
        assert!(!channel.send(GameMessage::new("codot:ping", Value::Null)));
    }

    #[test]
    fn channel_reports_closed_queue() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        assert!(!GameChannel::new(tx).send(GameMessage::new("codot:input", json!({}))));
    }
}
