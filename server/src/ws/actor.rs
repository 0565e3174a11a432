use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, timeout};

use crate::presence::SessionHandle;
use crate::signaling;
use crate::state::AppState;
use crate::ws::broadcast::close_superseded;
use crate::ws::protocol;

/// Ping interval: server sends WebSocket ping every 30 seconds.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Pong timeout: if pong not received within 10 seconds after ping, close.
const PONG_TIMEOUT: Duration = Duration::from_secs(10);

/// Run the actor-per-connection pattern for an authenticated WebSocket.
///
/// Splits the WebSocket into reader and writer halves:
/// - Writer task: owns the sink, forwards messages from an mpsc channel
/// - Reader loop: processes incoming frames, dispatches to protocol handlers
///
/// The connection registers itself as the user's session on start. A newer
/// connection for the same user supersedes it; presence is only torn down by
/// whichever connection still holds the session when it ends.
pub async fn run_connection(socket: WebSocket, state: AppState, user_id: String) {
    let (ws_sender, mut ws_receiver) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel::<Message>();

    let handle = SessionHandle::new(tx.clone());
    let connection_id = handle.connection_id;
    if let Some(previous) = state.presence.on_connect(&user_id, handle) {
        tracing::info!(
            user_id = %user_id,
            superseded = %previous.connection_id,
            "Closing superseded connection"
        );
        close_superseded(&previous);
    }

    tracing::info!(user_id = %user_id, connection_id = %connection_id, "WebSocket actor started");

    let writer_handle = tokio::spawn(writer_task(ws_sender, rx));

    let (pong_tx, mut pong_rx) = mpsc::unbounded_channel::<()>();

    let ping_tx = tx.clone();
    let ping_handle = tokio::spawn(async move {
        let mut ping_timer = interval(PING_INTERVAL);
        // Skip the first immediate tick
        ping_timer.tick().await;

        loop {
            ping_timer.tick().await;

            if ping_tx.send(Message::Ping(vec![1, 2, 3, 4].into())).is_err() {
                // Writer task has died, connection is gone
                break;
            }

            match timeout(PONG_TIMEOUT, pong_rx.recv()).await {
                Ok(Some(())) => {}
                _ => {
                    tracing::warn!("Pong timeout, closing connection");
                    let _ = ping_tx.send(Message::Close(Some(CloseFrame {
                        code: 1001,
                        reason: "Pong timeout".into(),
                    })));
                    break;
                }
            }
        }
    });

    loop {
        match ws_receiver.next().await {
            Some(Ok(msg)) => match msg {
                Message::Text(text) => {
                    if !state.presence.sessions.is_current(&user_id, connection_id) {
                        tracing::debug!(
                            user_id = %user_id,
                            connection_id = %connection_id,
                            "Connection superseded, ignoring further frames"
                        );
                        break;
                    }
                    protocol::handle_text_message(text.as_str(), &tx, &state, &user_id, connection_id);
                }
                Message::Binary(_) => {
                    tracing::debug!(user_id = %user_id, "Ignoring binary frame");
                }
                Message::Pong(_) => {
                    let _ = pong_tx.send(());
                }
                Message::Ping(data) => {
                    let _ = tx.send(Message::Pong(data));
                }
                Message::Close(frame) => {
                    tracing::info!(user_id = %user_id, reason = ?frame, "Client initiated close");
                    break;
                }
            },
            Some(Err(e)) => {
                tracing::warn!(user_id = %user_id, error = %e, "WebSocket receive error");
                break;
            }
            None => {
                tracing::info!(user_id = %user_id, "WebSocket stream ended");
                break;
            }
        }
    }

    writer_handle.abort();
    ping_handle.abort();

    // Only clears this connection's own pairing if it was superseded
    if let Some(departure) = state.presence.on_disconnect(&user_id, connection_id) {
        signaling::announce_departure(&state, &user_id, &departure);
        tracing::debug!(
            user_id = %user_id,
            left_conversation_with = ?departure.left_conversation_with,
            cancelled_invitations = departure.cancelled_invitations.len(),
            "Presence cleared"
        );
    }

    tracing::info!(user_id = %user_id, connection_id = %connection_id, "WebSocket actor stopped");
}

/// Writer task: receives messages from mpsc channel and forwards them to the WebSocket sink.
/// Stops after forwarding a close frame.
async fn writer_task(
    mut ws_sender: futures_util::stream::SplitSink<WebSocket, Message>,
    mut rx: mpsc::UnboundedReceiver<Message>,
) {
    while let Some(msg) = rx.recv().await {
        let closing = matches!(msg, Message::Close(_));
        if ws_sender.send(msg).await.is_err() || closing {
            break;
        }
    }
}
