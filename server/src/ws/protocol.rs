use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::signaling;
use crate::state::AppState;
use crate::ws::broadcast::send_error;
use crate::ws::ConnectionSender;

/// Client frame: `{ "event": <name>, "data": {...} }`.
#[derive(Debug, Deserialize)]
pub struct ClientFrame {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Deserialize)]
struct EnterConversation {
    partner_id: String,
}

/// Handle an incoming text (JSON) frame from connection `connection_id`.
pub fn handle_text_message(
    text: &str,
    tx: &ConnectionSender,
    state: &AppState,
    user_id: &str,
    connection_id: Uuid,
) {
    let frame: ClientFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::warn!(user_id = %user_id, error = %e, "Failed to decode client frame");
            send_error(tx, "Invalid JSON frame");
            return;
        }
    };

    dispatch(frame, tx, state, user_id, connection_id);
}

fn dispatch(
    frame: ClientFrame,
    tx: &ConnectionSender,
    state: &AppState,
    user_id: &str,
    connection_id: Uuid,
) {
    let presence = &state.presence;
    match frame.event.as_str() {
        "enterConversation" => {
            if let Some(req) = decode::<EnterConversation>(frame.data, tx) {
                if presence.on_enter_conversation(user_id, &req.partner_id, connection_id) {
                    tracing::debug!(user_id = %user_id, partner_id = %req.partner_id, "Entered conversation");
                } else {
                    tracing::debug!(user_id = %user_id, connection_id = %connection_id, "Ignoring conversation from stale connection");
                }
            }
        }
        "leaveConversation" => {
            presence.on_leave_conversation(user_id, connection_id);
            tracing::debug!(user_id = %user_id, "Left conversation");
        }
        "invite" => {
            if let Some(req) = decode(frame.data, tx) {
                signaling::handle_invite(req, tx, state, user_id);
            }
        }
        "cancelInvite" => {
            if let Some(req) = decode(frame.data, tx) {
                signaling::handle_cancel_invite(req, tx, state, user_id);
            }
        }
        "answerInvite" => {
            if let Some(req) = decode(frame.data, tx) {
                signaling::handle_answer_invite(req, tx, state, user_id);
            }
        }
        "takeAnswer" => {
            if let Some(req) = decode(frame.data, tx) {
                signaling::handle_take_answer(req, tx, state, user_id);
            }
        }
        "endSession" => signaling::handle_end_session(tx, state, user_id),
        other => {
            tracing::debug!(user_id = %user_id, event = %other, "Unhandled client event");
            send_error(tx, &format!("Unknown event: {}", other));
        }
    }
}

fn decode<T: DeserializeOwned>(data: Value, tx: &ConnectionSender) -> Option<T> {
    match serde_json::from_value(data) {
        Ok(req) => Some(req),
        Err(e) => {
            send_error(tx, &format!("Invalid event data: {}", e));
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::db::init_memory_db;
    use crate::delivery::push::DisabledGateway;
    use crate::delivery::{OutgoingMessage, PushPlan};
    use crate::presence::SessionHandle;
    use axum::extract::ws::Message;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    fn state() -> AppState {
        AppState::new(init_memory_db().unwrap(), vec![0u8; 32], Arc::new(DisabledGateway), &Config::default())
    }

    fn next_event(rx: &mut mpsc::UnboundedReceiver<Message>) -> Value {
        match rx.try_recv() {
            Ok(Message::Text(text)) => serde_json::from_str(text.as_str()).unwrap(),
            other => panic!("expected text frame, got {:?}", other),
        }
    }

    fn connect(state: &AppState, user_id: &str) -> (Uuid, ConnectionSender, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = SessionHandle::new(tx.clone());
        let id = handle.connection_id;
        state.presence.on_connect(user_id, handle);
        (id, tx, rx)
    }

    #[test]
    fn enter_and_leave_conversation_update_pairing() {
        let state = state();
        let (conn, tx, _rx) = connect(&state, "v");

        handle_text_message(
            r#"{"event":"enterConversation","data":{"partner_id":"p"}}"#,
            &tx,
            &state,
            "v",
            conn,
        );
        assert!(state.presence.pairings.is_actively_viewing("v", "p"));

        handle_text_message(r#"{"event":"leaveConversation"}"#, &tx, &state, "v", conn);
        assert!(state.presence.pairings.get_active_partner("v").is_none());
    }

    #[tokio::test]
    async fn stale_connection_cannot_suppress_push_for_offline_user() {
        let state = state();
        state.store.create_user("S", "Sam", None).await.unwrap();
        state.store.create_user("R", "Riley", None).await.unwrap();
        state.store.add_push_token("R", "ExponentPushToken[r]").await.unwrap();

        let (old, old_tx, _old_rx) = connect(&state, "R");
        let (new, _new_tx, _new_rx) = connect(&state, "R");
        state.presence.on_disconnect("R", new).unwrap();

        handle_text_message(
            r#"{"event":"enterConversation","data":{"partner_id":"S"}}"#,
            &old_tx,
            &state,
            "R",
            old,
        );
        assert!(!state.presence.sessions.is_online("R"));
        assert!(state.presence.pairings.get_active_partner("R").is_none());

        let outgoing = OutgoingMessage {
            receiver_id: "R".into(),
            message_type: "text".into(),
            text: Some("still there?".into()),
            attachment: None,
        };
        let (_, outcome) = state.coordinator.send_message("S", outgoing).await.unwrap();
        assert!(!outcome.live);
        assert!(matches!(outcome.push, PushPlan::Scheduled(_)));
    }

    #[test]
    fn malformed_frames_get_error_replies() {
        let state = state();
        let (conn, tx, mut rx) = connect(&state, "u");

        handle_text_message("not json", &tx, &state, "u", conn);
        assert_eq!(next_event(&mut rx)["data"]["message"], "Invalid JSON frame");

        handle_text_message(r#"{"event":"enterConversation","data":{}}"#, &tx, &state, "u", conn);
        assert_eq!(next_event(&mut rx)["event"], "error");

        handle_text_message(r#"{"event":"dance","data":{}}"#, &tx, &state, "u", conn);
        assert_eq!(next_event(&mut rx)["data"]["message"], "Unknown event: dance");
    }
}
