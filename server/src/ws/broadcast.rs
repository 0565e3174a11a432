//! JSON event framing for server -> client pushes.
//!
//! Every frame is a text message `{ "event": <name>, "data": <payload> }`.

use axum::extract::ws::{CloseFrame, Message};
use serde_json::{json, Value};

use super::ConnectionSender;
use crate::presence::{SessionHandle, SessionRegistry};

/// Close code sent to a connection replaced by a newer one for the same user.
pub const CLOSE_SUPERSEDED: u16 = 4000;

pub fn encode_event(event: &str, data: Value) -> Option<Message> {
    serde_json::to_string(&json!({ "event": event, "data": data }))
        .ok()
        .map(|text| Message::Text(text.into()))
}

/// Send an event to a user's registered session. Silently dropped if the
/// user has none.
pub fn send_to_user(sessions: &SessionRegistry, user_id: &str, event: &str, data: Value) -> bool {
    let Some(handle) = sessions.lookup(user_id) else {
        tracing::trace!(user_id = %user_id, event = %event, "No live session, event dropped");
        return false;
    };
    match encode_event(event, data) {
        Some(msg) => handle.send(msg),
        None => false,
    }
}

/// Reply on a specific connection, registered or not.
pub fn send_to_connection(tx: &ConnectionSender, event: &str, data: Value) {
    if let Some(msg) = encode_event(event, data) {
        let _ = tx.send(msg);
    }
}

pub fn send_error(tx: &ConnectionSender, message: &str) {
    send_to_connection(tx, "error", json!({ "message": message }));
}

/// Tell a superseded connection why it is going away, then close it.
pub fn close_superseded(handle: &SessionHandle) {
    if let Some(msg) = encode_event("superseded", json!({ "reason": "Signed in from another connection" })) {
        handle.send(msg);
    }
    handle.send(Message::Close(Some(CloseFrame {
        code: CLOSE_SUPERSEDED,
        reason: "Superseded".into(),
    })));
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn events_are_framed_as_json_text() {
        let msg = encode_event("receiveMessage", json!({ "id": "m1" })).unwrap();
        let Message::Text(text) = msg else {
            panic!("expected text frame");
        };
        let value: Value = serde_json::from_str(text.as_str()).unwrap();
        assert_eq!(value["event"], "receiveMessage");
        assert_eq!(value["data"]["id"], "m1");
    }

    #[test]
    fn send_to_user_reaches_registered_session_only() {
        let sessions = SessionRegistry::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        sessions.connect("u1", SessionHandle::new(tx));

        assert!(send_to_user(&sessions, "u1", "ping", json!({})));
        assert!(rx.try_recv().is_ok());
        assert!(!send_to_user(&sessions, "nobody", "ping", json!({})));
    }

    #[test]
    fn superseded_connection_gets_notice_then_close() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = SessionHandle::new(tx);
        close_superseded(&handle);

        assert!(matches!(rx.try_recv(), Ok(Message::Text(_))));
        match rx.try_recv() {
            Ok(Message::Close(Some(frame))) => assert_eq!(frame.code, CLOSE_SUPERSEDED),
            other => panic!("expected close frame, got {:?}", other),
        }
    }
}
