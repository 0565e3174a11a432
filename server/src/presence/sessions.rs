//! Session registry: which users currently hold a live connection.
//!
//! Single-session model. A user has at most one registered handle; a new
//! connection replaces the old one and the caller is told which handle it
//! superseded so it can close it.

use axum::extract::ws::Message;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::ws::ConnectionSender;

/// Reference to a live transport endpoint. The transport owns the channel's
/// lifecycle; the registry only holds a clone of the sender half.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub connection_id: Uuid,
    pub connected_at: DateTime<Utc>,
    sender: ConnectionSender,
}

impl SessionHandle {
    pub fn new(sender: ConnectionSender) -> Self {
        Self {
            connection_id: Uuid::new_v4(),
            connected_at: Utc::now(),
            sender,
        }
    }

    /// Queue a frame on the connection's writer. Returns false once the
    /// writer has gone away.
    pub fn send(&self, msg: Message) -> bool {
        self.sender.send(msg).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<DashMap<String, SessionHandle>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handle` for `user_id`, returning the handle it replaced.
    pub fn connect(&self, user_id: &str, handle: SessionHandle) -> Option<SessionHandle> {
        let previous = self.sessions.insert(user_id.to_string(), handle);
        tracing::debug!(
            user_id = %user_id,
            superseded = previous.is_some(),
            "Session registered"
        );
        previous
    }

    /// Remove whatever session `user_id` has. Idempotent.
    pub fn disconnect(&self, user_id: &str) -> Option<SessionHandle> {
        self.sessions.remove(user_id).map(|(_, handle)| handle)
    }

    /// Remove the session only if it is still `connection_id`. A connection
    /// that was superseded must not tear down its replacement.
    pub fn release(&self, user_id: &str, connection_id: Uuid) -> bool {
        self.sessions
            .remove_if(user_id, |_, handle| handle.connection_id == connection_id)
            .is_some()
    }

    pub fn is_current(&self, user_id: &str, connection_id: Uuid) -> bool {
        self.sessions
            .get(user_id)
            .is_some_and(|entry| entry.value().connection_id == connection_id)
    }

    /// Run `f` only while `connection_id` is the user's session. The entry
    /// stays read-locked until `f` returns, so a concurrent `release` of
    /// that connection waits for it. `f` must not touch this registry.
    pub fn while_current<R>(
        &self,
        user_id: &str,
        connection_id: Uuid,
        f: impl FnOnce() -> R,
    ) -> Option<R> {
        let entry = self.sessions.get(user_id)?;
        if entry.value().connection_id != connection_id {
            return None;
        }
        let result = f();
        drop(entry);
        Some(result)
    }

    pub fn lookup(&self, user_id: &str) -> Option<SessionHandle> {
        self.sessions.get(user_id).map(|entry| entry.value().clone())
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        self.sessions.contains_key(user_id)
    }

    pub fn online_count(&self) -> usize {
        self.sessions.len()
    }
}
