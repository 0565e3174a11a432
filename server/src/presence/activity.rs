use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use uuid::Uuid;

use super::handshake::{HandshakeError, HandshakeKind};

/// An accepted call or game between two users.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Activity {
    pub id: Uuid,
    pub kind: HandshakeKind,
    pub participants: [String; 2],
    pub started_at: DateTime<Utc>,
}

impl Activity {
    pub fn peer_of(&self, user_id: &str) -> Option<&str> {
        match &self.participants {
            [a, b] if a == user_id => Some(b.as_str()),
            [a, b] if b == user_id => Some(a.as_str()),
            _ => None,
        }
    }
}

/// Active calls and games, indexed by each participant.
///
/// Starting an activity touches two keys at once, so this table uses one
/// mutex rather than a sharded map. The lock is never held across an await.
#[derive(Debug, Clone, Default)]
pub struct ActivityTable {
    by_user: Arc<Mutex<HashMap<String, Activity>>>,
}

impl ActivityTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start an activity between `a` and `b` if both are free.
    pub fn start(&self, a: &str, b: &str, kind: HandshakeKind) -> Result<Activity, HandshakeError> {
        let mut by_user = self.by_user.lock().unwrap_or_else(PoisonError::into_inner);
        for user in [a, b] {
            if by_user.contains_key(user) {
                return Err(HandshakeError::Busy(user.to_string()));
            }
        }

        let activity = Activity {
            id: Uuid::new_v4(),
            kind,
            participants: [a.to_string(), b.to_string()],
            started_at: Utc::now(),
        };
        by_user.insert(a.to_string(), activity.clone());
        by_user.insert(b.to_string(), activity.clone());
        Ok(activity)
    }

    pub fn current(&self, user_id: &str) -> Option<Activity> {
        self.by_user
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(user_id)
            .cloned()
    }

    pub fn is_busy(&self, user_id: &str) -> bool {
        self.by_user
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(user_id)
    }

    /// End the activity `user_id` is part of, freeing both participants.
    pub fn end(&self, user_id: &str) -> Option<Activity> {
        let mut by_user = self.by_user.lock().unwrap_or_else(PoisonError::into_inner);
        let activity = by_user.remove(user_id)?;
        if let Some(peer) = activity.peer_of(user_id) {
            if by_user.get(peer).is_some_and(|a| a.id == activity.id) {
                by_user.remove(peer);
            }
        }
        Some(activity)
    }
}
