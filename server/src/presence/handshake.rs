//! Pending invitations and answers for call/game handshakes.
//!
//! Keyed by the directed pair (from, to). Each entry is single-use: the
//! operation that reads it for answering or cancelling also removes it, so
//! two racing answers can never both succeed.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandshakeKind {
    Call,
    Game,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingHandshake {
    pub id: Uuid,
    pub from_id: String,
    pub to_id: String,
    pub kind: HandshakeKind,
    /// Opaque signaling data (SDP offer/answer, game settings, ...).
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HandshakeError {
    #[error("invitation not found")]
    NotFound,
    #[error("user {0} is busy")]
    Busy(String),
    #[error("user {0} is offline")]
    Offline(String),
    #[error("cannot invite yourself")]
    SelfTarget,
}

type PairKey = (String, String);

fn key(from_id: &str, to_id: &str) -> PairKey {
    (from_id.to_string(), to_id.to_string())
}

#[derive(Debug, Clone, Default)]
pub struct HandshakeTable {
    entries: Arc<DashMap<PairKey, PendingHandshake>>,
}

impl HandshakeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a fresh entry from `from_id` to `to_id`. Any earlier entry for
    /// the same pair is replaced and returned so its holder can be told.
    pub fn create(
        &self,
        from_id: &str,
        to_id: &str,
        kind: HandshakeKind,
        payload: serde_json::Value,
    ) -> (PendingHandshake, Option<PendingHandshake>) {
        let entry = PendingHandshake {
            id: Uuid::new_v4(),
            from_id: from_id.to_string(),
            to_id: to_id.to_string(),
            kind,
            payload,
            created_at: Utc::now(),
        };
        let replaced = self.entries.insert(key(from_id, to_id), entry.clone());
        (entry, replaced)
    }

    pub fn lookup(&self, from_id: &str, to_id: &str) -> Option<PendingHandshake> {
        self.entries
            .get(&key(from_id, to_id))
            .map(|entry| entry.value().clone())
    }

    /// Lookup-and-clear, but only if the stored entry is still `id`.
    pub fn take(&self, from_id: &str, to_id: &str, id: Uuid) -> Option<PendingHandshake> {
        self.entries
            .remove_if(&key(from_id, to_id), |_, entry| entry.id == id)
            .map(|(_, entry)| entry)
    }

    /// Lookup-and-clear whatever entry the pair holds.
    pub fn take_any(&self, from_id: &str, to_id: &str) -> Option<PendingHandshake> {
        self.entries
            .remove(&key(from_id, to_id))
            .map(|(_, entry)| entry)
    }

    /// Remove every entry sent by `from_id`.
    pub fn clear_from(&self, from_id: &str) -> Vec<PendingHandshake> {
        self.remove_matching(|entry| entry.from_id == from_id)
    }

    /// Remove every entry sent by or addressed to `user_id`.
    pub fn clear_involving(&self, user_id: &str) -> Vec<PendingHandshake> {
        self.remove_matching(|entry| entry.from_id == user_id || entry.to_id == user_id)
    }

    /// Remove entries older than `ttl` as of `now`.
    pub fn purge_expired(&self, ttl: Duration, now: DateTime<Utc>) -> Vec<PendingHandshake> {
        self.remove_matching(|entry| now - entry.created_at >= ttl)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn remove_matching<F>(&self, predicate: F) -> Vec<PendingHandshake>
    where
        F: Fn(&PendingHandshake) -> bool,
    {
        // Collect keys first so no shard lock is held while removing
        let keys: Vec<PairKey> = self
            .entries
            .iter()
            .filter(|entry| predicate(entry.value()))
            .map(|entry| entry.key().clone())
            .collect();

        keys.into_iter()
            .filter_map(|k| self.entries.remove_if(&k, |_, entry| predicate(entry)))
            .map(|(_, entry)| entry)
            .collect()
    }
}
