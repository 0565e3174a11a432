//! In-memory presence state: live sessions, open conversations, pending
//! call/game handshakes and active calls/games.
//!
//! Each table is its own lock domain and none of them performs I/O. Callers
//! emit events only after an operation here has returned.

pub mod activity;
pub mod handshake;
pub mod pairing;
pub mod sessions;

pub use activity::{Activity, ActivityTable};
pub use handshake::{HandshakeError, HandshakeKind, HandshakeTable, PendingHandshake};
pub use pairing::PairingTracker;
pub use sessions::{SessionHandle, SessionRegistry};

use uuid::Uuid;

/// What a user left behind when their connection went away.
#[derive(Debug, Default)]
pub struct Departure {
    pub left_conversation_with: Option<String>,
    pub ended_activity: Option<Activity>,
    pub cancelled_invitations: Vec<PendingHandshake>,
    pub dropped_answers: Vec<PendingHandshake>,
}

#[derive(Debug, Clone, Default)]
pub struct Presence {
    pub sessions: SessionRegistry,
    pub pairings: PairingTracker,
    pub invitations: HandshakeTable,
    pub answers: HandshakeTable,
    pub activities: ActivityTable,
}

impl Presence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new connection. Returns the handle it superseded, which
    /// the caller is responsible for closing.
    pub fn on_connect(&self, user_id: &str, handle: SessionHandle) -> Option<SessionHandle> {
        self.sessions.connect(user_id, handle)
    }

    /// Tear down a connection's presence. Runs at most once per connection:
    /// returns None if `connection_id` is no longer the user's session
    /// (already released, or superseded by a newer connection). A pairing
    /// opened by this connection is cleared either way.
    pub fn on_disconnect(&self, user_id: &str, connection_id: Uuid) -> Option<Departure> {
        let released = self.sessions.release(user_id, connection_id);
        let left_conversation_with = self.pairings.clear_active_partner(user_id, connection_id);
        if !released {
            return None;
        }

        Some(Departure {
            left_conversation_with,
            ended_activity: self.activities.end(user_id),
            cancelled_invitations: self.invitations.clear_from(user_id),
            dropped_answers: self.answers.clear_involving(user_id),
        })
    }

    /// Record that the viewer opened a conversation. Returns false, and
    /// records nothing, if `connection_id` no longer holds the session.
    pub fn on_enter_conversation(&self, viewer_id: &str, partner_id: &str, connection_id: Uuid) -> bool {
        self.sessions
            .while_current(viewer_id, connection_id, || {
                self.pairings.set_active_partner(viewer_id, partner_id, connection_id);
            })
            .is_some()
    }

    pub fn on_leave_conversation(&self, viewer_id: &str, connection_id: Uuid) {
        self.pairings.clear_active_partner(viewer_id, connection_id);
    }
}
