use serde_json::Value;

use crate::presence::SessionRegistry;
use crate::ws::broadcast::send_to_user;

/// Publish/subscribe channel keyed by user id.
///
/// Fire-and-forget: an event for a user with no live session is dropped.
pub trait LiveFanout: Send + Sync {
    /// Returns true if the event was queued on a live session.
    fn emit(&self, target_user_id: &str, event: &str, payload: Value) -> bool;
}

/// Fan-out over the WebSocket sessions held in the registry.
#[derive(Debug, Clone)]
pub struct WsFanout {
    sessions: SessionRegistry,
}

impl WsFanout {
    pub fn new(sessions: SessionRegistry) -> Self {
        Self { sessions }
    }
}

impl LiveFanout for WsFanout {
    fn emit(&self, target_user_id: &str, event: &str, payload: Value) -> bool {
        send_to_user(&self.sessions, target_user_id, event, payload)
    }
}
