//! Which conversation each user currently has open.
//!
//! Directional: viewer -> partner. A viewer has at most one partner; setting
//! a new one replaces the old entry in a single map operation. Each entry
//! remembers the connection that opened it, so a connection can only clear
//! what it set itself.

use dashmap::DashMap;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct ActivePairing {
    partner_id: String,
    connection_id: Uuid,
}

#[derive(Debug, Clone, Default)]
pub struct PairingTracker {
    partners: Arc<DashMap<String, ActivePairing>>,
}

impl PairingTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the partner the viewer was looking at before, if any.
    pub fn set_active_partner(
        &self,
        viewer_id: &str,
        partner_id: &str,
        connection_id: Uuid,
    ) -> Option<String> {
        self.partners
            .insert(
                viewer_id.to_string(),
                ActivePairing {
                    partner_id: partner_id.to_string(),
                    connection_id,
                },
            )
            .map(|previous| previous.partner_id)
    }

    /// Clear the viewer's pairing only if `connection_id` opened it.
    pub fn clear_active_partner(&self, viewer_id: &str, connection_id: Uuid) -> Option<String> {
        self.partners
            .remove_if(viewer_id, |_, pairing| pairing.connection_id == connection_id)
            .map(|(_, pairing)| pairing.partner_id)
    }

    pub fn get_active_partner(&self, viewer_id: &str) -> Option<String> {
        self.partners
            .get(viewer_id)
            .map(|entry| entry.value().partner_id.clone())
    }

    pub fn is_actively_viewing(&self, viewer_id: &str, partner_id: &str) -> bool {
        self.partners
            .get(viewer_id)
            .is_some_and(|entry| entry.value().partner_id == partner_id)
    }
}
