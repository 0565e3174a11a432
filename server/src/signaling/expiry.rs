//! Background purge of stale invitations and answers.

use chrono::{DateTime, Utc};
use serde_json::json;
use tokio::task::JoinHandle;

use crate::state::AppState;

/// Spawn a task that purges expired handshakes every `state.sweep_interval`.
pub fn spawn_expiry_sweeper(state: AppState) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(state.sweep_interval).await;
            let (invitations, answers) = sweep_expired(&state, Utc::now());
            if invitations + answers > 0 {
                tracing::info!(invitations, answers, "Expired handshakes purged");
            } else {
                tracing::trace!("Handshake sweep: nothing expired");
            }
        }
    })
}

/// Purge entries older than the configured TTL as of `now`. Both ends of an
/// expired invitation are told, if online. Returns (invitations, answers) purged.
pub fn sweep_expired(state: &AppState, now: DateTime<Utc>) -> (usize, usize) {
    let presence = &state.presence;
    let expired = presence.invitations.purge_expired(state.invitation_ttl, now);
    for invitation in &expired {
        let data = json!({
            "invitation_id": invitation.id,
            "from": invitation.from_id,
            "to": invitation.to_id,
            "kind": invitation.kind,
        });
        state.fanout.emit(&invitation.from_id, "inviteExpired", data.clone());
        state.fanout.emit(&invitation.to_id, "inviteExpired", data);
    }

    let stale_answers = presence.answers.purge_expired(state.invitation_ttl, now);
    (expired.len(), stale_answers.len())
}
