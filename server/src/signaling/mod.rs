//! Call and game handshakes over the WebSocket.
//!
//! An inviter creates an invitation, the receiver answers it (once), and an
//! accepted answer is parked for the inviter to collect. Accepting starts an
//! activity that holds both users busy until one of them ends it or drops.

pub mod expiry;

use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::presence::{Departure, HandshakeError, HandshakeKind};
use crate::state::AppState;
use crate::ws::broadcast::{send_error, send_to_connection};
use crate::ws::ConnectionSender;

#[derive(Debug, Deserialize)]
pub struct InviteRequest {
    pub to: String,
    pub kind: HandshakeKind,
    #[serde(default)]
    pub payload: Value,
}

#[derive(Debug, Deserialize)]
pub struct CancelInviteRequest {
    pub invitation_id: Uuid,
    pub to: String,
}

#[derive(Debug, Deserialize)]
pub struct AnswerInviteRequest {
    pub invitation_id: Uuid,
    pub from: String,
    pub accept: bool,
    #[serde(default)]
    pub payload: Value,
}

#[derive(Debug, Deserialize)]
pub struct TakeAnswerRequest {
    pub from: String,
}

pub fn handle_invite(req: InviteRequest, tx: &ConnectionSender, state: &AppState, user_id: &str) {
    if let Err(e) = check_can_invite(state, user_id, &req.to) {
        send_error(tx, &e.to_string());
        return;
    }

    let presence = &state.presence;
    let (invitation, replaced) = presence
        .invitations
        .create(user_id, &req.to, req.kind, req.payload);

    if let Some(old) = replaced {
        state.fanout.emit(
            &old.to_id,
            "inviteCancelled",
            json!({ "invitation_id": old.id, "from": user_id }),
        );
    }

    state.fanout.emit(
        &invitation.to_id,
        "incomingInvite",
        json!({
            "invitation_id": invitation.id,
            "from": user_id,
            "kind": invitation.kind,
            "payload": invitation.payload,
            "created_at": invitation.created_at,
        }),
    );
    send_to_connection(
        tx,
        "inviteSent",
        json!({ "invitation_id": invitation.id, "to": invitation.to_id, "kind": invitation.kind }),
    );

    tracing::info!(
        from = %user_id,
        to = %invitation.to_id,
        kind = ?invitation.kind,
        invitation_id = %invitation.id,
        "Invitation created"
    );
}

fn check_can_invite(state: &AppState, user_id: &str, to: &str) -> Result<(), HandshakeError> {
    let presence = &state.presence;
    if user_id == to {
        return Err(HandshakeError::SelfTarget);
    }
    if !presence.sessions.is_online(to) {
        return Err(HandshakeError::Offline(to.to_string()));
    }
    for user in [user_id, to] {
        if presence.activities.is_busy(user) {
            return Err(HandshakeError::Busy(user.to_string()));
        }
    }
    Ok(())
}

pub fn handle_cancel_invite(req: CancelInviteRequest, tx: &ConnectionSender, state: &AppState, user_id: &str) {
    match state.presence.invitations.take(user_id, &req.to, req.invitation_id) {
        Some(invitation) => {
            state.fanout.emit(
                &invitation.to_id,
                "inviteCancelled",
                json!({ "invitation_id": invitation.id, "from": user_id }),
            );
            tracing::debug!(invitation_id = %invitation.id, "Invitation cancelled");
        }
        None => send_error(tx, &HandshakeError::NotFound.to_string()),
    }
}

pub fn handle_answer_invite(req: AnswerInviteRequest, tx: &ConnectionSender, state: &AppState, user_id: &str) {
    let presence = &state.presence;
    // Take first: of two racing answers only one gets the entry
    let Some(invitation) = presence.invitations.take(&req.from, user_id, req.invitation_id) else {
        send_error(tx, &HandshakeError::NotFound.to_string());
        return;
    };

    if !req.accept {
        state.fanout.emit(
            &invitation.from_id,
            "inviteDeclined",
            json!({ "invitation_id": invitation.id, "by": user_id }),
        );
        tracing::debug!(invitation_id = %invitation.id, "Invitation declined");
        return;
    }

    let activity = match presence
        .activities
        .start(&invitation.from_id, user_id, invitation.kind)
    {
        Ok(activity) => activity,
        Err(e) => {
            send_error(tx, &e.to_string());
            state.fanout.emit(
                &invitation.from_id,
                "inviteDeclined",
                json!({ "invitation_id": invitation.id, "by": user_id, "reason": e.to_string() }),
            );
            return;
        }
    };

    presence
        .answers
        .create(user_id, &invitation.from_id, invitation.kind, req.payload);
    state.fanout.emit(
        &invitation.from_id,
        "inviteAccepted",
        json!({
            "invitation_id": invitation.id,
            "by": user_id,
            "kind": invitation.kind,
            "activity_id": activity.id,
        }),
    );

    tracing::info!(
        invitation_id = %invitation.id,
        activity_id = %activity.id,
        kind = ?activity.kind,
        "Invitation accepted"
    );
}

pub fn handle_take_answer(req: TakeAnswerRequest, tx: &ConnectionSender, state: &AppState, user_id: &str) {
    match state.presence.answers.take_any(&req.from, user_id) {
        Some(answer) => send_to_connection(
            tx,
            "answer",
            json!({ "from": answer.from_id, "kind": answer.kind, "payload": answer.payload }),
        ),
        None => send_error(tx, "answer not found"),
    }
}

pub fn handle_end_session(tx: &ConnectionSender, state: &AppState, user_id: &str) {
    match state.presence.activities.end(user_id) {
        Some(activity) => {
            if let Some(peer) = activity.peer_of(user_id) {
                state.fanout.emit(
                    peer,
                    "sessionEnded",
                    json!({ "activity_id": activity.id, "kind": activity.kind, "by": user_id }),
                );
            }
            tracing::debug!(activity_id = %activity.id, "Activity ended");
        }
        None => send_error(tx, "no active session"),
    }
}

/// Tell counterparts about everything a departed user left behind.
pub fn announce_departure(state: &AppState, user_id: &str, departure: &Departure) {
    if let Some(activity) = &departure.ended_activity {
        if let Some(peer) = activity.peer_of(user_id) {
            state.fanout.emit(
                peer,
                "sessionEnded",
                json!({
                    "activity_id": activity.id,
                    "kind": activity.kind,
                    "by": user_id,
                    "reason": "disconnected",
                }),
            );
        }
    }

    for invitation in &departure.cancelled_invitations {
        state.fanout.emit(
            &invitation.to_id,
            "inviteCancelled",
            json!({ "invitation_id": invitation.id, "from": user_id }),
        );
    }
}
