//! REST endpoints for sending, reading and hiding direct messages.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::auth::middleware::Claims;
use crate::db::models::Message;
use crate::delivery::{Attachment, OutgoingMessage};
use crate::error::ChatError;
use crate::state::AppState;

/// Reference to a file already stored by the upload service.
#[derive(Debug, Deserialize)]
pub struct FileRef {
    /// Name under which the upload service stored the file
    pub stored_name: String,
    /// Name the file had on the sender's device
    pub original_name: String,
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub receiver_id: String,
    #[serde(rename = "type")]
    pub message_type: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub file: Option<FileRef>,
}

#[derive(Debug, Serialize)]
pub struct SendMessageResponse {
    pub status: bool,
    pub message: Message,
    /// Whether the receiver had a live session the message was queued on
    pub delivered_live: bool,
}

#[derive(Debug, Serialize)]
pub struct MarkReadResponse {
    pub status: bool,
    pub updated: usize,
}

fn file_url(base_url: &str, file: &FileRef) -> Result<String, ChatError> {
    let name = file.stored_name.trim();
    if name.is_empty() || name.contains('/') || name.contains("..") {
        return Err(ChatError::Validation("invalid stored file name".into()));
    }
    Ok(format!("{}/uploads/{}", base_url, name))
}

/// POST /api/chat/messages
/// Persists, then delivers live and/or by push. Push runs in the background
/// and never affects the response.
pub async fn send_message(
    State(state): State<AppState>,
    claims: Claims,
    Json(body): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<SendMessageResponse>), ChatError> {
    let attachment = match &body.file {
        Some(file) => Some(Attachment {
            url: file_url(&state.public_base_url, file)?,
            original_name: file.original_name.clone(),
        }),
        None => None,
    };

    let outgoing = OutgoingMessage {
        receiver_id: body.receiver_id,
        message_type: body.message_type,
        text: body.message,
        attachment,
    };

    let (message, outcome) = state.coordinator.send_message(&claims.sub, outgoing).await?;

    Ok((
        StatusCode::CREATED,
        Json(SendMessageResponse {
            status: true,
            message,
            delivered_live: outcome.live,
        }),
    ))
}

/// GET /api/chat/messages/{partner_id}
/// Oldest first, without messages the caller has hidden. Does not mark anything read.
pub async fn get_history(
    State(state): State<AppState>,
    claims: Claims,
    Path(partner_id): Path<String>,
) -> Result<Json<Vec<Message>>, ChatError> {
    let messages = state
        .store
        .find_messages(&claims.sub, &partner_id, &claims.sub)
        .await?;
    Ok(Json(messages))
}

/// POST /api/chat/read/{user_id}
/// Marks everything `user_id` sent the caller as read and tells the sender.
pub async fn mark_read(
    State(state): State<AppState>,
    claims: Claims,
    Path(partner_id): Path<String>,
) -> Result<Json<MarkReadResponse>, ChatError> {
    let updated = state.store.mark_read(&claims.sub, &partner_id).await?;
    if updated > 0 {
        state.fanout.emit(
            &partner_id,
            "messagesRead",
            json!({ "reader_id": claims.sub, "count": updated }),
        );
    }
    Ok(Json(MarkReadResponse { status: true, updated }))
}

/// DELETE /api/chat/messages/{message_id}
/// Hides the message for the caller only.
pub async fn delete_message(
    State(state): State<AppState>,
    claims: Claims,
    Path(message_id): Path<String>,
) -> Result<StatusCode, ChatError> {
    state.store.delete_for(&claims.sub, &message_id).await?;
    tracing::debug!(user_id = %claims.sub, message_id = %message_id, "Message hidden");
    Ok(StatusCode::NO_CONTENT)
}
