use axum::{extract::State, Json};

use crate::auth::middleware::Claims;
use crate::db::models::ConversationSummary;
use crate::error::ChatError;
use crate::state::AppState;

/// GET /api/chat/conversations
/// One entry per partner, most recent conversation first.
pub async fn list_conversations(
    State(state): State<AppState>,
    claims: Claims,
) -> Result<Json<Vec<ConversationSummary>>, ChatError> {
    let conversations = state.store.list_conversations(&claims.sub).await?;
    Ok(Json(conversations))
}
