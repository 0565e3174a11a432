//! Presence is polled: there are no online/offline broadcasts.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;

use crate::auth::middleware::Claims;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct PresenceResponse {
    pub user_id: String,
    pub online: bool,
}

/// GET /api/presence/{user_id}
pub async fn get_presence(
    State(state): State<AppState>,
    _claims: Claims,
    Path(user_id): Path<String>,
) -> Json<PresenceResponse> {
    let online = state.presence.sessions.is_online(&user_id);
    Json(PresenceResponse { user_id, online })
}
