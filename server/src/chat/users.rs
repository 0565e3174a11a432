//! User registration and push token management.
//!
//! Profiles are deliberately thin: an id, a display name used in push
//! titles, and an optional avatar URL.

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::jwt::{issue_access_token, ACCESS_TOKEN_TTL_SECS};
use crate::auth::middleware::Claims;
use crate::db::models::UserProfile;
use crate::error::ChatError;
use crate::state::AppState;

const MAX_NAME_LENGTH: usize = 64;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    #[serde(default)]
    pub profile_image: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user: UserProfile,
    pub access_token: String,
}

#[derive(Debug, Deserialize)]
pub struct PushTokenRequest {
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct PushTokenResponse {
    pub status: bool,
    /// False when the request did not change anything
    pub changed: bool,
}

/// POST /api/users
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), ChatError> {
    let name = req.name.trim();
    if name.is_empty() || name.chars().count() > MAX_NAME_LENGTH {
        return Err(ChatError::Validation(format!(
            "name must be 1-{} characters",
            MAX_NAME_LENGTH
        )));
    }

    let id = Uuid::now_v7().to_string();
    let user = state
        .store
        .create_user(&id, name, req.profile_image.as_deref())
        .await?;
    let access_token = issue_access_token(&state.jwt_secret, &user.id, &user.name, ACCESS_TOKEN_TTL_SECS)?;

    tracing::info!(user_id = %user.id, "User registered");
    Ok((StatusCode::CREATED, Json(RegisterResponse { user, access_token })))
}

/// GET /api/users/me
pub async fn get_me(
    State(state): State<AppState>,
    claims: Claims,
) -> Result<Json<UserProfile>, ChatError> {
    state
        .store
        .find_user(&claims.sub)
        .await?
        .map(Json)
        .ok_or(ChatError::NotFound("user"))
}

/// POST /api/users/push-tokens
/// Tokens are stored as given; malformed ones are skipped at dispatch time.
pub async fn register_push_token(
    State(state): State<AppState>,
    claims: Claims,
    Json(req): Json<PushTokenRequest>,
) -> Result<Json<PushTokenResponse>, ChatError> {
    let token = req.token.trim();
    if token.is_empty() {
        return Err(ChatError::Validation("token is required".into()));
    }
    let changed = state.store.add_push_token(&claims.sub, token).await?;
    tracing::debug!(user_id = %claims.sub, changed, "Push token registered");
    Ok(Json(PushTokenResponse { status: true, changed }))
}

/// DELETE /api/users/push-tokens
pub async fn remove_push_token(
    State(state): State<AppState>,
    claims: Claims,
    Json(req): Json<PushTokenRequest>,
) -> Result<Json<PushTokenResponse>, ChatError> {
    let changed = state.store.remove_push_token(&claims.sub, req.token.trim()).await?;
    Ok(Json(PushTokenResponse { status: true, changed }))
}
