use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use serde::Deserialize;

use crate::auth::jwt;
use crate::state::AppState;
use crate::ws::actor;

/// Query parameters for WebSocket connection. Auth is via ?token=JWT.
#[derive(Debug, Deserialize)]
pub struct WsAuthQuery {
    pub token: String,
}

/// 4001 = token expired, 4002 = token invalid
pub const CLOSE_TOKEN_EXPIRED: u16 = 4001;
pub const CLOSE_TOKEN_INVALID: u16 = 4002;

/// GET /ws?token=JWT
/// On auth failure, upgrades then immediately closes with the matching close code.
/// On success, runs an actor for the connection.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    Query(params): Query<WsAuthQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    match jwt::validate_access_token(&state.jwt_secret, &params.token) {
        Ok(claims) => {
            tracing::info!(user_id = %claims.sub, "WebSocket connection authenticated");
            ws.on_upgrade(move |socket| actor::run_connection(socket, state, claims.sub))
        }
        Err(err) => {
            let (close_code, reason) = match err.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => (CLOSE_TOKEN_EXPIRED, "Token expired"),
                _ => (CLOSE_TOKEN_INVALID, "Token invalid"),
            };

            tracing::warn!(close_code = close_code, reason = reason, "WebSocket auth failed");

            ws.on_upgrade(move |mut socket| async move {
                let close_frame = CloseFrame {
                    code: close_code,
                    reason: reason.into(),
                };
                let _ = socket.send(Message::Close(Some(close_frame))).await;
            })
        }
    }
}
