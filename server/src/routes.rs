use axum::{middleware, routing, Router};

use crate::auth::middleware::JwtSecret;
use crate::chat::{conversations, messages, presence, users};
use crate::state::AppState;
use crate::ws::handler as ws_handler;

/// Inject the JWT secret into request extensions so the Claims extractor can find it.
async fn inject_jwt_secret(
    axum::extract::State(state): axum::extract::State<AppState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: middleware::Next,
) -> axum::response::Response {
    req.extensions_mut()
        .insert(JwtSecret(state.jwt_secret.clone()));
    next.run(req).await
}

/// Build the full axum Router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    // Public routes (no auth required)
    let public_routes = Router::new().route("/api/users", routing::post(users::register));

    // Authenticated routes (JWT required, Claims extractor validates token)
    let user_routes = Router::new()
        .route("/api/users/me", routing::get(users::get_me))
        .route(
            "/api/users/push-tokens",
            routing::post(users::register_push_token).delete(users::remove_push_token),
        )
        .route("/api/presence/{user_id}", routing::get(presence::get_presence));

    let chat_routes = Router::new()
        .route("/api/chat/conversations", routing::get(conversations::list_conversations))
        .route("/api/chat/messages", routing::post(messages::send_message))
        .route(
            "/api/chat/messages/{id}",
            routing::get(messages::get_history).delete(messages::delete_message),
        )
        .route("/api/chat/read/{user_id}", routing::post(messages::mark_read));

    // WebSocket endpoint (auth via query param, not JWT header)
    let ws_routes = Router::new().route("/ws", routing::get(ws_handler::ws_upgrade));

    let health = Router::new().route("/health", routing::get(health_check));

    Router::new()
        .merge(public_routes)
        .merge(user_routes)
        .merge(chat_routes)
        .merge(ws_routes)
        .merge(health)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            inject_jwt_secret,
        ))
        .with_state(state)
}

/// Basic health check endpoint
async fn health_check() -> &'static str {
    "ok"
}
