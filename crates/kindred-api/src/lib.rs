pub mod bridge;
pub mod chat;
pub mod error;
pub mod notifications;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};

use kindred_db::Database;
use kindred_gateway::hub::NotificationHub;
use kindred_gateway::registry::RoomRegistry;
use kindred_push::PushGateway;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub hub: NotificationHub,
    pub push: Arc<dyn PushGateway>,
    pub rooms: RoomRegistry,
}

pub type AppState = Arc<AppStateInner>;

/// All HTTP and WebSocket routes. Middleware layers (CORS, tracing)
/// are applied by the server binary.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/room/{room}", get(chat::ws_chat))
        .route("/room/{room}/history", get(chat::history))
        .route("/notifications/ws", get(notifications::ws_notifications))
        .route("/notifications/send", post(notifications::send))
        .route("/notifications/broadcast", post(notifications::broadcast))
        .route("/notifications/history", get(notifications::history))
        .route(
            "/notifications/fcm/register",
            post(notifications::register_token),
        )
        .route("/notifications/read", post(notifications::mark_read))
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}
