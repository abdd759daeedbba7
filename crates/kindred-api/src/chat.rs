use axum::Json;
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::response::IntoResponse;

use kindred_gateway::connection;
use kindred_types::models::ChatMessage;

use crate::AppState;
use crate::error::ApiError;

const HISTORY_PAGE: u32 = 50;

/// `GET /room/{room}` — upgrade into the room actor addressed by name.
pub async fn ws_chat(
    State(state): State<AppState>,
    Path(room): Path<String>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let registry = state.rooms.clone();
    ws.on_upgrade(move |socket| connection::handle_chat_socket(socket, registry, room))
}

/// `GET /room/{room}/history` — the most recent 50 messages, oldest
/// first. A pure read; the room actor is never consulted.
pub async fn history(
    State(state): State<AppState>,
    Path(room): Path<String>,
) -> Result<Json<Vec<ChatMessage>>, ApiError> {
    let db = state.db.clone();
    let mut page = tokio::task::spawn_blocking(move || db.recent_chat_messages(&room, HISTORY_PAGE))
        .await
        .map_err(|e| anyhow::anyhow!("history task panicked: {e}"))??;

    // Stored page is newest-first; clients want chronological order.
    page.reverse();
    Ok(Json(page))
}
