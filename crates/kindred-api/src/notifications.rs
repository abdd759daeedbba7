use axum::Json;
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use kindred_gateway::connection;
use kindred_types::api::{
    AckResponse, BroadcastRequest, BroadcastResponse, MarkReadRequest, RegisterTokenRequest,
    SendNotificationRequest, SendNotificationResponse,
};
use kindred_types::models::Notification;

use crate::error::ApiError;
use crate::{AppState, AppStateInner};

const HISTORY_PAGE: u32 = 50;

#[derive(Debug, Deserialize)]
pub struct UserIdQuery {
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
}

/// `GET /notifications/ws?userId=` — upgrade and register the session
/// with the notification hub. Rejected without a userId: anonymous
/// sessions have no delivery address.
pub async fn ws_notifications(
    State(state): State<AppState>,
    Query(query): Query<UserIdQuery>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = query
        .user_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::Validation("Missing userId".to_string()))?;

    let hub = state.hub.clone();
    Ok(ws.on_upgrade(move |socket| connection::handle_notify_socket(socket, hub, user_id)))
}

/// `POST /notifications/send` — persist, then deliver live and/or push.
pub async fn send(
    State(state): State<AppState>,
    Json(req): Json<SendNotificationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (Some(user_id), Some(title), Some(body)) = (req.user_id, req.title, req.body) else {
        return Err(ApiError::Validation("Missing required fields".to_string()));
    };

    let notification = create_and_dispatch(
        &state,
        user_id,
        title,
        body,
        req.kind.unwrap_or_else(|| "system".to_string()),
        req.metadata,
    )
    .await?;

    Ok(Json(SendNotificationResponse {
        success: true,
        notification,
    }))
}

/// `POST /notifications/broadcast` — acknowledged immediately; the
/// fan-out runs as a detached task with no aggregate failure reporting
/// beyond a logged count.
pub async fn broadcast(
    State(state): State<AppState>,
    Json(req): Json<BroadcastRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (Some(title), Some(body)) = (req.title, req.body) else {
        return Err(ApiError::Validation("Missing required fields".to_string()));
    };

    tokio::spawn(run_broadcast(
        state,
        title,
        body,
        req.kind.unwrap_or_else(|| "system".to_string()),
        req.metadata,
        req.exclude_user_id,
    ));

    Ok(Json(BroadcastResponse {
        success: true,
        message: "Broadcast started".to_string(),
    }))
}

/// `GET /notifications/history?userId=` — most recent 50, newest first.
pub async fn history(
    State(state): State<AppState>,
    Query(query): Query<UserIdQuery>,
) -> Result<Json<Vec<Notification>>, ApiError> {
    let user_id = query
        .user_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::Validation("Missing userId".to_string()))?;

    let db = state.db.clone();
    let rows =
        tokio::task::spawn_blocking(move || db.notifications_for_user(&user_id, HISTORY_PAGE))
            .await
            .map_err(|e| anyhow::anyhow!("history task panicked: {e}"))??;

    Ok(Json(rows))
}

/// `POST /notifications/fcm/register` — last-write-wins token upsert.
pub async fn register_token(
    State(state): State<AppState>,
    Json(req): Json<RegisterTokenRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (Some(user_id), Some(token)) = (req.user_id, req.token) else {
        return Err(ApiError::Validation("Missing required fields".to_string()));
    };

    let db = state.db.clone();
    let now = Utc::now().timestamp_millis();
    tokio::task::spawn_blocking(move || db.upsert_push_token(&user_id, &token, now))
        .await
        .map_err(|e| anyhow::anyhow!("token upsert task panicked: {e}"))??;

    Ok(Json(AckResponse { success: true }))
}

/// `POST /notifications/read` — idempotent; re-marking a read
/// notification is a no-op success.
pub async fn mark_read(
    State(state): State<AppState>,
    Json(req): Json<MarkReadRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let Some(notification_id) = req.notification_id else {
        return Err(ApiError::Validation("Missing notificationId".to_string()));
    };

    let db = state.db.clone();
    tokio::task::spawn_blocking(move || db.mark_notification_read(&notification_id))
        .await
        .map_err(|e| anyhow::anyhow!("mark-read task panicked: {e}"))??;

    Ok(Json(AckResponse { success: true }))
}

/// One fan-out unit: persist the row, try live delivery, fall back to
/// push only when the user had no open socket. Persistence failure is
/// the only error surfaced to callers; both delivery channels are
/// fire-and-forget.
pub(crate) async fn create_and_dispatch(
    state: &AppStateInner,
    user_id: String,
    title: String,
    body: String,
    kind: String,
    metadata: Option<Value>,
) -> Result<Notification, ApiError> {
    let notification = Notification::new(
        user_id,
        title,
        body,
        kind,
        metadata.map(|m| m.to_string()),
    );

    let db = state.db.clone();
    let row = notification.clone();
    tokio::task::spawn_blocking(move || db.insert_notification(&row))
        .await
        .map_err(|e| anyhow::anyhow!("notification persist task panicked: {e}"))??;

    let delivered_live = state.hub.deliver(notification.clone()).await;

    if !delivered_live {
        let db = state.db.clone();
        let push = state.push.clone();
        let pending = notification.clone();
        tokio::spawn(async move {
            let user_id = pending.user_id.clone();
            let token = match tokio::task::spawn_blocking(move || db.push_token(&user_id)).await {
                Ok(Ok(token)) => token,
                Ok(Err(e)) => {
                    warn!("push token lookup failed for {}: {e}", pending.user_id);
                    None
                }
                Err(e) => {
                    warn!("push token lookup task panicked: {e}");
                    None
                }
            };

            if let Some(token) = token {
                if let Err(e) = push.deliver(&token, &pending).await {
                    warn!("push dispatch failed for {}: {e:#}", pending.user_id);
                }
            }
        });
    }

    Ok(notification)
}

/// Fan a logical notification out to every known user, concurrently and
/// unordered. Primary target source is the user directory; if that
/// read fails, fall back to the set of push token holders.
pub(crate) async fn run_broadcast(
    state: AppState,
    title: String,
    body: String,
    kind: String,
    metadata: Option<Value>,
    exclude_user_id: Option<String>,
) {
    let Some(user_ids) = enumerate_targets(&state).await else {
        return;
    };

    let targets: Vec<String> = user_ids
        .into_iter()
        .filter(|id| exclude_user_id.as_deref() != Some(id.as_str()))
        .collect();
    let total = targets.len();

    let results = futures_util::future::join_all(targets.into_iter().map(|user_id| {
        let state = state.clone();
        let title = title.clone();
        let body = body.clone();
        let kind = kind.clone();
        let metadata = metadata.clone();
        async move {
            create_and_dispatch(&state, user_id.clone(), title, body, kind, metadata)
                .await
                .map_err(|e| {
                    warn!("broadcast unit failed for {user_id}: {e}");
                })
        }
    }))
    .await;

    let sent = results.iter().filter(|r| r.is_ok()).count();
    info!(sent, total, "notification broadcast fan-out complete");
}

async fn enumerate_targets(state: &AppState) -> Option<Vec<String>> {
    let db = state.db.clone();
    match tokio::task::spawn_blocking(move || db.all_user_ids()).await {
        Ok(Ok(ids)) => return Some(ids),
        Ok(Err(e)) => warn!("user directory read failed, trying push token holders: {e}"),
        Err(e) => warn!("user directory task panicked: {e}"),
    }

    let db = state.db.clone();
    match tokio::task::spawn_blocking(move || db.push_token_user_ids()).await {
        Ok(Ok(ids)) => Some(ids),
        Ok(Err(e)) => {
            warn!("broadcast aborted, no enumeration source: {e}");
            None
        }
        Err(e) => {
            warn!("push token enumeration task panicked: {e}");
            None
        }
    }
}
