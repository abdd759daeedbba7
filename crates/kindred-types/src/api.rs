use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::Notification;

/// Body of `POST /notifications/send`. All fields are optional at the
/// parse level so missing ones surface as a 400, not a deserialization
/// failure.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendNotificationRequest {
    pub user_id: Option<String>,
    pub title: Option<String>,
    pub body: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SendNotificationResponse {
    pub success: bool,
    pub notification: Notification,
}

/// Body of `POST /notifications/broadcast`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastRequest {
    pub title: Option<String>,
    pub body: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub metadata: Option<Value>,
    /// Skip this user when fanning out (set by the chat bridge so a
    /// sender is not notified about their own message).
    pub exclude_user_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BroadcastResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterTokenRequest {
    pub user_id: Option<String>,
    pub token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkReadRequest {
    pub notification_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AckResponse {
    pub success: bool,
}
