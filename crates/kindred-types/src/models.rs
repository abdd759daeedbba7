use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// User descriptor attached to a chat session by a `join` event.
/// Field names match the mobile client's wire format.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserIdentity {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default, rename = "avatarUrl")]
    pub avatar_url: Option<String>,
}

impl UserIdentity {
    /// Display name used on persisted messages: name, then alias,
    /// then "Anonymous".
    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .or_else(|| self.alias.clone())
            .unwrap_or_else(|| "Anonymous".to_string())
    }
}

/// A persisted chat message. Serialized with the same snake_case keys
/// the table columns use, on the wire and in history responses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub id: String,
    pub room_id: String,
    pub user_name: String,
    pub user_id: Option<String>,
    pub user_avatar: Option<String>,
    pub content: String,
    /// Server-assigned epoch milliseconds. Client timestamps are never trusted.
    pub created_at: i64,
}

/// A persisted notification, one row per target user per logical send.
/// Wire format is camelCase; `metadata` carries a pre-serialized JSON
/// string when present.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub body: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub metadata: Option<String>,
    pub created_at: i64,
    pub is_read: bool,
}

impl Notification {
    pub fn new(
        user_id: String,
        title: String,
        body: String,
        kind: String,
        metadata: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id,
            title,
            body,
            kind,
            metadata,
            created_at: Utc::now().timestamp_millis(),
            is_read: false,
        }
    }
}
