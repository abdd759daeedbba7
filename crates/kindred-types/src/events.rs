use serde::{Deserialize, Serialize};

use crate::models::{ChatMessage, UserIdentity};

/// Frames sent FROM the client TO a chat room over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Attach a user identity to this session
    Join { user: UserIdentity },

    /// The user started typing
    TypingStart,

    /// The user stopped typing
    TypingStop,

    /// Post a message to the room
    Message { content: String },
}

/// Frames sent FROM a chat room TO its connected clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RoomEvent {
    /// Deduplicated set of identified users currently in the room
    PresenceUpdate {
        count: usize,
        users: Vec<UserIdentity>,
    },

    /// Someone else started typing
    TypingStart {
        #[serde(rename = "userId")]
        user_id: Option<String>,
        #[serde(rename = "userName")]
        user_name: String,
    },

    /// Someone else stopped typing
    TypingStop {
        #[serde(rename = "userId")]
        user_id: Option<String>,
    },

    /// A message was posted (sent to every session, sender included)
    NewMessage { message: ChatMessage },
}

/// Bridge message from a room actor to the notification fan-out worker,
/// emitted fire-and-forget after each posted chat message.
#[derive(Debug, Clone)]
pub struct ChatPosted {
    pub room_id: String,
    pub message: ChatMessage,
}
