use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

use kindred_types::events::ChatPosted;

use crate::AppState;
use crate::notifications::run_broadcast;

/// How chat activity is announced to users who are not in the room.
#[derive(Debug, Clone)]
pub struct ChatNotifyConfig {
    /// Title on the resulting notifications.
    pub title: String,
    /// Room tag placed in notification metadata. When unset, the tag
    /// is the name of the room the message was actually posted in.
    pub room_tag: Option<String>,
}

impl Default for ChatNotifyConfig {
    fn default() -> Self {
        Self {
            title: "New Wellness Chat".to_string(),
            room_tag: None,
        }
    }
}

/// Consume bridge messages from room actors and turn each into a
/// broadcast that excludes the message's sender. Runs detached for the
/// life of the process; room actors never wait on it.
pub fn spawn_chat_bridge(
    state: AppState,
    mut rx: mpsc::UnboundedReceiver<ChatPosted>,
    config: ChatNotifyConfig,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("chat notification bridge started");
        while let Some(posted) = rx.recv().await {
            let room_tag = config
                .room_tag
                .clone()
                .unwrap_or_else(|| posted.room_id.clone());
            let metadata = json!({
                "roomId": room_tag,
                "messageId": posted.message.id,
            });
            let body = format!("{}: {}", posted.message.user_name, posted.message.content);

            run_broadcast(
                state.clone(),
                config.title.clone(),
                body,
                "chat".to_string(),
                Some(metadata),
                posted.message.user_id.clone(),
            )
            .await;
        }
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::sync::mpsc;
    use tokio::time::sleep;

    use kindred_db::Database;
    use kindred_gateway::hub::NotificationHub;
    use kindred_gateway::registry::RoomRegistry;
    use kindred_push::DisabledPush;
    use kindred_types::events::ChatPosted;
    use kindred_types::models::ChatMessage;

    use super::{ChatNotifyConfig, spawn_chat_bridge};
    use crate::AppStateInner;

    #[tokio::test]
    async fn bridge_notifies_everyone_but_the_sender() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        db.create_user("u1", "ana", None).unwrap();
        db.create_user("u2", "bo", None).unwrap();

        let (bridge_tx, bridge_rx) = mpsc::unbounded_channel();
        let state = Arc::new(AppStateInner {
            db: db.clone(),
            hub: NotificationHub::spawn(),
            push: Arc::new(DisabledPush),
            rooms: RoomRegistry::new(db.clone(), bridge_tx.clone()),
        });
        spawn_chat_bridge(state, bridge_rx, ChatNotifyConfig::default());

        bridge_tx
            .send(ChatPosted {
                room_id: "wellness".into(),
                message: ChatMessage {
                    id: "m1".into(),
                    room_id: "wellness".into(),
                    user_name: "ana".into(),
                    user_id: Some("u1".into()),
                    user_avatar: None,
                    content: "hi".into(),
                    created_at: 1,
                },
            })
            .unwrap();

        let mut rows = Vec::new();
        for _ in 0..100 {
            rows = db.notifications_for_user("u2", 50).unwrap();
            if !rows.is_empty() {
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].title, "New Wellness Chat");
        assert_eq!(rows[0].body, "ana: hi");
        assert_eq!(rows[0].kind, "chat");
        let metadata = rows[0].metadata.as_deref().unwrap();
        assert!(metadata.contains("\"roomId\":\"wellness\""));
        assert!(metadata.contains("\"messageId\":\"m1\""));

        // The sender was excluded from the fan-out.
        assert!(db.notifications_for_user("u1", 50).unwrap().is_empty());
    }
}
