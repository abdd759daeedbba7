use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::info;
use uuid::Uuid;

use crate::hub::NotificationHub;
use crate::registry::RoomRegistry;

/// Drive one chat WebSocket. The socket never touches room state
/// directly: inbound frames go to the room actor's inbox, outbound
/// events arrive over the session channel registered with it.
pub async fn handle_chat_socket(socket: WebSocket, registry: RoomRegistry, room: String) {
    let session_id = Uuid::new_v4();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    registry.connect(&room, session_id, tx);

    info!(%room, %session_id, "chat session connected");

    let (mut sender, mut receiver) = socket.split();

    let mut send_task = tokio::spawn(async move {
        while let Some(payload) = rx.recv().await {
            if sender.send(Message::Text(payload.into())).await.is_err() {
                break;
            }
        }
    });

    let recv_registry = registry.clone();
    let recv_room = room.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    recv_registry.inbound(&recv_room, session_id, text.to_string());
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    registry.disconnect(&room, session_id);
    info!(%room, %session_id, "chat session disconnected");
}

/// Drive one notification WebSocket. Outbound only — inbound frames
/// other than close are ignored.
pub async fn handle_notify_socket(socket: WebSocket, hub: NotificationHub, user_id: String) {
    let session_id = Uuid::new_v4();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    hub.register(user_id.clone(), session_id, tx);

    info!(%user_id, %session_id, "notification session connected");

    let (mut sender, mut receiver) = socket.split();

    let mut send_task = tokio::spawn(async move {
        while let Some(payload) = rx.recv().await {
            if sender.send(Message::Text(payload.into())).await.is_err() {
                break;
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Close(_) = msg {
                break;
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    hub.unregister(user_id.clone(), session_id);
    info!(%user_id, %session_id, "notification session disconnected");
}
