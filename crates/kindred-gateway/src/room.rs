use std::collections::HashSet;
use std::sync::{Arc, Weak};

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};
use uuid::Uuid;

use kindred_db::Database;
use kindred_types::events::{ChatPosted, ClientEvent, RoomEvent};
use kindred_types::models::{ChatMessage, UserIdentity};

use crate::registry::RoomMap;

/// One live connection to a room. The `tx` end feeds the connection's
/// socket-writer task; a failed send means the socket side is gone.
pub(crate) struct Session {
    pub id: Uuid,
    pub tx: mpsc::UnboundedSender<String>,
    pub user: Option<UserIdentity>,
}

pub(crate) enum RoomCommand {
    Connect {
        session_id: Uuid,
        tx: mpsc::UnboundedSender<String>,
    },
    Inbound {
        session_id: Uuid,
        frame: String,
    },
    Disconnect {
        session_id: Uuid,
    },
}

struct Room {
    name: String,
    sessions: Vec<Session>,
    db: Arc<Database>,
    bridge: mpsc::UnboundedSender<ChatPosted>,
    /// High-water mark for server-assigned timestamps. History paging
    /// sorts by created_at, so it must never go backwards within a room.
    last_created_at: i64,
}

/// Room actor loop. All mutations of the session list happen here,
/// one command at a time, so no lock guards the list. The actor
/// retires once its session list empties; a room name costs a task and
/// a registry slot only while someone is connected.
pub(crate) async fn run(
    name: String,
    mut rx: mpsc::UnboundedReceiver<RoomCommand>,
    db: Arc<Database>,
    bridge: mpsc::UnboundedSender<ChatPosted>,
    registry: Weak<RoomMap>,
) {
    debug!(room = %name, "room actor started");
    let mut room = Room {
        name,
        sessions: Vec::new(),
        db,
        bridge,
        last_created_at: 0,
    };

    while let Some(cmd) = rx.recv().await {
        match cmd {
            RoomCommand::Connect { session_id, tx } => {
                room.sessions.push(Session {
                    id: session_id,
                    tx,
                    user: None,
                });
            }
            RoomCommand::Inbound { session_id, frame } => {
                room.handle_frame(session_id, frame);
            }
            RoomCommand::Disconnect { session_id } => {
                room.remove_session(session_id);
            }
        }

        if room.sessions.is_empty() {
            room.retire(&mut rx, &registry);
            break;
        }
    }

    debug!(room = %room.name, "room actor stopped");
}

impl Room {
    fn handle_frame(&mut self, session_id: Uuid, frame: String) {
        let event = match serde_json::from_str::<ClientEvent>(&frame) {
            Ok(event) => event,
            Err(e) => {
                // Bad frames are dropped; the connection stays open.
                warn!(room = %self.name, error = %e, "dropping malformed chat frame");
                return;
            }
        };

        match event {
            ClientEvent::Join { user } => {
                let Some(session) = self.sessions.iter_mut().find(|s| s.id == session_id) else {
                    return;
                };
                session.user = Some(user);
                self.broadcast_presence();
            }
            ClientEvent::TypingStart => {
                let Some(user) = self.session_user(session_id) else {
                    return;
                };
                self.broadcast(
                    &RoomEvent::TypingStart {
                        user_id: user.as_ref().map(|u| u.id.clone()),
                        user_name: user
                            .as_ref()
                            .and_then(|u| u.name.clone())
                            .unwrap_or_else(|| "Someone".to_string()),
                    },
                    Some(session_id),
                );
            }
            ClientEvent::TypingStop => {
                let Some(user) = self.session_user(session_id) else {
                    return;
                };
                self.broadcast(
                    &RoomEvent::TypingStop {
                        user_id: user.map(|u| u.id),
                    },
                    Some(session_id),
                );
            }
            ClientEvent::Message { content } => self.handle_message(session_id, content),
        }
    }

    fn handle_message(&mut self, session_id: Uuid, content: String) {
        let Some(user) = self.session_user(session_id) else {
            return;
        };

        // Server-assigned, non-decreasing within the room.
        let created_at = Utc::now().timestamp_millis().max(self.last_created_at);
        self.last_created_at = created_at;

        let message = ChatMessage {
            id: Uuid::new_v4().to_string(),
            room_id: self.name.clone(),
            user_name: user
                .as_ref()
                .map(|u| u.display_name())
                .unwrap_or_else(|| "Anonymous".to_string()),
            user_id: user.as_ref().map(|u| u.id.clone()),
            user_avatar: user.and_then(|u| u.avatar_url),
            content,
            created_at,
        };

        // Delivery first: persistence must never sit on the latency path.
        self.broadcast(
            &RoomEvent::NewMessage {
                message: message.clone(),
            },
            None,
        );

        let db = self.db.clone();
        let stored = message.clone();
        tokio::spawn(async move {
            match tokio::task::spawn_blocking(move || db.insert_chat_message(&stored)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("failed to persist chat message: {e}"),
                Err(e) => error!("chat persist task panicked: {e}"),
            }
        });

        if self
            .bridge
            .send(ChatPosted {
                room_id: self.name.clone(),
                message,
            })
            .is_err()
        {
            warn!(room = %self.name, "chat notification bridge is closed");
        }
    }

    fn remove_session(&mut self, session_id: Uuid) {
        let Some(idx) = self.sessions.iter().position(|s| s.id == session_id) else {
            return;
        };
        let session = self.sessions.remove(idx);
        if session.user.is_some() {
            self.broadcast_presence();
        }
    }

    /// Current identified users, deduplicated by id in connection order.
    fn broadcast_presence(&mut self) {
        let mut seen = HashSet::new();
        let users: Vec<UserIdentity> = self
            .sessions
            .iter()
            .filter_map(|s| s.user.clone())
            .filter(|u| seen.insert(u.id.clone()))
            .collect();

        self.broadcast(
            &RoomEvent::PresenceUpdate {
                count: users.len(),
                users,
            },
            None,
        );
    }

    /// One pass over the session list: deliver to everyone (minus the
    /// optional excluded sender) and evict any session whose channel is
    /// gone. Eviction as a side effect of sending is what keeps the
    /// list honest without heartbeats.
    fn broadcast(&mut self, event: &RoomEvent, exclude: Option<Uuid>) {
        let payload = match serde_json::to_string(event) {
            Ok(payload) => payload,
            Err(e) => {
                error!(room = %self.name, error = %e, "failed to serialize room event");
                return;
            }
        };

        let before = self.sessions.len();
        self.sessions.retain(|session| {
            if exclude == Some(session.id) {
                return true;
            }
            session.tx.send(payload.clone()).is_ok()
        });

        let evicted = before - self.sessions.len();
        if evicted > 0 {
            debug!(room = %self.name, evicted, "evicted dead sessions during broadcast");
        }
    }

    /// Take this actor out of service now that the room is empty. Runs
    /// entirely under the registry lock so no command can be addressed
    /// to a half-retired actor: the inbox is closed, then drained — a
    /// `Connect` that raced in is handed to a fresh actor installed
    /// under the same name before the lock is released. Without a
    /// queued `Connect` the map entry is simply removed.
    fn retire(&self, rx: &mut mpsc::UnboundedReceiver<RoomCommand>, registry: &Weak<RoomMap>) {
        let Some(map) = registry.upgrade() else {
            return;
        };
        let mut rooms = map.lock().expect("room registry lock poisoned");

        rx.close();
        let mut queued = Vec::new();
        while let Ok(cmd) = rx.try_recv() {
            queued.push(cmd);
        }

        if queued
            .iter()
            .any(|cmd| matches!(cmd, RoomCommand::Connect { .. }))
        {
            debug!(room = %self.name, "handing queued connects to a fresh room actor");
            let (tx, fresh_rx) = mpsc::unbounded_channel();
            for cmd in queued {
                let _ = tx.send(cmd);
            }
            rooms.insert(self.name.clone(), tx);
            tokio::spawn(run(
                self.name.clone(),
                fresh_rx,
                self.db.clone(),
                self.bridge.clone(),
                registry.clone(),
            ));
        } else {
            rooms.remove(&self.name);
        }
    }

    fn session_user(&self, session_id: Uuid) -> Option<Option<UserIdentity>> {
        self.sessions
            .iter()
            .find(|s| s.id == session_id)
            .map(|s| s.user.clone())
    }
}
