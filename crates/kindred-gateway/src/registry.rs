use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use kindred_db::Database;
use kindred_types::events::ChatPosted;

use crate::room::{self, RoomCommand};

/// Shared room-name -> actor-inbox map. Room actors hold a weak
/// reference so they can take themselves out of it when they retire.
pub(crate) type RoomMap = Mutex<HashMap<String, mpsc::UnboundedSender<RoomCommand>>>;

/// Addresses room actors by name. Actors are spawned lazily on first
/// use and retire once their session list empties, releasing their
/// task and map entry; the next command for that name spawns a fresh
/// instance with empty state. Sessions are non-durable by design.
#[derive(Clone)]
pub struct RoomRegistry {
    rooms: Arc<RoomMap>,
    db: Arc<Database>,
    bridge: mpsc::UnboundedSender<ChatPosted>,
}

impl RoomRegistry {
    pub fn new(db: Arc<Database>, bridge: mpsc::UnboundedSender<ChatPosted>) -> Self {
        Self {
            rooms: Arc::new(Mutex::new(HashMap::new())),
            db,
            bridge,
        }
    }

    /// Register a new session with a room.
    pub fn connect(&self, room: &str, session_id: Uuid, tx: mpsc::UnboundedSender<String>) {
        self.send(room, RoomCommand::Connect { session_id, tx });
    }

    /// Forward a raw inbound frame to the session's room.
    pub fn inbound(&self, room: &str, session_id: Uuid, frame: String) {
        self.send(room, RoomCommand::Inbound { session_id, frame });
    }

    pub fn disconnect(&self, room: &str, session_id: Uuid) {
        self.send(room, RoomCommand::Disconnect { session_id });
    }

    /// Deliver a command to the room's current actor. A send can fail
    /// when it races the actor's retirement; evict the stale handle and
    /// retry against a fresh spawn. A freshly spawned actor cannot
    /// retire before processing at least one command, so the loop
    /// terminates. Commands addressed to sessions the new actor does
    /// not know are ignored by it.
    fn send(&self, room: &str, mut cmd: RoomCommand) {
        loop {
            let handle = self.resolve(room);
            match handle.send(cmd) {
                Ok(()) => return,
                Err(mpsc::error::SendError(returned)) => {
                    cmd = returned;
                    self.evict_closed(room);
                }
            }
        }
    }

    fn resolve(&self, room: &str) -> mpsc::UnboundedSender<RoomCommand> {
        let mut rooms = self.rooms.lock().expect("room registry lock poisoned");
        match rooms.get(room) {
            Some(handle) if !handle.is_closed() => handle.clone(),
            _ => {
                debug!(%room, "spawning room actor");
                let (tx, rx) = mpsc::unbounded_channel();
                tokio::spawn(room::run(
                    room.to_string(),
                    rx,
                    self.db.clone(),
                    self.bridge.clone(),
                    Arc::downgrade(&self.rooms),
                ));
                rooms.insert(room.to_string(), tx.clone());
                tx
            }
        }
    }

    fn evict_closed(&self, room: &str) {
        let mut rooms = self.rooms.lock().expect("room registry lock poisoned");
        if let Some(handle) = rooms.get(room) {
            if handle.is_closed() {
                rooms.remove(room);
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn is_resident(&self, room: &str) -> bool {
        self.rooms
            .lock()
            .expect("room registry lock poisoned")
            .contains_key(room)
    }
}
