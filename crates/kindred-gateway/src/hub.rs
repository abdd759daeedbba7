use std::collections::HashMap;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error};
use uuid::Uuid;

use kindred_types::models::Notification;

enum HubCommand {
    Register {
        user_id: String,
        session_id: Uuid,
        tx: mpsc::UnboundedSender<String>,
    },
    Unregister {
        user_id: String,
        session_id: Uuid,
    },
    Deliver {
        notification: Notification,
        reply: oneshot::Sender<bool>,
    },
}

/// Handle to the singleton notification actor. The actor owns the
/// per-user session registry; everything goes through its inbox.
#[derive(Clone)]
pub struct NotificationHub {
    tx: mpsc::UnboundedSender<HubCommand>,
}

impl NotificationHub {
    pub fn spawn() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run(rx));
        Self { tx }
    }

    pub fn register(&self, user_id: String, session_id: Uuid, tx: mpsc::UnboundedSender<String>) {
        let _ = self.tx.send(HubCommand::Register {
            user_id,
            session_id,
            tx,
        });
    }

    pub fn unregister(&self, user_id: String, session_id: Uuid) {
        let _ = self.tx.send(HubCommand::Unregister {
            user_id,
            session_id,
        });
    }

    /// Push a notification to every open session of its target user.
    /// Returns true iff the user had at least one live session — the
    /// online signal the gateway uses to decide on push fallback.
    pub async fn deliver(&self, notification: Notification) -> bool {
        let (reply, rx) = oneshot::channel();
        if self
            .tx
            .send(HubCommand::Deliver {
                notification,
                reply,
            })
            .is_err()
        {
            error!("notification hub is not running");
            return false;
        }
        rx.await.unwrap_or(false)
    }
}

async fn run(mut rx: mpsc::UnboundedReceiver<HubCommand>) {
    // user id -> open sessions. An entry is removed the moment its
    // session list empties; no empty entries linger.
    let mut sessions: HashMap<String, Vec<(Uuid, mpsc::UnboundedSender<String>)>> = HashMap::new();

    while let Some(cmd) = rx.recv().await {
        match cmd {
            HubCommand::Register {
                user_id,
                session_id,
                tx,
            } => {
                debug!(%user_id, %session_id, "notification session registered");
                sessions.entry(user_id).or_default().push((session_id, tx));
            }
            HubCommand::Unregister {
                user_id,
                session_id,
            } => {
                if let Some(set) = sessions.get_mut(&user_id) {
                    set.retain(|(id, _)| *id != session_id);
                    if set.is_empty() {
                        sessions.remove(&user_id);
                    }
                }
            }
            HubCommand::Deliver {
                notification,
                reply,
            } => {
                let delivered = deliver(&mut sessions, &notification);
                let _ = reply.send(delivered);
            }
        }
    }
}

fn deliver(
    sessions: &mut HashMap<String, Vec<(Uuid, mpsc::UnboundedSender<String>)>>,
    notification: &Notification,
) -> bool {
    let Some(set) = sessions.get_mut(&notification.user_id) else {
        return false;
    };

    let payload = match serde_json::to_string(notification) {
        Ok(payload) => payload,
        Err(e) => {
            error!("failed to serialize notification: {e}");
            return false;
        }
    };

    // Same self-healing pass as the room broadcast: a failed send
    // evicts the session. The user still counts as online for this
    // delivery; they had a session when it started.
    set.retain(|(_, tx)| tx.send(payload.clone()).is_ok());
    if set.is_empty() {
        sessions.remove(&notification.user_id);
    }
    true
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::mpsc;
    use tokio::time::timeout;
    use uuid::Uuid;

    use kindred_types::models::Notification;

    use super::NotificationHub;

    fn note(user_id: &str) -> Notification {
        Notification::new(
            user_id.into(),
            "T".into(),
            "B".into(),
            "system".into(),
            None,
        )
    }

    #[tokio::test]
    async fn offline_user_reports_undelivered() {
        let hub = NotificationHub::spawn();
        assert!(!hub.deliver(note("u1")).await);
    }

    #[tokio::test]
    async fn online_user_receives_the_serialized_notification() {
        let hub = NotificationHub::spawn();
        let (tx, mut rx) = mpsc::unbounded_channel();
        hub.register("u1".into(), Uuid::new_v4(), tx);

        let n = note("u1");
        assert!(hub.deliver(n.clone()).await);

        let payload = timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        let received: Notification = serde_json::from_str(&payload).unwrap();
        assert_eq!(received, n);
    }

    #[tokio::test]
    async fn every_device_of_a_user_is_reached() {
        let hub = NotificationHub::spawn();
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        hub.register("u1".into(), Uuid::new_v4(), tx_a);
        hub.register("u1".into(), Uuid::new_v4(), tx_b);

        assert!(hub.deliver(note("u1")).await);
        assert!(timeout(Duration::from_secs(1), rx_a.recv()).await.unwrap().is_some());
        assert!(timeout(Duration::from_secs(1), rx_b.recv()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn delivery_targets_only_the_addressed_user() {
        let hub = NotificationHub::spawn();
        let (tx, mut rx) = mpsc::unbounded_channel();
        hub.register("u2".into(), Uuid::new_v4(), tx);

        assert!(!hub.deliver(note("u1")).await);
        assert!(
            timeout(Duration::from_millis(100), rx.recv())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn unregistering_the_last_session_marks_the_user_offline() {
        let hub = NotificationHub::spawn();
        let session_id = Uuid::new_v4();
        let (tx, _rx) = mpsc::unbounded_channel();
        hub.register("u1".into(), session_id, tx);
        assert!(hub.deliver(note("u1")).await);

        hub.unregister("u1".into(), session_id);
        assert!(!hub.deliver(note("u1")).await);
    }

    #[tokio::test]
    async fn dead_sessions_are_evicted_on_delivery() {
        let hub = NotificationHub::spawn();
        let (tx, rx) = mpsc::unbounded_channel();
        hub.register("u1".into(), Uuid::new_v4(), tx);
        drop(rx);

        // The user had a session when this delivery started.
        assert!(hub.deliver(note("u1")).await);
        // The failed send evicted it, so the user is now offline.
        assert!(!hub.deliver(note("u1")).await);
    }
}
