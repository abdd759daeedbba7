use crate::Database;
use anyhow::Result;
use rusqlite::OptionalExtension;

use kindred_types::models::{ChatMessage, Notification};

impl Database {
    // -- Chat messages --

    pub fn insert_chat_message(&self, msg: &ChatMessage) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO chat_messages (id, room_id, user_name, user_id, user_avatar, content, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    msg.id,
                    msg.room_id,
                    msg.user_name,
                    msg.user_id,
                    msg.user_avatar,
                    msg.content,
                    msg.created_at,
                ],
            )?;
            Ok(())
        })
    }

    /// Most recent messages for a room, newest first. Callers reverse
    /// the page for chronological delivery.
    pub fn recent_chat_messages(&self, room_id: &str, limit: u32) -> Result<Vec<ChatMessage>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, room_id, user_name, user_id, user_avatar, content, created_at
                 FROM chat_messages WHERE room_id = ?1
                 ORDER BY created_at DESC LIMIT ?2",
            )?;
            let rows = stmt
                .query_map(rusqlite::params![room_id, limit], |row| {
                    Ok(ChatMessage {
                        id: row.get(0)?,
                        room_id: row.get(1)?,
                        user_name: row.get(2)?,
                        user_id: row.get(3)?,
                        user_avatar: row.get(4)?,
                        content: row.get(5)?,
                        created_at: row.get(6)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Notifications --

    pub fn insert_notification(&self, n: &Notification) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO notifications (id, user_id, title, body, type, metadata, created_at, is_read)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    n.id,
                    n.user_id,
                    n.title,
                    n.body,
                    n.kind,
                    n.metadata,
                    n.created_at,
                    n.is_read as i64,
                ],
            )?;
            Ok(())
        })
    }

    pub fn notifications_for_user(&self, user_id: &str, limit: u32) -> Result<Vec<Notification>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, title, body, type, metadata, created_at, is_read
                 FROM notifications WHERE user_id = ?1
                 ORDER BY created_at DESC LIMIT ?2",
            )?;
            let rows = stmt
                .query_map(rusqlite::params![user_id, limit], |row| {
                    Ok(Notification {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        title: row.get(2)?,
                        body: row.get(3)?,
                        kind: row.get(4)?,
                        metadata: row.get(5)?,
                        created_at: row.get(6)?,
                        is_read: row.get::<_, i64>(7)? != 0,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Idempotent: marking an already-read notification succeeds.
    pub fn mark_notification_read(&self, id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("UPDATE notifications SET is_read = 1 WHERE id = ?1", [id])?;
            Ok(())
        })
    }

    // -- Push tokens --

    /// Last-write-wins: one current token per user.
    pub fn upsert_push_token(&self, user_id: &str, token: &str, updated_at: i64) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO push_tokens (user_id, token, updated_at) VALUES (?1, ?2, ?3)",
                rusqlite::params![user_id, token, updated_at],
            )?;
            Ok(())
        })
    }

    pub fn push_token(&self, user_id: &str) -> Result<Option<String>> {
        self.with_conn(|conn| {
            let token = conn
                .query_row(
                    "SELECT token FROM push_tokens WHERE user_id = ?1",
                    [user_id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(token)
        })
    }

    // -- User directory --

    pub fn create_user(&self, id: &str, username: &str, email: Option<&str>) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, email) VALUES (?1, ?2, ?3)",
                rusqlite::params![id, username, email],
            )?;
            Ok(())
        })
    }

    /// Primary enumeration source for broadcast fan-out.
    pub fn all_user_ids(&self) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id FROM users")?;
            let ids = stmt
                .query_map([], |row| row.get(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(ids)
        })
    }

    /// Fallback enumeration source when the user directory read fails:
    /// every user holding a push token.
    pub fn push_token_user_ids(&self) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT DISTINCT user_id FROM push_tokens")?;
            let ids = stmt
                .query_map([], |row| row.get(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(ids)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kindred_types::models::{ChatMessage, Notification};
    use uuid::Uuid;

    fn msg(room: &str, content: &str, created_at: i64) -> ChatMessage {
        ChatMessage {
            id: Uuid::new_v4().to_string(),
            room_id: room.to_string(),
            user_name: "ana".to_string(),
            user_id: Some("u1".to_string()),
            user_avatar: None,
            content: content.to_string(),
            created_at,
        }
    }

    #[test]
    fn chat_history_is_newest_first_and_capped() {
        let db = Database::open_in_memory().unwrap();
        for i in 0..60 {
            db.insert_chat_message(&msg("wellness", &format!("m{i}"), 1000 + i))
                .unwrap();
        }
        db.insert_chat_message(&msg("other", "elsewhere", 5000))
            .unwrap();

        let page = db.recent_chat_messages("wellness", 50).unwrap();
        assert_eq!(page.len(), 50);
        assert_eq!(page[0].content, "m59");
        assert_eq!(page[49].content, "m10");
        assert!(page.iter().all(|m| m.room_id == "wellness"));
    }

    #[test]
    fn notification_round_trip_and_ordering() {
        let db = Database::open_in_memory().unwrap();
        let mut first = Notification::new(
            "u1".into(),
            "T1".into(),
            "B1".into(),
            "system".into(),
            None,
        );
        first.created_at = 100;
        let mut second = first.clone();
        second.id = Uuid::new_v4().to_string();
        second.title = "T2".into();
        second.created_at = 200;

        db.insert_notification(&first).unwrap();
        db.insert_notification(&second).unwrap();

        let rows = db.notifications_for_user("u1", 50).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].title, "T2");
        assert_eq!(rows[1], first);
    }

    #[test]
    fn mark_read_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        let n = Notification::new("u1".into(), "T".into(), "B".into(), "system".into(), None);
        db.insert_notification(&n).unwrap();

        db.mark_notification_read(&n.id).unwrap();
        db.mark_notification_read(&n.id).unwrap();

        let rows = db.notifications_for_user("u1", 50).unwrap();
        assert!(rows[0].is_read);
    }

    #[test]
    fn push_token_upsert_is_last_write_wins() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_push_token("u1", "tok-a", 1).unwrap();
        db.upsert_push_token("u1", "tok-b", 2).unwrap();

        assert_eq!(db.push_token("u1").unwrap().as_deref(), Some("tok-b"));
        assert_eq!(db.push_token("u2").unwrap(), None);
        assert_eq!(db.push_token_user_ids().unwrap(), vec!["u1".to_string()]);
    }

    #[test]
    fn user_directory_enumeration() {
        let db = Database::open_in_memory().unwrap();
        db.create_user("u1", "ana", Some("ana@example.com")).unwrap();
        db.create_user("u2", "bo", None).unwrap();

        let mut ids = db.all_user_ids().unwrap();
        ids.sort();
        assert_eq!(ids, vec!["u1".to_string(), "u2".to_string()]);
    }
}
