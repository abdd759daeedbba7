use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS chat_messages (
            id          TEXT PRIMARY KEY,
            room_id     TEXT NOT NULL,
            user_name   TEXT NOT NULL,
            user_id     TEXT,
            user_avatar TEXT,
            content     TEXT NOT NULL,
            created_at  INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_chat_messages_room
            ON chat_messages(room_id, created_at);

        CREATE TABLE IF NOT EXISTS notifications (
            id          TEXT PRIMARY KEY,
            user_id     TEXT NOT NULL,
            title       TEXT NOT NULL,
            body        TEXT NOT NULL,
            type        TEXT NOT NULL,
            metadata    TEXT,
            created_at  INTEGER NOT NULL,
            is_read     INTEGER NOT NULL DEFAULT 0
        );

        CREATE INDEX IF NOT EXISTS idx_notifications_user
            ON notifications(user_id, created_at);

        CREATE TABLE IF NOT EXISTS push_tokens (
            user_id     TEXT PRIMARY KEY,
            token       TEXT NOT NULL,
            updated_at  INTEGER NOT NULL
        );

        -- Minimal user directory: the broadcast fan-out enumerates it.
        -- Full account management lives in a separate service.
        CREATE TABLE IF NOT EXISTS users (
            id          TEXT PRIMARY KEY,
            username    TEXT NOT NULL UNIQUE,
            email       TEXT UNIQUE,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
