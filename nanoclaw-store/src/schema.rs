//! Additive, idempotent schema migrations. Missing columns default to documented values.

use rusqlite::Connection;

use crate::error::StoreError;

const CURRENT_SCHEMA_VERSION: i64 = 1;

pub fn migrate(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS meta (
            key TEXT PRIMARY KEY,
            value TEXT
        );

        CREATE TABLE IF NOT EXISTS chats (
            chat_id TEXT PRIMARY KEY,
            name TEXT,
            last_message_time TEXT
        );

        CREATE TABLE IF NOT EXISTS messages (
            message_id TEXT NOT NULL,
            chat_id TEXT NOT NULL,
            sender_id TEXT NOT NULL,
            sender_display_name TEXT NOT NULL,
            content TEXT NOT NULL,
            timestamp TEXT NOT NULL,
            origin TEXT NOT NULL,
            PRIMARY KEY (message_id, chat_id)
        );
        CREATE INDEX IF NOT EXISTS idx_messages_timestamp ON messages(timestamp);
        CREATE INDEX IF NOT EXISTS idx_messages_chat_id_timestamp ON messages(chat_id, timestamp);

        CREATE TABLE IF NOT EXISTS registered_workspaces (
            chat_id TEXT PRIMARY KEY,
            display_name TEXT NOT NULL,
            folder TEXT NOT NULL UNIQUE,
            trigger_word TEXT NOT NULL,
            requires_trigger INTEGER NOT NULL,
            is_main_session INTEGER NOT NULL,
            allowed_users TEXT,
            added_at TEXT NOT NULL,
            container_config TEXT
        );

        CREATE TABLE IF NOT EXISTS sessions (
            folder TEXT PRIMARY KEY,
            session_handle TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS router_cursor_chat (
            chat_id TEXT PRIMARY KEY,
            last_agent_timestamp TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS scheduled_tasks (
            id TEXT PRIMARY KEY,
            workspace_folder TEXT NOT NULL,
            chat_id TEXT NOT NULL,
            prompt TEXT NOT NULL,
            schedule_kind TEXT NOT NULL,
            schedule_value TEXT NOT NULL,
            context_mode TEXT NOT NULL,
            next_run TEXT,
            last_run TEXT,
            last_result TEXT,
            status TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_scheduled_tasks_next_run ON scheduled_tasks(next_run);
        CREATE INDEX IF NOT EXISTS idx_scheduled_tasks_status ON scheduled_tasks(status);

        CREATE TABLE IF NOT EXISTS task_run_logs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            task_id TEXT NOT NULL,
            run_at TEXT NOT NULL,
            duration_ms INTEGER NOT NULL,
            outcome TEXT NOT NULL,
            detail TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_task_run_logs_task_run_at ON task_run_logs(task_id, run_at);
        "#,
    )?;

    conn.execute(
        "INSERT OR IGNORE INTO meta (key, value) VALUES ('schema_version', ?1)",
        rusqlite::params![CURRENT_SCHEMA_VERSION.to_string()],
    )?;
    Ok(())
}
