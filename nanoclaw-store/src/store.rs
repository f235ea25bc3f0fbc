//! SQLite-backed persistent store. One [`rusqlite::Connection`] guarded by a
//! `Mutex`, behind a blocking-thread hop per call so async callers never block the runtime.

use std::path::Path;
use std::sync::{Arc, Mutex};

use nanoclaw_protocol::{ContainerConfig, ContextMode, ScheduleKind, TaskStatus};
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::StoreError;
use crate::schema;
use crate::types::{Chat, MessageOrigin, RegisteredWorkspace, ScheduledTask, StoredMessage, TaskRunLogEntry};

/// Sentinel chat id recording the last time platform-wide chat discovery was refreshed
///.
pub const DISCOVERY_SENTINEL_CHAT_ID: &str = "__nanoclaw_discovery__";

const GLOBAL_LAST_TIMESTAMP_KEY: &str = "router_cursor.last_timestamp";

pub struct Store {
    db: Arc<Mutex<Connection>>,
}

fn lock(db: &Arc<Mutex<Connection>>) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
    db.lock().map_err(|_| StoreError::Storage("store mutex poisoned".into()))
}

impl Store {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path.as_ref())?;
        schema::migrate(&conn)?;
        Ok(Self { db: Arc::new(Mutex::new(conn)) })
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        schema::migrate(&conn)?;
        Ok(Self { db: Arc::new(Mutex::new(conn)) })
    }

    // ---------------------------------------------------------------- chats

    /// `name = coalesce(new, old)`, `last_message_time = max(new, old)`.
    pub async fn upsert_chat(
        &self,
        chat_id: &str,
        name: Option<&str>,
        last_message_time: &str,
    ) -> Result<(), StoreError> {
        let db = self.db.clone();
        let chat_id = chat_id.to_string();
        let name = name.map(str::to_string);
        let last_message_time = last_message_time.to_string();
        tokio::task::block_in_place(move || {
            let conn = lock(&db)?;
            conn.execute(
                "INSERT INTO chats (chat_id, name, last_message_time) VALUES (?1, ?2, ?3)
                 ON CONFLICT(chat_id) DO UPDATE SET
                   name = COALESCE(excluded.name, chats.name),
                   last_message_time = MAX(excluded.last_message_time, chats.last_message_time)",
                params![chat_id, name, last_message_time],
            )?;
            Ok(())
        })
    }

    pub async fn get_chat(&self, chat_id: &str) -> Result<Option<Chat>, StoreError> {
        let db = self.db.clone();
        let chat_id = chat_id.to_string();
        tokio::task::block_in_place(move || {
            let conn = lock(&db)?;
            conn.query_row(
                "SELECT chat_id, name, last_message_time FROM chats WHERE chat_id = ?1",
                params![chat_id],
                |row| {
                    Ok(Chat {
                        chat_id: row.get(0)?,
                        name: row.get(1)?,
                        last_message_time: row.get(2)?,
                    })
                },
            )
            .optional()
            .map_err(StoreError::from)
        })
    }

    /// Every known chat, for the main workspace's `available_groups.json` snapshot.
    pub async fn list_chats(&self) -> Result<Vec<Chat>, StoreError> {
        let db = self.db.clone();
        tokio::task::block_in_place(move || {
            let conn = lock(&db)?;
            let mut stmt = conn.prepare(
                "SELECT chat_id, name, last_message_time FROM chats
                 WHERE chat_id != ?1 ORDER BY last_message_time DESC",
            )?;
            let rows = stmt
                .query_map(params![DISCOVERY_SENTINEL_CHAT_ID], |row| {
                    Ok(Chat { chat_id: row.get(0)?, name: row.get(1)?, last_message_time: row.get(2)? })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // ------------------------------------------------------------- messages

    /// Inserts a message; idempotent on the `(message_id, chat_id)` primary key
    ///. Returns `true` if a new row was inserted.
    pub async fn insert_message(&self, msg: &StoredMessage) -> Result<bool, StoreError> {
        let db = self.db.clone();
        let msg = msg.clone();
        tokio::task::block_in_place(move || {
            let conn = lock(&db)?;
            let changed = conn.execute(
                "INSERT OR IGNORE INTO messages
                   (message_id, chat_id, sender_id, sender_display_name, content, timestamp, origin)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    msg.message_id,
                    msg.chat_id,
                    msg.sender_id,
                    msg.sender_display_name,
                    msg.content,
                    msg.timestamp,
                    origin_str(msg.origin),
                ],
            )?;
            Ok(changed > 0)
        })
    }

    /// `getNewMessages`: all messages for `chat_ids` newer than `since_ts`,
    /// excluding bot-prefixed echoes, ordered by timestamp; also returns the max timestamp
    /// observed (used to advance the global router cursor).
    pub async fn get_new_messages(
        &self,
        chat_ids: &[String],
        since_ts: &str,
        bot_prefix: &str,
    ) -> Result<(Vec<StoredMessage>, Option<String>), StoreError> {
        if chat_ids.is_empty() {
            return Ok((Vec::new(), None));
        }
        let db = self.db.clone();
        let chat_ids = chat_ids.to_vec();
        let since_ts = since_ts.to_string();
        let bot_prefix = bot_prefix.to_string();
        tokio::task::block_in_place(move || {
            let conn = lock(&db)?;
            let placeholders = chat_ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
            let sql = format!(
                "SELECT message_id, chat_id, sender_id, sender_display_name, content, timestamp, origin
                 FROM messages
                 WHERE chat_id IN ({placeholders}) AND timestamp > ?
                   AND (?  = '' OR substr(content, 1, length(?)) != ?)
                 ORDER BY timestamp ASC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut idx = 1;
            let mut bound: Vec<&dyn rusqlite::ToSql> = Vec::new();
            for id in &chat_ids {
                bound.push(id);
            }
            bound.push(&since_ts);
            bound.push(&bot_prefix);
            bound.push(&bot_prefix);
            bound.push(&bot_prefix);
            let _ = &mut idx;
            let rows = stmt
                .query_map(bound.as_slice(), row_to_message)?
                .collect::<Result<Vec<_>, _>>()?;
            let max_ts = rows.iter().map(|m| m.timestamp.clone()).max();
            Ok((rows, max_ts))
        })
    }

    /// `getMessagesSince`: same filter, single chat.
    pub async fn get_messages_since(
        &self,
        chat_id: &str,
        since_ts: &str,
        bot_prefix: &str,
    ) -> Result<Vec<StoredMessage>, StoreError> {
        let db = self.db.clone();
        let chat_id = chat_id.to_string();
        let since_ts = since_ts.to_string();
        let bot_prefix = bot_prefix.to_string();
        tokio::task::block_in_place(move || {
            let conn = lock(&db)?;
            let mut stmt = conn.prepare(
                "SELECT message_id, chat_id, sender_id, sender_display_name, content, timestamp, origin
                 FROM messages
                 WHERE chat_id = ?1 AND timestamp > ?2
                   AND (?3 = '' OR substr(content, 1, length(?3)) != ?3)
                 ORDER BY timestamp ASC",
            )?;
            let rows = stmt
                .query_map(params![chat_id, since_ts, bot_prefix], row_to_message)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // --------------------------------------------------------- workspaces

    /// Creates a registration. Rejects a second `is_main_session = true` workspace
    ///.
    pub async fn create_workspace(&self, ws: RegisteredWorkspace) -> Result<(), StoreError> {
        let db = self.db.clone();
        tokio::task::block_in_place(move || {
            let mut conn = lock(&db)?;
            let tx = conn.transaction()?;
            if ws.is_main_session {
                let existing_main: Option<String> = tx
                    .query_row(
                        "SELECT chat_id FROM registered_workspaces WHERE is_main_session = 1",
                        [],
                        |row| row.get(0),
                    )
                    .optional()?;
                if existing_main.is_some() {
                    return Err(StoreError::Invariant(
                        "a main workspace is already registered".into(),
                    ));
                }
            }
            let allowed_users = ws
                .allowed_users
                .as_ref()
                .map(|u| serde_json::to_string(u).unwrap_or_default());
            let container_config = ws
                .container_config
                .as_ref()
                .map(|c| serde_json::to_string(c).unwrap_or_default());
            tx.execute(
                "INSERT INTO registered_workspaces
                   (chat_id, display_name, folder, trigger_word, requires_trigger,
                    is_main_session, allowed_users, added_at, container_config)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    ws.chat_id,
                    ws.display_name,
                    ws.folder,
                    ws.trigger,
                    ws.requires_trigger as i64,
                    ws.is_main_session as i64,
                    allowed_users,
                    ws.added_at,
                    container_config,
                ],
            )?;
            tx.commit()?;
            Ok(())
        })
    }

    pub async fn get_workspace(&self, chat_id: &str) -> Result<Option<RegisteredWorkspace>, StoreError> {
        let db = self.db.clone();
        let chat_id = chat_id.to_string();
        tokio::task::block_in_place(move || {
            let conn = lock(&db)?;
            conn.query_row(
                "SELECT chat_id, display_name, folder, trigger_word, requires_trigger,
                        is_main_session, allowed_users, added_at, container_config
                 FROM registered_workspaces WHERE chat_id = ?1",
                params![chat_id],
                row_to_workspace,
            )
            .optional()
            .map_err(StoreError::from)
        })
    }

    pub async fn get_workspace_by_folder(
        &self,
        folder: &str,
    ) -> Result<Option<RegisteredWorkspace>, StoreError> {
        let db = self.db.clone();
        let folder = folder.to_string();
        tokio::task::block_in_place(move || {
            let conn = lock(&db)?;
            conn.query_row(
                "SELECT chat_id, display_name, folder, trigger_word, requires_trigger,
                        is_main_session, allowed_users, added_at, container_config
                 FROM registered_workspaces WHERE folder = ?1",
                params![folder],
                row_to_workspace,
            )
            .optional()
            .map_err(StoreError::from)
        })
    }

    pub async fn get_main_workspace(&self) -> Result<Option<RegisteredWorkspace>, StoreError> {
        let db = self.db.clone();
        tokio::task::block_in_place(move || {
            let conn = lock(&db)?;
            conn.query_row(
                "SELECT chat_id, display_name, folder, trigger_word, requires_trigger,
                        is_main_session, allowed_users, added_at, container_config
                 FROM registered_workspaces WHERE is_main_session = 1",
                [],
                row_to_workspace,
            )
            .optional()
            .map_err(StoreError::from)
        })
    }

    pub async fn list_workspaces(&self) -> Result<Vec<RegisteredWorkspace>, StoreError> {
        let db = self.db.clone();
        tokio::task::block_in_place(move || {
            let conn = lock(&db)?;
            let mut stmt = conn.prepare(
                "SELECT chat_id, display_name, folder, trigger_word, requires_trigger,
                        is_main_session, allowed_users, added_at, container_config
                 FROM registered_workspaces ORDER BY added_at ASC",
            )?;
            let rows = stmt
                .query_map([], row_to_workspace)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub async fn update_workspace_container_config(
        &self,
        chat_id: &str,
        container_config: Option<ContainerConfig>,
    ) -> Result<(), StoreError> {
        let db = self.db.clone();
        let chat_id = chat_id.to_string();
        tokio::task::block_in_place(move || {
            let conn = lock(&db)?;
            let json = container_config.map(|c| serde_json::to_string(&c).unwrap_or_default());
            let changed = conn.execute(
                "UPDATE registered_workspaces SET container_config = ?1 WHERE chat_id = ?2",
                params![json, chat_id],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!("workspace {chat_id}")));
            }
            Ok(())
        })
    }

    // ----------------------------------------------------------- sessions

    pub async fn get_session(&self, folder: &str) -> Result<Option<String>, StoreError> {
        let db = self.db.clone();
        let folder = folder.to_string();
        tokio::task::block_in_place(move || {
            let conn = lock(&db)?;
            conn.query_row(
                "SELECT session_handle FROM sessions WHERE folder = ?1",
                params![folder],
                |row| row.get(0),
            )
            .optional()
            .map_err(StoreError::from)
        })
    }

    pub async fn set_session(&self, folder: &str, handle: &str) -> Result<(), StoreError> {
        let db = self.db.clone();
        let folder = folder.to_string();
        let handle = handle.to_string();
        tokio::task::block_in_place(move || {
            let conn = lock(&db)?;
            conn.execute(
                "INSERT INTO sessions (folder, session_handle) VALUES (?1, ?2)
                 ON CONFLICT(folder) DO UPDATE SET session_handle = excluded.session_handle",
                params![folder, handle],
            )?;
            Ok(())
        })
    }

    /// Drops the stored session for a workspace (the `/new` command).
    pub async fn clear_session(&self, folder: &str) -> Result<(), StoreError> {
        let db = self.db.clone();
        let folder = folder.to_string();
        tokio::task::block_in_place(move || {
            let conn = lock(&db)?;
            conn.execute("DELETE FROM sessions WHERE folder = ?1", params![folder])?;
            Ok(())
        })
    }

    // ------------------------------------------------------- router cursor

    pub async fn get_last_timestamp(&self) -> Result<Option<String>, StoreError> {
        let db = self.db.clone();
        tokio::task::block_in_place(move || {
            let conn = lock(&db)?;
            conn.query_row(
                "SELECT value FROM meta WHERE key = ?1",
                params![GLOBAL_LAST_TIMESTAMP_KEY],
                |row| row.get(0),
            )
            .optional()
            .map_err(StoreError::from)
        })
    }

    /// Monotone-max advance of the global ingestion cursor.
    pub async fn advance_last_timestamp(&self, candidate: &str) -> Result<(), StoreError> {
        let db = self.db.clone();
        let candidate = candidate.to_string();
        tokio::task::block_in_place(move || {
            let conn = lock(&db)?;
            conn.execute(
                "INSERT INTO meta (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = MAX(value, excluded.value)",
                params![GLOBAL_LAST_TIMESTAMP_KEY, candidate],
            )?;
            Ok(())
        })
    }

    pub async fn get_last_agent_timestamp(&self, chat_id: &str) -> Result<Option<String>, StoreError> {
        let db = self.db.clone();
        let chat_id = chat_id.to_string();
        tokio::task::block_in_place(move || {
            let conn = lock(&db)?;
            conn.query_row(
                "SELECT last_agent_timestamp FROM router_cursor_chat WHERE chat_id = ?1",
                params![chat_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(StoreError::from)
        })
    }

    /// Monotone-max advance of a per-chat cursor; only moves forward even if called with an
    /// older timestamp.
    pub async fn advance_last_agent_timestamp(
        &self,
        chat_id: &str,
        candidate: &str,
    ) -> Result<(), StoreError> {
        let db = self.db.clone();
        let chat_id = chat_id.to_string();
        let candidate = candidate.to_string();
        tokio::task::block_in_place(move || {
            let conn = lock(&db)?;
            conn.execute(
                "INSERT INTO router_cursor_chat (chat_id, last_agent_timestamp) VALUES (?1, ?2)
                 ON CONFLICT(chat_id) DO UPDATE SET
                   last_agent_timestamp = MAX(last_agent_timestamp, excluded.last_agent_timestamp)",
                params![chat_id, candidate],
            )?;
            Ok(())
        })
    }

    // ---------------------------------------------------------------- tasks

    pub async fn create_task(&self, task: ScheduledTask) -> Result<(), StoreError> {
        let db = self.db.clone();
        tokio::task::block_in_place(move || {
            let conn = lock(&db)?;
            conn.execute(
                "INSERT INTO scheduled_tasks
                   (id, workspace_folder, chat_id, prompt, schedule_kind, schedule_value,
                    context_mode, next_run, last_run, last_result, status)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    task.id,
                    task.workspace_folder,
                    task.chat_id,
                    task.prompt,
                    task.schedule_kind.to_string(),
                    task.schedule_value,
                    task.context_mode.to_string(),
                    task.next_run,
                    task.last_run,
                    task.last_result,
                    task.status.to_string(),
                ],
            )?;
            Ok(())
        })
    }

    pub async fn get_task(&self, id: &str) -> Result<Option<ScheduledTask>, StoreError> {
        let db = self.db.clone();
        let id = id.to_string();
        tokio::task::block_in_place(move || {
            let conn = lock(&db)?;
            conn.query_row(
                "SELECT id, workspace_folder, chat_id, prompt, schedule_kind, schedule_value,
                        context_mode, next_run, last_run, last_result, status
                 FROM scheduled_tasks WHERE id = ?1",
                params![id],
                row_to_task,
            )
            .optional()
            .map_err(StoreError::from)
        })
    }

    /// `getDueTasks`: active tasks with `next_run <= now`, ordered by `next_run`.
    /// Every non-completed task, for the agent-visible `tasks.json` snapshot.
    pub async fn list_tasks(&self) -> Result<Vec<ScheduledTask>, StoreError> {
        let db = self.db.clone();
        tokio::task::block_in_place(move || {
            let conn = lock(&db)?;
            let mut stmt = conn.prepare(
                "SELECT id, workspace_folder, chat_id, prompt, schedule_kind, schedule_value,
                        context_mode, next_run, last_run, last_result, status
                 FROM scheduled_tasks WHERE status != 'completed' ORDER BY workspace_folder ASC",
            )?;
            let rows = stmt.query_map([], row_to_task)?.collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub async fn get_due_tasks(&self, now: &str) -> Result<Vec<ScheduledTask>, StoreError> {
        let db = self.db.clone();
        let now = now.to_string();
        tokio::task::block_in_place(move || {
            let conn = lock(&db)?;
            let mut stmt = conn.prepare(
                "SELECT id, workspace_folder, chat_id, prompt, schedule_kind, schedule_value,
                        context_mode, next_run, last_run, last_result, status
                 FROM scheduled_tasks
                 WHERE status = 'active' AND next_run IS NOT NULL AND next_run <= ?1
                 ORDER BY next_run ASC",
            )?;
            let rows = stmt
                .query_map(params![now], row_to_task)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Updates a task after it fires: new `next_run` (`None` ⇒ `once` task completes),
    /// `last_run`, `last_result`, and derived status.
    pub async fn record_task_fire(
        &self,
        id: &str,
        next_run: Option<&str>,
        last_run: &str,
        last_result: Option<&str>,
    ) -> Result<(), StoreError> {
        let db = self.db.clone();
        let id = id.to_string();
        let next_run = next_run.map(str::to_string);
        let last_run = last_run.to_string();
        let last_result = last_result.map(str::to_string);
        tokio::task::block_in_place(move || {
            let conn = lock(&db)?;
            let status = if next_run.is_none() { TaskStatus::Completed.to_string() } else { TaskStatus::Active.to_string() };
            let changed = conn.execute(
                "UPDATE scheduled_tasks
                 SET next_run = ?1, last_run = ?2, last_result = ?3, status = ?4
                 WHERE id = ?5 AND status = 'active'",
                params![next_run, last_run, last_result, status, id],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!("active task {id}")));
            }
            Ok(())
        })
    }

    pub async fn pause_task(&self, id: &str) -> Result<(), StoreError> {
        self.set_task_status(id, TaskStatus::Active, TaskStatus::Paused).await
    }

    pub async fn resume_task(&self, id: &str) -> Result<(), StoreError> {
        self.set_task_status(id, TaskStatus::Paused, TaskStatus::Active).await
    }

    async fn set_task_status(
        &self,
        id: &str,
        from: TaskStatus,
        to: TaskStatus,
    ) -> Result<(), StoreError> {
        let db = self.db.clone();
        let id = id.to_string();
        tokio::task::block_in_place(move || {
            let conn = lock(&db)?;
            let changed = conn.execute(
                "UPDATE scheduled_tasks SET status = ?1 WHERE id = ?2 AND status = ?3",
                params![to.to_string(), id, from.to_string()],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!("task {id} in status {from}")));
            }
            Ok(())
        })
    }

    /// Cancels a task and atomically deletes its run-log history in the same transaction.
    pub async fn cancel_task(&self, id: &str) -> Result<(), StoreError> {
        let db = self.db.clone();
        let id = id.to_string();
        tokio::task::block_in_place(move || {
            let mut conn = lock(&db)?;
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM task_run_logs WHERE task_id = ?1", params![id])?;
            let changed = tx.execute("DELETE FROM scheduled_tasks WHERE id = ?1", params![id])?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!("task {id}")));
            }
            tx.commit()?;
            Ok(())
        })
    }

    pub async fn append_task_run_log(
        &self,
        task_id: &str,
        run_at: &str,
        duration_ms: i64,
        outcome: &str,
        detail: Option<&str>,
    ) -> Result<i64, StoreError> {
        let db = self.db.clone();
        let task_id = task_id.to_string();
        let run_at = run_at.to_string();
        let outcome = outcome.to_string();
        let detail = detail.map(str::to_string);
        tokio::task::block_in_place(move || {
            let conn = lock(&db)?;
            conn.execute(
                "INSERT INTO task_run_logs (task_id, run_at, duration_ms, outcome, detail)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![task_id, run_at, duration_ms, outcome, detail],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub async fn list_task_run_logs(&self, task_id: &str) -> Result<Vec<TaskRunLogEntry>, StoreError> {
        let db = self.db.clone();
        let task_id = task_id.to_string();
        tokio::task::block_in_place(move || {
            let conn = lock(&db)?;
            let mut stmt = conn.prepare(
                "SELECT id, task_id, run_at, duration_ms, outcome, detail
                 FROM task_run_logs WHERE task_id = ?1 ORDER BY run_at ASC",
            )?;
            let rows = stmt
                .query_map(params![task_id], |row| {
                    Ok(TaskRunLogEntry {
                        id: row.get(0)?,
                        task_id: row.get(1)?,
                        run_at: row.get(2)?,
                        duration_ms: row.get(3)?,
                        outcome: row.get(4)?,
                        detail: row.get(5)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn origin_str(o: MessageOrigin) -> &'static str {
    match o {
        MessageOrigin::FromBot => "from_bot",
        MessageOrigin::FromOther => "from_other",
    }
}

fn parse_origin(s: &str) -> MessageOrigin {
    match s {
        "from_bot" => MessageOrigin::FromBot,
        _ => MessageOrigin::FromOther,
    }
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredMessage> {
    let origin: String = row.get(6)?;
    Ok(StoredMessage {
        message_id: row.get(0)?,
        chat_id: row.get(1)?,
        sender_id: row.get(2)?,
        sender_display_name: row.get(3)?,
        content: row.get(4)?,
        timestamp: row.get(5)?,
        origin: parse_origin(&origin),
    })
}

fn row_to_workspace(row: &rusqlite::Row<'_>) -> rusqlite::Result<RegisteredWorkspace> {
    let allowed_users: Option<String> = row.get(6)?;
    let container_config: Option<String> = row.get(8)?;
    Ok(RegisteredWorkspace {
        chat_id: row.get(0)?,
        display_name: row.get(1)?,
        folder: row.get(2)?,
        trigger: row.get(3)?,
        requires_trigger: row.get::<_, i64>(4)? != 0,
        is_main_session: row.get::<_, i64>(5)? != 0,
        allowed_users: allowed_users.and_then(|s| serde_json::from_str(&s).ok()),
        added_at: row.get(7)?,
        container_config: container_config.and_then(|s| serde_json::from_str(&s).ok()),
    })
}

fn row_to_task(row: &rusqlite::Row<'_>) -> rusqlite::Result<ScheduledTask> {
    let schedule_kind: String = row.get(4)?;
    let context_mode: String = row.get(6)?;
    let status: String = row.get(10)?;
    Ok(ScheduledTask {
        id: row.get(0)?,
        workspace_folder: row.get(1)?,
        chat_id: row.get(2)?,
        prompt: row.get(3)?,
        schedule_kind: schedule_kind.parse().unwrap_or(ScheduleKind::Once),
        schedule_value: row.get(5)?,
        context_mode: context_mode.parse().unwrap_or(ContextMode::Isolated),
        next_run: row.get(7)?,
        last_run: row.get(8)?,
        last_result: row.get(9)?,
        status: status.parse().unwrap_or(TaskStatus::Paused),
    })
}
