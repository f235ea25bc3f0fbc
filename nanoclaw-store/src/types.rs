//! Row types for every table.

use nanoclaw_protocol::{ContainerConfig, ContextMode, ScheduleKind, TaskStatus};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Chat {
    pub chat_id: String,
    pub name: Option<String>,
    /// ISO-8601 timestamp of the most recent activity seen on this chat.
    pub last_message_time: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageOrigin {
    FromBot,
    FromOther,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoredMessage {
    pub message_id: String,
    pub chat_id: String,
    pub sender_id: String,
    pub sender_display_name: String,
    pub content: String,
    pub timestamp: String,
    pub origin: MessageOrigin,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RegisteredWorkspace {
    pub chat_id: String,
    pub display_name: String,
    pub folder: String,
    pub trigger: String,
    pub requires_trigger: bool,
    pub is_main_session: bool,
    pub allowed_users: Option<Vec<String>>,
    pub added_at: String,
    pub container_config: Option<ContainerConfig>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScheduledTask {
    pub id: String,
    pub workspace_folder: String,
    pub chat_id: String,
    pub prompt: String,
    pub schedule_kind: ScheduleKind,
    pub schedule_value: String,
    pub context_mode: ContextMode,
    pub next_run: Option<String>,
    pub last_run: Option<String>,
    pub last_result: Option<String>,
    pub status: TaskStatus,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TaskRunLogEntry {
    pub id: i64,
    pub task_id: String,
    pub run_at: String,
    pub duration_ms: i64,
    pub outcome: String,
    pub detail: Option<String>,
}
