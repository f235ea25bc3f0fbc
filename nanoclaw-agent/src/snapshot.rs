//! Writes the read-only snapshot files a running agent finds at a well-known path inside its
//! sandbox.

use std::path::Path;

use serde::Serialize;

use crate::error::AgentError;

/// A projection of `ScheduledTask` just large enough for an agent to read its own queue.
pub struct TaskSnapshotInput {
    pub id: String,
    pub workspace_folder: String,
    pub prompt: String,
    pub schedule_kind: String,
    pub schedule_value: String,
    pub status: String,
}

#[derive(Serialize)]
struct TaskSnapshot<'a> {
    id: &'a str,
    prompt: &'a str,
    #[serde(rename = "scheduleKind")]
    schedule_kind: &'a str,
    #[serde(rename = "scheduleValue")]
    schedule_value: &'a str,
    status: &'a str,
}

/// A projection of `Chat` annotated with whether it is a registered workspace.
pub struct ChatSnapshotInput {
    pub chat_id: String,
    pub name: Option<String>,
    pub registered: bool,
}

#[derive(Serialize)]
struct ChatSnapshot<'a> {
    #[serde(rename = "chatId")]
    chat_id: &'a str,
    name: Option<&'a str>,
    registered: bool,
}

/// Writes `tasks.json`: the agent's visible task list, filtered to `workspace_folder` unless
/// `is_main` (main sees every task).
pub fn write_tasks_snapshot(
    sandbox_root: &Path,
    workspace_folder: &str,
    is_main: bool,
    tasks: &[TaskSnapshotInput],
) -> Result<(), AgentError> {
    let visible: Vec<TaskSnapshot<'_>> = tasks
        .iter()
        .filter(|t| is_main || t.workspace_folder == workspace_folder)
        .map(|t| TaskSnapshot {
            id: &t.id,
            prompt: &t.prompt,
            schedule_kind: &t.schedule_kind,
            schedule_value: &t.schedule_value,
            status: &t.status,
        })
        .collect();
    let body = serde_json::to_vec_pretty(&visible)?;
    std::fs::write(sandbox_root.join("tasks.json"), body)?;
    Ok(())
}

/// Writes `available_groups.json` for the main workspace: every known chat annotated with
/// whether it is registered. Callers must only write this for the main workspace.
pub fn write_available_groups_snapshot(
    sandbox_root: &Path,
    chats: &[ChatSnapshotInput],
) -> Result<(), AgentError> {
    let snapshot: Vec<ChatSnapshot<'_>> = chats
        .iter()
        .map(|c| ChatSnapshot { chat_id: &c.chat_id, name: c.name.as_deref(), registered: c.registered })
        .collect();
    let body = serde_json::to_vec_pretty(&snapshot)?;
    std::fs::write(sandbox_root.join("available_groups.json"), body)?;
    Ok(())
}
