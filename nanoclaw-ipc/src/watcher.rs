use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use nanoclaw_protocol::{IpcError, IpcRecord};
use tokio::fs;

use crate::actions::IpcActions;

const ERRORS_DIR: &str = "errors";
const MESSAGES_DIR: &str = "messages";
const TASKS_DIR: &str = "tasks";

/// Polls `<ipc_root>/<workspace_folder>/{messages,tasks}/*.json` for records emitted by
/// running agents. The directory a record is found in is the trusted claim of origin; the
/// JSON body is not.
pub struct IpcWatcher {
    ipc_root: PathBuf,
    poll_interval: Duration,
}

impl IpcWatcher {
    pub fn new(ipc_root: PathBuf, poll_interval: Duration) -> Self {
        Self { ipc_root, poll_interval }
    }

    /// Runs the poll loop forever. Intended to be spawned as its own task.
    pub async fn run(self, actions: Arc<dyn IpcActions>) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        loop {
            ticker.tick().await;
            if let Err(err) = self.scan_once(actions.as_ref()).await {
                tracing::warn!(error = %err, "ipc scan failed");
            }
        }
    }

    pub async fn scan_once(&self, actions: &dyn IpcActions) -> std::io::Result<()> {
        if !self.ipc_root.exists() {
            return Ok(());
        }
        let mut workspaces = fs::read_dir(&self.ipc_root).await?;
        while let Some(entry) = workspaces.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            let origin = name.to_string_lossy().to_string();
            if origin == ERRORS_DIR {
                continue;
            }
            self.scan_workspace_subdir(&origin, &entry.path().join(MESSAGES_DIR), actions).await?;
            self.scan_workspace_subdir(&origin, &entry.path().join(TASKS_DIR), actions).await?;
        }
        Ok(())
    }

    async fn scan_workspace_subdir(&self, origin: &str, dir: &Path, actions: &dyn IpcActions) -> std::io::Result<()> {
        if !dir.exists() {
            return Ok(());
        }
        let mut files = fs::read_dir(dir).await?;
        while let Some(entry) = files.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            self.process_file(origin, &path, actions).await?;
        }
        Ok(())
    }

    async fn process_file(&self, origin: &str, path: &Path, actions: &dyn IpcActions) -> std::io::Result<()> {
        let bytes = fs::read(path).await?;
        match IpcRecord::parse(&bytes) {
            Ok(record) => {
                if authorize(origin, record.clone(), actions).await {
                    enact(origin, &record, actions).await;
                } else {
                    tracing::warn!(origin, record = ?record, "dropping unauthorised ipc record");
                }
                fs::remove_file(path).await?;
            }
            Err(err) => {
                tracing::warn!(origin, error = %err, path = %path.display(), "quarantining unparseable ipc record");
                self.quarantine(origin, path).await?;
            }
        }
        Ok(())
    }

    async fn quarantine(&self, origin: &str, path: &Path) -> std::io::Result<()> {
        let errors_dir = self.ipc_root.join(ERRORS_DIR);
        fs::create_dir_all(&errors_dir).await?;
        let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("unknown.json");
        let dest = errors_dir.join(format!("{origin}-{file_name}"));
        fs::rename(path, dest).await
    }
}

/// Authorization rules: main may touch anything it names; a non-main workspace may only act
/// on chats and tasks it owns.
async fn authorize(origin: &str, record: IpcRecord, actions: &dyn IpcActions) -> bool {
    if actions.is_main(origin).await {
        return true;
    }
    match record {
        IpcRecord::Message { chat_jid, .. } | IpcRecord::Status { chat_jid, .. } => {
            actions.chat_owner_folder(&chat_jid).await.as_deref() == Some(origin)
        }
        IpcRecord::ScheduleTask { target_jid, .. } => {
            actions.chat_owner_folder(&target_jid).await.as_deref() == Some(origin)
        }
        IpcRecord::PauseTask { task_id } | IpcRecord::ResumeTask { task_id } | IpcRecord::CancelTask { task_id } => {
            actions.task_owner_folder(&task_id).await.as_deref() == Some(origin)
        }
        IpcRecord::RefreshGroups | IpcRecord::RegisterGroup { .. } => false,
    }
}

async fn enact(origin: &str, record: &IpcRecord, actions: &dyn IpcActions) {
    match record {
        IpcRecord::Message { chat_jid, text } => actions.send_message(chat_jid, text).await,
        IpcRecord::Status { chat_jid, text } => actions.send_status(chat_jid, text).await,
        IpcRecord::ScheduleTask { prompt, schedule_type, schedule_value, target_jid, context_mode } => {
            if let Err(err) = actions
                .schedule_task(target_jid, prompt, schedule_type, schedule_value, *context_mode)
                .await
            {
                tracing::warn!(origin, error = %err, "rejected schedule_task record");
            }
        }
        IpcRecord::PauseTask { task_id } => {
            if let Err(err) = actions.pause_task(task_id).await {
                tracing::warn!(origin, error = %err, "pause_task failed");
            }
        }
        IpcRecord::ResumeTask { task_id } => {
            if let Err(err) = actions.resume_task(task_id).await {
                tracing::warn!(origin, error = %err, "resume_task failed");
            }
        }
        IpcRecord::CancelTask { task_id } => {
            if let Err(err) = actions.cancel_task(task_id).await {
                tracing::warn!(origin, error = %err, "cancel_task failed");
            }
        }
        IpcRecord::RefreshGroups => actions.refresh_groups().await,
        IpcRecord::RegisterGroup { jid, name, folder, trigger, container_config } => {
            if let Err(err) = actions
                .register_group(jid, name, folder, trigger, container_config.clone())
                .await
            {
                tracing::warn!(origin, error = %err, "register_group failed");
            }
        }
    }
}
