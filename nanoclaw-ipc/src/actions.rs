use async_trait::async_trait;
use nanoclaw_protocol::{ContainerConfig, ContextMode};

/// Enacts an authorized IPC record. Implemented by the router, which is the only place that
/// knows about registered workspaces, the work queue, and the scheduler. Keeping this crate
/// ignorant of those lets the watcher and its authorization rules be tested in isolation.
#[async_trait]
pub trait IpcActions: Send + Sync {
    /// Whether `origin_folder` is the main workspace.
    async fn is_main(&self, origin_folder: &str) -> bool;

    /// The registered workspace folder that owns `chat_jid`, if any.
    async fn chat_owner_folder(&self, chat_jid: &str) -> Option<String>;

    /// The workspace folder that owns `task_id`, if any.
    async fn task_owner_folder(&self, task_id: &str) -> Option<String>;

    async fn send_message(&self, chat_jid: &str, text: &str);
    async fn send_status(&self, chat_jid: &str, text: &str);

    async fn schedule_task(
        &self,
        target_jid: &str,
        prompt: &str,
        schedule_type: &str,
        schedule_value: &str,
        context_mode: Option<ContextMode>,
    ) -> Result<(), String>;

    async fn pause_task(&self, task_id: &str) -> Result<(), String>;
    async fn resume_task(&self, task_id: &str) -> Result<(), String>;
    async fn cancel_task(&self, task_id: &str) -> Result<(), String>;

    async fn refresh_groups(&self);

    async fn register_group(
        &self,
        jid: &str,
        name: &str,
        folder: &str,
        trigger: &str,
        container_config: Option<ContainerConfig>,
    ) -> Result<(), String>;
}
