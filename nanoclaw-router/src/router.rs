//! Router glue: binds the batch builder, work queue, agent dispatcher, messenger, and IPC
//! authorization table into one object so the cyclic dependency between them collapses into
//! a single post-construction wire-up (`WorkQueue::set_processor`).

use std::sync::Arc;

use async_trait::async_trait;
use nanoclaw_agent::{
    dispatch, resolve_mounts, write_available_groups_snapshot, write_tasks_snapshot, ChatSnapshotInput,
    ContainerRuntime, DispatchOutcome, DispatchRequest, StatusSink, TaskSnapshotInput,
};
use nanoclaw_config::OperatorConfig;
use nanoclaw_ipc::IpcActions;
use nanoclaw_messenger::{Messenger, StatusRelay};
use nanoclaw_protocol::{AgentInput, ChatType, ContainerConfig, ContextMode, NormalizedMessage, ScheduleKind, TaskStatus};
use nanoclaw_scheduler::TaskDispatcher;
use nanoclaw_store::{MessageOrigin, RegisteredWorkspace, ScheduledTask, Store, StoredMessage};

use crate::batch::{build_batch, BatchOutcome, SCHEDULER_SENDER_ID};
use crate::commands::{handle_register, parse_command, Command, RegisterRequest};
use crate::error::RouterError;
use crate::ingest::ingest_event;
use crate::queue::{BatchProcessor, ProcessOutcome, WorkQueue};

pub struct Router {
    store: Arc<Store>,
    messenger: Arc<dyn Messenger>,
    status_relay: Arc<StatusRelay<dyn Messenger>>,
    runtime: Arc<dyn ContainerRuntime>,
    queue: Arc<WorkQueue>,
    config: OperatorConfig,
}

impl Router {
    pub fn new(
        store: Arc<Store>,
        messenger: Arc<dyn Messenger>,
        status_relay: Arc<StatusRelay<dyn Messenger>>,
        runtime: Arc<dyn ContainerRuntime>,
        queue: Arc<WorkQueue>,
        config: OperatorConfig,
    ) -> Arc<Self> {
        let router = Arc::new(Self { store, messenger, status_relay, runtime, queue, config });
        router.queue.set_processor(router.clone());
        router
    }

    /// Entry point for every inbound platform event. `/register` on a chat with no
    /// workspace yet is handled here, synchronously, since such a chat never reaches the
    /// work queue (ingestion only persists messages for already-registered chats).
    pub async fn handle_inbound(&self, msg: &NormalizedMessage) -> Result<(), RouterError> {
        if self.store.get_workspace(&msg.chat_id).await?.is_none() {
            if let Some(Command::Register { folder }) = parse_command(&msg.content) {
                self.store.upsert_chat(&msg.chat_id, Some(&msg.sender_display_name), &msg.timestamp).await?;
                let is_private = matches!(msg.chat_type, ChatType::Private);
                let reply = handle_register(
                    &self.store,
                    &self.config,
                    RegisterRequest {
                        chat_id: &msg.chat_id,
                        chat_name: Some(&msg.sender_display_name),
                        sender_id: &msg.sender_id,
                        is_private,
                        explicit_folder: folder.as_deref(),
                    },
                )
                .await?;
                self.reply(&msg.chat_id, &reply).await;
                return Ok(());
            }
        }

        let should_enqueue = ingest_event(&self.store, msg).await?;
        if should_enqueue {
            self.queue.enqueue(msg.chat_id.clone()).await;
        }
        Ok(())
    }

    /// Startup recovery scan: any registered chat with work left unseen by an agent run is
    /// re-enqueued, then the main workspace gets a boot greeting.
    pub async fn recover_and_greet(&self) -> Result<(), RouterError> {
        for workspace in self.store.list_workspaces().await? {
            let since = self.store.get_last_agent_timestamp(&workspace.chat_id).await?.unwrap_or_default();
            let pending = self
                .store
                .get_messages_since(&workspace.chat_id, &since, &self.config.bot_message_prefix)
                .await?;
            if !pending.is_empty() {
                self.queue.enqueue(workspace.chat_id.clone()).await;
            }
        }
        if let Some(main) = self.store.get_main_workspace().await? {
            self.reply(&main.chat_id, "back online.").await;
        }
        Ok(())
    }

    /// Polling ingestion tail (C3's polling variant): for messenger adapters where
    /// `needs_polling()` is true, the listener never persists inbound events itself, so this
    /// loop is the only thing advancing the process-global `last_timestamp` cursor and
    /// discovering new work. Intended to be spawned once at startup, gated on
    /// `needs_polling()`.
    pub async fn run_ingestion_tail(self: Arc<Self>, poll_interval: std::time::Duration) {
        let mut ticker = tokio::time::interval(poll_interval);
        loop {
            ticker.tick().await;
            if let Err(err) = self.tail_once().await {
                tracing::warn!(error = %err, "ingestion tail pass failed");
            }
        }
    }

    /// One pass: pulls everything newer than the global cursor across every registered chat,
    /// advances the cursor to the newest timestamp seen, and enqueues each chat that has new
    /// work exactly once.
    pub async fn tail_once(&self) -> Result<(), RouterError> {
        let chat_ids: Vec<String> = self.store.list_workspaces().await?.into_iter().map(|w| w.chat_id).collect();
        let since = self.store.get_last_timestamp().await?.unwrap_or_default();
        let (messages, max_ts) = self.store.get_new_messages(&chat_ids, &since, &self.config.bot_message_prefix).await?;

        if let Some(max_ts) = max_ts {
            self.store.advance_last_timestamp(&max_ts).await?;
        }

        let mut enqueued = std::collections::HashSet::new();
        for msg in messages {
            if enqueued.insert(msg.chat_id.clone()) {
                self.queue.enqueue(msg.chat_id).await;
            }
        }
        Ok(())
    }

    async fn reply(&self, chat_id: &str, text: &str) {
        let formatted = format!("{}: {}", self.config.assistant_name, text);
        if let Err(err) = self.messenger.send(chat_id, &formatted).await {
            tracing::warn!(%chat_id, error = %err, "reply send failed");
        }
    }

    async fn run_batch(&self, chat_id: &str, workspace: &RegisteredWorkspace, batch: &crate::batch::Batch) -> DispatchOutcome {
        let workspace_path = self.config.workspaces_root.join(&workspace.folder);
        if let Err(err) = std::fs::create_dir_all(&workspace_path) {
            return DispatchOutcome::Retry { reason: format!("workspace dir: {err}") };
        }

        if let Err(err) = self.write_snapshots(&workspace_path, workspace).await {
            return DispatchOutcome::Retry { reason: format!("snapshot write failed: {err}") };
        }

        let requested = workspace.container_config.as_ref().map(|c| c.additional_mounts.as_slice()).unwrap_or(&[]);
        let mounts = match resolve_mounts(requested, &self.config.allow_list_path, &self.config.blocked_mount_pattern_list(), workspace.is_main_session) {
            Ok(m) => m,
            Err(err) => return DispatchOutcome::Retry { reason: format!("mount resolution failed: {err}") },
        };

        let session_id = self.store.get_session(&workspace.folder).await.ok().flatten();
        let timeout = workspace
            .container_config
            .as_ref()
            .and_then(|c| c.timeout_ms)
            .map(std::time::Duration::from_millis)
            .unwrap_or_else(|| self.config.container_timeout());

        let tag: String = batch.correlation_id.chars().filter(char::is_ascii_alphanumeric).take(8).collect();
        let container_name = format!("nanoclaw-{}-{tag}", chrono::Utc::now().timestamp_millis());
        self.queue.register_process(chat_id, &container_name).await;

        let request = DispatchRequest {
            container_name,
            workspace_path,
            mounts,
            container_cli: &self.config.container_cli,
            input: AgentInput {
                prompt: batch.prompt_xml.clone(),
                session_id,
                group_folder: workspace.folder.clone(),
                chat_jid: chat_id.to_string(),
                is_main: workspace.is_main_session,
                is_scheduled_task: batch.is_scheduled_task.then_some(true),
            },
            timeout,
        };

        let sink = RelayStatusSink {
            relay: self.status_relay.clone(),
            chat_id: chat_id.to_string(),
            correlation_id: batch.correlation_id.clone(),
        };
        let outcome = dispatch(self.runtime.as_ref(), &sink, request).await;
        self.queue.clear_process(chat_id).await;

        match outcome {
            Ok(outcome) => outcome,
            Err(err) => DispatchOutcome::Retry { reason: err.to_string() },
        }
    }

    async fn write_snapshots(&self, workspace_path: &std::path::Path, workspace: &RegisteredWorkspace) -> Result<(), RouterError> {
        let tasks: Vec<TaskSnapshotInput> = self.store.list_tasks().await?.iter().map(task_snapshot_from).collect();
        write_tasks_snapshot(workspace_path, &workspace.folder, workspace.is_main_session, &tasks)?;

        if workspace.is_main_session {
            let chats = self.store.list_chats().await?;
            let mut snapshot_inputs = Vec::with_capacity(chats.len());
            for chat in chats {
                let registered = self.store.get_workspace(&chat.chat_id).await?.is_some();
                snapshot_inputs.push(ChatSnapshotInput { chat_id: chat.chat_id, name: chat.name, registered });
            }
            write_available_groups_snapshot(workspace_path, &snapshot_inputs)?;
        }
        Ok(())
    }
}

fn task_snapshot_from(task: &ScheduledTask) -> TaskSnapshotInput {
    TaskSnapshotInput {
        id: task.id.clone(),
        workspace_folder: task.workspace_folder.clone(),
        prompt: task.prompt.clone(),
        schedule_kind: task.schedule_kind.to_string(),
        schedule_value: task.schedule_value.clone(),
        status: task.status.to_string(),
    }
}

struct RelayStatusSink {
    relay: Arc<StatusRelay<dyn Messenger>>,
    chat_id: String,
    correlation_id: String,
}

#[async_trait]
impl StatusSink for RelayStatusSink {
    async fn on_status_line(&self, line: &str) {
        self.relay.report_line(&self.chat_id, &self.correlation_id, line).await;
    }
}

#[async_trait]
impl BatchProcessor for Router {
    async fn process(&self, chat_id: &str) -> ProcessOutcome {
        let outcome = build_batch(&self.store, &self.config, chat_id).await;
        let batch = match outcome {
            Ok(BatchOutcome::NoOp) => return ProcessOutcome::Ok,
            Ok(BatchOutcome::CommandHandled { reply }) => {
                self.reply(chat_id, &reply).await;
                return ProcessOutcome::Ok;
            }
            Ok(BatchOutcome::Ready(batch)) => batch,
            Err(err) => {
                tracing::warn!(%chat_id, error = %err, "batch build failed");
                return ProcessOutcome::Retry;
            }
        };

        let workspace = match self.store.get_workspace(chat_id).await {
            Ok(Some(ws)) => ws,
            Ok(None) => return ProcessOutcome::Ok,
            Err(err) => {
                tracing::warn!(%chat_id, error = %err, "workspace lookup failed mid-batch");
                return ProcessOutcome::Retry;
            }
        };

        let dispatch_outcome = self.run_batch(chat_id, &workspace, &batch).await;
        self.status_relay.finish(chat_id, &batch.correlation_id, None).await;

        match dispatch_outcome {
            DispatchOutcome::Success { user_message, new_session_id } => {
                if let Some(handle) = new_session_id {
                    if let Err(err) = self.store.set_session(&workspace.folder, &handle).await {
                        tracing::warn!(%chat_id, error = %err, "failed to persist session handle");
                    }
                }
                if let Some(message) = user_message.filter(|m| !m.is_empty()) {
                    self.reply(chat_id, &message).await;
                }
                if let Err(err) = self.store.advance_last_agent_timestamp(chat_id, &batch.last_message_timestamp).await {
                    tracing::warn!(%chat_id, error = %err, "failed to advance agent cursor");
                    return ProcessOutcome::Retry;
                }
                ProcessOutcome::Ok
            }
            DispatchOutcome::Retry { reason } => {
                tracing::warn!(%chat_id, %reason, "batch dispatch failed, will retry");
                ProcessOutcome::Retry
            }
        }
    }
}

#[async_trait]
impl TaskDispatcher for Router {
    /// `group` tasks interleave into the chat's own queue as a synthetic message so they
    /// share the live session; `isolated` tasks clear the session first so the run starts
    /// fresh. Either way the work goes through C4, never bypassing per-chat serialisation.
    async fn dispatch(&self, task: &ScheduledTask) -> Result<String, String> {
        let workspace = self
            .store
            .get_workspace(&task.chat_id)
            .await
            .map_err(|e| e.to_string())?
            .ok_or_else(|| format!("workspace for chat {} no longer registered", task.chat_id))?;

        if task.context_mode == ContextMode::Isolated {
            self.store.clear_session(&workspace.folder).await.map_err(|e| e.to_string())?;
        }

        let synthetic = StoredMessage {
            message_id: format!("task-{}-{}", task.id, chrono::Utc::now().timestamp_millis()),
            chat_id: task.chat_id.clone(),
            sender_id: SCHEDULER_SENDER_ID.to_string(),
            sender_display_name: "Scheduler".to_string(),
            content: task.prompt.clone(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            origin: MessageOrigin::FromOther,
        };
        self.store.insert_message(&synthetic).await.map_err(|e| e.to_string())?;
        self.queue.enqueue(task.chat_id.clone()).await;
        Ok(format!("enqueued for {}", workspace.folder))
    }
}

#[async_trait]
impl IpcActions for Router {
    async fn is_main(&self, origin_folder: &str) -> bool {
        matches!(self.store.get_main_workspace().await, Ok(Some(ws)) if ws.folder == origin_folder)
    }

    async fn chat_owner_folder(&self, chat_jid: &str) -> Option<String> {
        self.store.get_workspace(chat_jid).await.ok().flatten().map(|ws| ws.folder)
    }

    async fn task_owner_folder(&self, task_id: &str) -> Option<String> {
        self.store.get_task(task_id).await.ok().flatten().map(|task| task.workspace_folder)
    }

    async fn send_message(&self, chat_jid: &str, text: &str) {
        self.reply(chat_jid, text).await;
    }

    async fn send_status(&self, chat_jid: &str, text: &str) {
        let formatted = format!("\u{23F3} {text}");
        if let Err(err) = self.messenger.send(chat_jid, &formatted).await {
            tracing::warn!(%chat_jid, error = %err, "ipc status send failed");
        }
    }

    async fn schedule_task(
        &self,
        target_jid: &str,
        prompt: &str,
        schedule_type: &str,
        schedule_value: &str,
        context_mode: Option<ContextMode>,
    ) -> Result<(), String> {
        let workspace = self
            .store
            .get_workspace(target_jid)
            .await
            .map_err(|e| e.to_string())?
            .ok_or_else(|| format!("chat {target_jid} is not registered"))?;
        let kind: ScheduleKind = schedule_type.parse()?;
        let next_run = nanoclaw_scheduler::initial_run(kind, schedule_value, &self.config.timezone).map_err(|e| e.to_string())?;

        let task = ScheduledTask {
            id: uuid::Uuid::new_v4().to_string(),
            workspace_folder: workspace.folder,
            chat_id: target_jid.to_string(),
            prompt: prompt.to_string(),
            schedule_kind: kind,
            schedule_value: schedule_value.to_string(),
            context_mode: context_mode.unwrap_or(ContextMode::Isolated),
            next_run: next_run.map(|dt| dt.to_rfc3339()),
            last_run: None,
            last_result: None,
            status: TaskStatus::Active,
        };
        self.store.create_task(task).await.map_err(|e| e.to_string())
    }

    async fn pause_task(&self, task_id: &str) -> Result<(), String> {
        self.store.pause_task(task_id).await.map_err(|e| e.to_string())
    }

    async fn resume_task(&self, task_id: &str) -> Result<(), String> {
        self.store.resume_task(task_id).await.map_err(|e| e.to_string())
    }

    async fn cancel_task(&self, task_id: &str) -> Result<(), String> {
        self.store.cancel_task(task_id).await.map_err(|e| e.to_string())
    }

    /// Platform-wide chat rediscovery lives in the messenger adapter, not the router; this
    /// just rewrites the main workspace's `available_groups.json` from what the store
    /// already knows, which is refreshed independently by each inbound event.
    async fn refresh_groups(&self) {
        let Ok(Some(main)) = self.store.get_main_workspace().await else { return };
        let workspace_path = self.config.workspaces_root.join(&main.folder);
        if let Err(err) = self.write_snapshots(&workspace_path, &main).await {
            tracing::warn!(error = %err, "refresh_groups snapshot rewrite failed");
        }
    }

    async fn register_group(
        &self,
        jid: &str,
        name: &str,
        folder: &str,
        trigger: &str,
        container_config: Option<ContainerConfig>,
    ) -> Result<(), String> {
        if self.store.get_workspace_by_folder(folder).await.map_err(|e| e.to_string())?.is_some() {
            return Err(format!("folder {folder:?} is already in use"));
        }
        let workspace = RegisteredWorkspace {
            chat_id: jid.to_string(),
            display_name: name.to_string(),
            folder: folder.to_string(),
            trigger: trigger.to_string(),
            requires_trigger: true,
            is_main_session: false,
            allowed_users: None,
            added_at: chrono::Utc::now().to_rfc3339(),
            container_config,
        };
        self.store.create_workspace(workspace).await.map_err(|e| e.to_string())
    }
}
