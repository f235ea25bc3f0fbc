//! Exercises the same composition `main.rs` performs — `Router` behind a `WorkQueue`, an
//! `IpcWatcher` polling a real directory, and a `Scheduler` ticking against a real store —
//! using scripted test doubles in place of the container runtime and messenger.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use nanoclaw_agent::{AgentProcess, ContainerRuntime, ResolvedMount};
use nanoclaw_config::OperatorConfig;
use nanoclaw_ipc::IpcWatcher;
use nanoclaw_messenger::{CommandSpec, Messenger, MessengerError, StatusRelay};
use nanoclaw_protocol::{ContextMode, NormalizedMessage, ScheduleKind, TaskStatus};
use nanoclaw_router::{QueueConfig, Router, WorkQueue};
use nanoclaw_scheduler::{Scheduler, TaskDispatcher};
use nanoclaw_store::{RegisteredWorkspace, ScheduledTask, Store};
use tokio::sync::Mutex;

#[derive(Default)]
struct RecordingMessenger {
    sent: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn connect(&self) -> Result<(), MessengerError> {
        Ok(())
    }
    async fn send(&self, chat_id: &str, text: &str) -> Result<(), MessengerError> {
        self.sent.lock().await.push((chat_id.to_string(), text.to_string()));
        Ok(())
    }
    async fn send_or_update_status(
        &self,
        _chat_id: &str,
        _correlation_id: &str,
        _text: &str,
        _is_first: bool,
        _reply_to: Option<&str>,
    ) -> Result<(), MessengerError> {
        Ok(())
    }
    async fn clear_status(&self, _chat_id: &str, _correlation_id: &str) {}
    async fn register_commands(&self, _commands: &[CommandSpec]) -> Result<(), MessengerError> {
        Ok(())
    }
    async fn start_listener(&self, _tx: tokio::sync::mpsc::Sender<NormalizedMessage>) -> Result<(), MessengerError> {
        Ok(())
    }
    fn needs_polling(&self) -> bool {
        false
    }
    fn poll_interval(&self) -> Duration {
        Duration::from_secs(1)
    }
}

struct ScriptedProcess {
    stdout: Vec<String>,
}

#[async_trait]
impl AgentProcess for ScriptedProcess {
    async fn write_stdin(&mut self, _input: &[u8]) -> Result<(), nanoclaw_agent::AgentError> {
        Ok(())
    }
    async fn next_stdout_line(&mut self) -> Result<Option<String>, nanoclaw_agent::AgentError> {
        Ok(if self.stdout.is_empty() { None } else { Some(self.stdout.remove(0)) })
    }
    async fn next_stderr_line(&mut self) -> Result<Option<String>, nanoclaw_agent::AgentError> {
        Ok(None)
    }
    async fn wait(&mut self) -> Result<Option<i32>, nanoclaw_agent::AgentError> {
        Ok(Some(0))
    }
    fn terminate(&mut self) {}
    fn kill(&mut self) {}
}

struct ScriptedRuntime {
    calls: AtomicUsize,
}

#[async_trait]
impl ContainerRuntime for ScriptedRuntime {
    async fn launch(
        &self,
        _name: &str,
        _workspace_path: &PathBuf,
        _mounts: &[ResolvedMount],
        _cli: &str,
    ) -> Result<Box<dyn AgentProcess>, nanoclaw_agent::AgentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let stdout = "---NANOCLAW_OUTPUT_START---\n{\"status\":\"success\",\"result\":{\"outputType\":\"message\",\"userMessage\":\"done\"}}\n---NANOCLAW_OUTPUT_END---\n";
        Ok(Box::new(ScriptedProcess { stdout: stdout.lines().map(str::to_string).collect() }))
    }
}

fn config(tmp: &tempfile::TempDir) -> OperatorConfig {
    std::env::set_var("NANOCLAW_ASSISTANT_NAME", "Andy");
    std::env::set_var("NANOCLAW_WORKSPACES_ROOT", tmp.path().join("workspaces").to_str().unwrap());
    std::env::set_var("NANOCLAW_MOUNT_ALLOWLIST", tmp.path().join("allowlist.txt").to_str().unwrap());
    let config = OperatorConfig::from_env().unwrap();
    std::env::remove_var("NANOCLAW_ASSISTANT_NAME");
    std::env::remove_var("NANOCLAW_WORKSPACES_ROOT");
    std::env::remove_var("NANOCLAW_MOUNT_ALLOWLIST");
    config
}

fn build_router(store: Arc<Store>, messenger: Arc<RecordingMessenger>, runtime: Arc<ScriptedRuntime>, config: OperatorConfig) -> Arc<Router> {
    let messenger_dyn: Arc<dyn Messenger> = messenger.clone();
    let status_relay = Arc::new(StatusRelay::new(messenger_dyn.clone(), Duration::from_millis(10)));
    let queue = WorkQueue::new(QueueConfig {
        backoff_base: Duration::from_millis(5),
        backoff_cap: Duration::from_millis(20),
        max_retries: 2,
        container_cli: "docker".to_string(),
    });
    Router::new(store, messenger_dyn, status_relay, runtime, queue, config)
}

/// A `register_group` IPC file dropped by the main workspace is picked up by a real
/// `IpcWatcher` poll loop and reaches the store as a new workspace, the same path
/// `main.rs` wires `IpcWatcher::run(router.clone())` through.
#[tokio::test(flavor = "multi_thread")]
async fn ipc_watcher_applies_a_register_group_record_from_the_main_workspace() {
    let tmp = tempfile::tempdir().unwrap();
    let store = Arc::new(Store::in_memory().unwrap());
    store
        .create_workspace(RegisteredWorkspace {
            chat_id: "main-chat".to_string(),
            display_name: "Main".to_string(),
            folder: "main".to_string(),
            trigger: String::new(),
            requires_trigger: false,
            is_main_session: true,
            allowed_users: None,
            added_at: "2026-01-01T00:00:00Z".to_string(),
            container_config: None,
        })
        .await
        .unwrap();

    let messenger = Arc::new(RecordingMessenger::default());
    let runtime = Arc::new(ScriptedRuntime { calls: AtomicUsize::new(0) });
    let router = build_router(store.clone(), messenger, runtime, config(&tmp));

    let ipc_root = tmp.path().join("ipc");
    let tasks_dir = ipc_root.join("main").join("tasks");
    tokio::fs::create_dir_all(&tasks_dir).await.unwrap();
    tokio::fs::write(
        tasks_dir.join("register.json"),
        br#"{"type":"register_group","jid":"new-group","name":"New Group","folder":"newgroup","trigger":"@Andy"}"#,
    )
    .await
    .unwrap();

    let watcher = IpcWatcher::new(ipc_root, Duration::from_millis(10));
    let ipc_actions: Arc<dyn nanoclaw_ipc::IpcActions> = router.clone();
    tokio::spawn(watcher.run(ipc_actions));

    for _ in 0..100 {
        if store.get_workspace("new-group").await.unwrap().is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let workspace = store.get_workspace("new-group").await.unwrap().unwrap();
    assert_eq!(workspace.folder, "newgroup");
    assert!(!workspace.is_main_session);
}

/// A due scheduled task is picked up by a real `Scheduler` tick loop and dispatched through
/// the router's work queue, the same path `main.rs` wires `Scheduler::new(..., router.clone(),
/// ...).run()` through.
#[tokio::test(flavor = "multi_thread")]
async fn scheduler_tick_dispatches_a_due_task_through_the_router() {
    let tmp = tempfile::tempdir().unwrap();
    let store = Arc::new(Store::in_memory().unwrap());
    store
        .create_workspace(RegisteredWorkspace {
            chat_id: "g1".to_string(),
            display_name: "Team".to_string(),
            folder: "team".to_string(),
            trigger: "@Andy".to_string(),
            requires_trigger: true,
            is_main_session: false,
            allowed_users: None,
            added_at: "2026-01-01T00:00:00Z".to_string(),
            container_config: None,
        })
        .await
        .unwrap();
    store
        .create_task(ScheduledTask {
            id: "t1".to_string(),
            workspace_folder: "team".to_string(),
            chat_id: "g1".to_string(),
            prompt: "daily digest".to_string(),
            schedule_kind: ScheduleKind::Once,
            schedule_value: "2026-01-01T00:00:00Z".to_string(),
            context_mode: ContextMode::Isolated,
            next_run: Some("2000-01-01T00:00:00Z".to_string()),
            last_run: None,
            last_result: None,
            status: TaskStatus::Active,
        })
        .await
        .unwrap();

    let messenger = Arc::new(RecordingMessenger::default());
    let runtime = Arc::new(ScriptedRuntime { calls: AtomicUsize::new(0) });
    let router = build_router(store.clone(), messenger, runtime.clone(), config(&tmp));

    let dispatcher: Arc<dyn TaskDispatcher> = router.clone();
    let scheduler = Scheduler::new(store.clone(), dispatcher, Duration::from_millis(10), "UTC".to_string());
    tokio::spawn(scheduler.run());

    for _ in 0..200 {
        if runtime.calls.load(Ordering::SeqCst) > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert_eq!(runtime.calls.load(Ordering::SeqCst), 1);
    let task = store.get_task("t1").await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
}
