//! NanoClaw daemon: wires the store, messenger, agent dispatcher, router, IPC watcher, and
//! scheduler into one long-running process and runs until SIGINT/SIGTERM.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use nanoclaw::{check_container_subsystem, logging, wait_for_shutdown_signal};
use nanoclaw_agent::ProcessContainerRuntime;
use nanoclaw_config::OperatorConfig;
use nanoclaw_ipc::IpcWatcher;
use nanoclaw_messenger::{CommandSpec, Messenger, StatusRelay};
use nanoclaw_protocol::NormalizedMessage;
use nanoclaw_router::{QueueConfig, Router, WorkQueue};
use nanoclaw_scheduler::Scheduler;
use nanoclaw_store::Store;
use nanoclaw_telegram::TelegramMessenger;
use tokio::sync::mpsc;

#[derive(Parser, Debug)]
#[command(name = "nanoclaw")]
#[command(about = "Chat-driven agent orchestrator")]
struct Args {
    /// Directory to read a project `.env` from, in addition to XDG config.toml. Defaults to
    /// the current directory.
    #[arg(long, value_name = "DIR")]
    config_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    if let Err(err) = nanoclaw_config::load_and_apply(args.config_dir.as_deref()) {
        eprintln!("fatal: failed to load configuration: {err}");
        std::process::exit(1);
    }

    let _log_guard = logging::init();

    let config = match OperatorConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(error = %err, "fatal configuration error");
            std::process::exit(1);
        }
    };

    if let Err(reason) = check_container_subsystem(&config.container_cli).await {
        tracing::error!(container_cli = %config.container_cli, %reason, "container subsystem unavailable at startup");
        std::process::exit(1);
    }

    let store = match Store::new(&config.storage_root) {
        Ok(store) => Arc::new(store),
        Err(err) => {
            tracing::error!(error = %err, "failed to open store");
            std::process::exit(1);
        }
    };

    let messenger = match TelegramMessenger::from_env() {
        Ok(messenger) => Arc::new(messenger),
        Err(err) => {
            tracing::error!(error = %err, "messenger credentials unavailable at startup");
            std::process::exit(1);
        }
    };
    if let Err(err) = messenger.connect().await {
        tracing::error!(error = %err, "messenger failed to connect");
        std::process::exit(1);
    }

    let commands = [
        CommandSpec { name: "help".to_string(), description: "show available commands".to_string() },
        CommandSpec { name: "new".to_string(), description: "start a fresh session for this chat".to_string() },
        CommandSpec { name: "register".to_string(), description: "register this chat with nanoclaw".to_string() },
    ];
    if let Err(err) = messenger.register_commands(&commands).await {
        tracing::warn!(error = %err, "failed to register command menu");
    }

    let messenger_dyn: Arc<dyn Messenger> = messenger.clone();
    let status_relay = Arc::new(StatusRelay::new(messenger_dyn.clone(), Duration::from_millis(config.status_debounce_ms)));
    let runtime = Arc::new(ProcessContainerRuntime);
    let queue = WorkQueue::new(QueueConfig {
        backoff_base: Duration::from_millis(config.queue_backoff_base_ms),
        backoff_cap: Duration::from_millis(config.queue_backoff_cap_ms),
        max_retries: config.queue_max_retries,
        container_cli: config.container_cli.clone(),
    });
    let router = Router::new(store.clone(), messenger_dyn.clone(), status_relay, runtime, queue.clone(), config.clone());

    let ipc_watcher = IpcWatcher::new(config.ipc_root.clone(), Duration::from_millis(config.ipc_poll_interval_ms));
    let ipc_actions: Arc<dyn nanoclaw_ipc::IpcActions> = router.clone();
    tokio::spawn(ipc_watcher.run(ipc_actions));

    let task_dispatcher: Arc<dyn nanoclaw_scheduler::TaskDispatcher> = router.clone();
    let scheduler = Scheduler::new(
        store.clone(),
        task_dispatcher,
        Duration::from_millis(config.scheduler_tick_interval_ms),
        config.timezone.clone(),
    );
    tokio::spawn(scheduler.run());

    if messenger.needs_polling() {
        let poll_interval = messenger.poll_interval();
        tokio::spawn(router.clone().run_ingestion_tail(poll_interval));
    }

    if let Err(err) = router.recover_and_greet().await {
        tracing::warn!(error = %err, "startup recovery scan failed");
    }

    let (tx, mut rx) = mpsc::channel::<NormalizedMessage>(256);
    if let Err(err) = messenger.start_listener(tx).await {
        tracing::error!(error = %err, "messenger listener failed to start");
        std::process::exit(1);
    }

    tracing::info!("nanoclaw started");
    let inbound_router = router.clone();
    let inbound_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if let Err(err) = inbound_router.handle_inbound(&msg).await {
                tracing::warn!(chat_id = %msg.chat_id, error = %err, "failed to handle inbound message");
            }
        }
    });

    wait_for_shutdown_signal().await;
    tracing::info!("shutdown signal received, draining in-flight batches");
    inbound_task.abort();
    queue.shutdown(config.shutdown_grace()).await;
    tracing::info!("nanoclaw stopped");
}
