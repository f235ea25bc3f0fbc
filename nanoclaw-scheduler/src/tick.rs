use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use nanoclaw_store::{ScheduledTask, Store};

use crate::next_run;

/// Dispatches a due task through the router's work queue so per-chat serialization holds even
/// for scheduler-originated work, and reports the outcome back for logging.
#[async_trait]
pub trait TaskDispatcher: Send + Sync {
    async fn dispatch(&self, task: &ScheduledTask) -> Result<String, String>;
}

pub struct Scheduler {
    store: Arc<Store>,
    dispatcher: Arc<dyn TaskDispatcher>,
    tick_interval: Duration,
    default_timezone: String,
}

impl Scheduler {
    pub fn new(
        store: Arc<Store>,
        dispatcher: Arc<dyn TaskDispatcher>,
        tick_interval: Duration,
        default_timezone: String,
    ) -> Self {
        Self { store, dispatcher, tick_interval, default_timezone }
    }

    /// Runs the tick loop forever. Intended to be spawned as its own task.
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.tick_interval);
        loop {
            ticker.tick().await;
            if let Err(err) = self.tick_once().await {
                tracing::error!(error = %err, "scheduler tick failed");
            }
        }
    }

    pub async fn tick_once(&self) -> Result<(), nanoclaw_store::StoreError> {
        let now = Utc::now();
        let due = self.store.get_due_tasks(&now.to_rfc3339()).await?;
        for task in due {
            self.fire(task, now).await;
        }
        Ok(())
    }

    async fn fire(&self, task: ScheduledTask, fired_at: chrono::DateTime<Utc>) {
        let started = tokio::time::Instant::now();
        let outcome = self.dispatcher.dispatch(&task).await;
        let duration_ms = started.elapsed().as_millis() as i64;

        let next_run = match next_run::next_after(task.schedule_kind, &task.schedule_value, &self.default_timezone, fired_at) {
            Ok(next) => next,
            Err(err) => {
                tracing::warn!(task_id = %task.id, error = %err, "failed to compute next run, pausing task");
                if let Err(e) = self.store.pause_task(&task.id).await {
                    tracing::error!(task_id = %task.id, error = %e, "failed to pause task after schedule error");
                }
                None
            }
        };

        let (outcome_label, detail) = match &outcome {
            Ok(summary) => ("success", Some(summary.as_str())),
            Err(err) => ("error", Some(err.as_str())),
        };

        if let Err(err) = self
            .store
            .record_task_fire(&task.id, next_run.map(|dt| dt.to_rfc3339()).as_deref(), &fired_at.to_rfc3339(), detail)
            .await
        {
            tracing::error!(task_id = %task.id, error = %err, "failed to record task fire");
        }
        if let Err(err) = self
            .store
            .append_task_run_log(&task.id, &fired_at.to_rfc3339(), duration_ms, outcome_label, detail)
            .await
        {
            tracing::error!(task_id = %task.id, error = %err, "failed to append task run log");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nanoclaw_protocol::{ContextMode, ScheduleKind, TaskStatus};
    use nanoclaw_store::RegisteredWorkspace;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingDispatcher {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TaskDispatcher for CountingDispatcher {
        async fn dispatch(&self, _task: &ScheduledTask) -> Result<String, String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok("ok".to_string())
        }
    }

    fn once_task(id: &str, next_run: &str) -> ScheduledTask {
        ScheduledTask {
            id: id.to_string(),
            workspace_folder: "main".to_string(),
            chat_id: "chat-1".to_string(),
            prompt: "run it".to_string(),
            schedule_kind: ScheduleKind::Once,
            schedule_value: next_run.to_string(),
            context_mode: ContextMode::Isolated,
            next_run: Some(next_run.to_string()),
            last_run: None,
            last_result: None,
            status: TaskStatus::Active,
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn due_once_task_fires_and_completes() {
        let store = Arc::new(Store::in_memory().unwrap());
        store
            .create_workspace(RegisteredWorkspace {
                chat_id: "chat-1".into(),
                display_name: "Main".into(),
                folder: "main".into(),
                trigger: "".into(),
                requires_trigger: false,
                is_main_session: true,
                allowed_users: None,
                added_at: "2026-01-01T00:00:00Z".into(),
                container_config: None,
            })
            .await
            .unwrap();
        store.create_task(once_task("t1", "2026-01-01T00:00:00Z")).await.unwrap();

        let dispatcher = Arc::new(CountingDispatcher { calls: AtomicUsize::new(0) });
        let scheduler = Scheduler::new(store.clone(), dispatcher.clone(), Duration::from_secs(30), "UTC".to_string());
        scheduler.tick_once().await.unwrap();

        assert_eq!(dispatcher.calls.load(Ordering::SeqCst), 1);
        let fetched = store.get_task("t1").await.unwrap().unwrap();
        assert_eq!(fetched.status, TaskStatus::Completed);
        assert_eq!(fetched.next_run, None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn not_yet_due_task_does_not_fire() {
        let store = Arc::new(Store::in_memory().unwrap());
        store.create_task(once_task("t1", "2099-01-01T00:00:00Z")).await.unwrap();

        let dispatcher = Arc::new(CountingDispatcher { calls: AtomicUsize::new(0) });
        let scheduler = Scheduler::new(store.clone(), dispatcher.clone(), Duration::from_secs(30), "UTC".to_string());
        scheduler.tick_once().await.unwrap();

        assert_eq!(dispatcher.calls.load(Ordering::SeqCst), 0);
    }
}
