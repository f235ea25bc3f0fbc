//! Per-chat work queue: serialises processing within a chat while running many chats
//! concurrently, tracks the in-flight container per chat for shutdown, and retries failed
//! batches with capped exponential backoff.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Result of processing one chat's pending batch.
pub enum ProcessOutcome {
    Ok,
    Retry,
}

/// Injected after construction so the queue and its owner (which implements this trait over
/// itself) don't need a true reference cycle to be built together.
#[async_trait]
pub trait BatchProcessor: Send + Sync {
    async fn process(&self, chat_id: &str) -> ProcessOutcome;
}

#[derive(Default)]
struct ChatState {
    scheduled: bool,
    dirty: bool,
    retry_count: u32,
    container_name: Option<String>,
}

pub struct QueueConfig {
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
    pub max_retries: u32,
    pub container_cli: String,
}

pub struct WorkQueue {
    processor: OnceLock<std::sync::Arc<dyn BatchProcessor>>,
    states: Mutex<HashMap<String, ChatState>>,
    inflight: Mutex<HashMap<String, JoinHandle<()>>>,
    closed: AtomicBool,
    config: QueueConfig,
}

impl WorkQueue {
    pub fn new(config: QueueConfig) -> std::sync::Arc<Self> {
        std::sync::Arc::new(Self {
            processor: OnceLock::new(),
            states: Mutex::new(HashMap::new()),
            inflight: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
            config,
        })
    }

    /// Wires the callback that actually builds and dispatches a batch. Must be called
    /// exactly once, before the first `enqueue`.
    pub fn set_processor(&self, processor: std::sync::Arc<dyn BatchProcessor>) {
        let _ = self.processor.set(processor);
    }

    /// Idempotent: collapses into the dirty bit if `chat_id` is already scheduled.
    pub async fn enqueue(self: &std::sync::Arc<Self>, chat_id: String) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        let mut states = self.states.lock().await;
        let state = states.entry(chat_id.clone()).or_default();
        if state.scheduled {
            state.dirty = true;
            return;
        }
        state.scheduled = true;
        drop(states);

        let this = self.clone();
        let worker_chat_id = chat_id.clone();
        let handle = tokio::spawn(async move {
            this.worker_loop(worker_chat_id).await;
        });
        self.inflight.lock().await.insert(chat_id, handle);
    }

    /// Records the container currently running this chat's batch so `shutdown` can signal
    /// it. Cleared by the processor once the batch completes.
    pub async fn register_process(&self, chat_id: &str, container_name: &str) {
        let mut states = self.states.lock().await;
        states.entry(chat_id.to_string()).or_default().container_name = Some(container_name.to_string());
    }

    pub async fn clear_process(&self, chat_id: &str) {
        if let Some(state) = self.states.lock().await.get_mut(chat_id) {
            state.container_name = None;
        }
    }

    async fn worker_loop(self: std::sync::Arc<Self>, chat_id: String) {
        let processor = self
            .processor
            .get()
            .cloned()
            .expect("WorkQueue::set_processor must be called before enqueue");
        loop {
            let outcome = processor.process(&chat_id).await;
            let mut states = self.states.lock().await;
            let state = states.entry(chat_id.clone()).or_default();
            match outcome {
                ProcessOutcome::Ok => {
                    state.retry_count = 0;
                    if state.dirty {
                        state.dirty = false;
                        continue;
                    }
                    state.scheduled = false;
                    break;
                }
                ProcessOutcome::Retry => {
                    state.retry_count += 1;
                    if state.retry_count > self.config.max_retries {
                        tracing::error!(%chat_id, "batch retries exhausted, giving up");
                        state.scheduled = false;
                        state.retry_count = 0;
                        break;
                    }
                    let delay = backoff_delay(state.retry_count, self.config.backoff_base, self.config.backoff_cap);
                    drop(states);
                    tokio::time::sleep(delay).await;
                    continue;
                }
            }
        }
        self.inflight.lock().await.remove(&chat_id);
    }

    /// Closes the queue to new work, signals every in-flight container (SIGTERM), then
    /// waits up to `deadline` for workers to finish before sending SIGKILL to anything left.
    pub async fn shutdown(&self, deadline: Duration) {
        self.closed.store(true, Ordering::SeqCst);
        for name in self.container_names().await {
            self.signal_container(&name, "TERM").await;
        }

        let handles: Vec<JoinHandle<()>> = {
            let mut map = self.inflight.lock().await;
            std::mem::take(&mut *map).into_values().collect()
        };
        if tokio::time::timeout(deadline, futures::future::join_all(handles)).await.is_err() {
            for name in self.container_names().await {
                self.signal_container(&name, "KILL").await;
            }
        }
    }

    async fn container_names(&self) -> Vec<String> {
        self.states.lock().await.values().filter_map(|s| s.container_name.clone()).collect()
    }

    async fn signal_container(&self, name: &str, signal: &str) {
        let result = Command::new(&self.config.container_cli).arg("kill").arg("--signal").arg(signal).arg(name).status().await;
        if let Err(err) = result {
            tracing::warn!(container = name, signal, error = %err, "failed to signal container during shutdown");
        }
    }
}

/// Deterministic capped exponential backoff: `base * 2^(attempt-1)`, capped at `cap`.
fn backoff_delay(attempt: u32, base: Duration, cap: Duration) -> Duration {
    let factor = 1u64.checked_shl(attempt.saturating_sub(1)).unwrap_or(u64::MAX);
    base.saturating_mul(factor.min(u32::MAX as u64) as u32).min(cap)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
    use std::sync::Arc;

    #[test]
    fn backoff_doubles_and_caps() {
        let base = Duration::from_secs(1);
        let cap = Duration::from_secs(10);
        assert_eq!(backoff_delay(1, base, cap), Duration::from_secs(1));
        assert_eq!(backoff_delay(2, base, cap), Duration::from_secs(2));
        assert_eq!(backoff_delay(3, base, cap), Duration::from_secs(4));
        assert_eq!(backoff_delay(10, base, cap), cap);
    }

    struct CountingProcessor {
        calls: AtomicUsize,
        fail_until: AtomicUsize,
    }

    #[async_trait]
    impl BatchProcessor for CountingProcessor {
        async fn process(&self, _chat_id: &str) -> ProcessOutcome {
            let n = self.calls.fetch_add(1, AtomicOrdering::SeqCst) + 1;
            if n < self.fail_until.load(AtomicOrdering::SeqCst) {
                ProcessOutcome::Retry
            } else {
                ProcessOutcome::Ok
            }
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn enqueue_while_scheduled_collapses_via_dirty_bit() {
        let processor = Arc::new(CountingProcessor { calls: AtomicUsize::new(0), fail_until: AtomicUsize::new(0) });
        let queue = WorkQueue::new(QueueConfig {
            backoff_base: Duration::from_millis(1),
            backoff_cap: Duration::from_millis(10),
            max_retries: 3,
            container_cli: "docker".to_string(),
        });
        queue.set_processor(processor.clone());

        queue.enqueue("chat-1".to_string()).await;
        queue.enqueue("chat-1".to_string()).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        // two enqueues while the first run is still pending collapse into at most two runs
        assert!(processor.calls.load(AtomicOrdering::SeqCst) <= 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn retries_exhaust_after_max_attempts() {
        let processor = Arc::new(CountingProcessor { calls: AtomicUsize::new(0), fail_until: AtomicUsize::new(100) });
        let queue = WorkQueue::new(QueueConfig {
            backoff_base: Duration::from_millis(1),
            backoff_cap: Duration::from_millis(5),
            max_retries: 2,
            container_cli: "docker".to_string(),
        });
        queue.set_processor(processor.clone());

        queue.enqueue("chat-1".to_string()).await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(processor.calls.load(AtomicOrdering::SeqCst), 3);
    }
}
