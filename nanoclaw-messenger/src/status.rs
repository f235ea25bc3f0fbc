use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::messenger::Messenger;

const STATUS_PREFIX: &str = "⏳ ";

struct Entry {
    last_text: String,
    last_emit: Instant,
    started: bool,
}

/// Collapses an agent's `STATUS:` stderr lines into a single edit-in-place platform message
/// per in-flight batch. Identical lines, or any line arriving within the debounce window of
/// the previous update, are coalesced into the prior update rather than sent again.
pub struct StatusRelay<M: Messenger + ?Sized> {
    messenger: Arc<M>,
    window: Duration,
    state: Mutex<HashMap<(String, String), Entry>>,
}

impl<M: Messenger + ?Sized> StatusRelay<M> {
    pub fn new(messenger: Arc<M>, window: Duration) -> Self {
        Self { messenger, window, state: Mutex::new(HashMap::new()) }
    }

    /// Reports one `STATUS:` line for a batch keyed by `(chat_id, correlation_id)`.
    pub async fn report_line(&self, chat_id: &str, correlation_id: &str, line: &str) {
        let now = Instant::now();
        let prefixed = format!("{STATUS_PREFIX}{line}");
        let key = (chat_id.to_string(), correlation_id.to_string());

        let decision = {
            let mut state = self.state.lock().await;
            let entry = state.entry(key).or_insert_with(|| Entry {
                last_text: String::new(),
                last_emit: now - self.window - Duration::from_secs(1),
                started: false,
            });
            let stale_duplicate =
                entry.started && entry.last_text == prefixed && now.duration_since(entry.last_emit) < self.window;
            if stale_duplicate {
                None
            } else {
                let is_first = !entry.started;
                entry.last_text = prefixed.clone();
                entry.last_emit = now;
                entry.started = true;
                Some(is_first)
            }
        };

        let Some(is_first) = decision else { return };
        if let Err(err) = self
            .messenger
            .send_or_update_status(chat_id, correlation_id, &prefixed, is_first, None)
            .await
        {
            tracing::warn!(%chat_id, %correlation_id, error = %err, "status relay update failed");
        }
    }

    /// Terminal transition for a batch: overwrites the status with `terminal_text` when
    /// given (an error summary), or simply clears relay tracking on a clean send so the
    /// next batch starts fresh.
    pub async fn finish(&self, chat_id: &str, correlation_id: &str, terminal_text: Option<&str>) {
        if let Some(text) = terminal_text {
            let is_first = {
                let state = self.state.lock().await;
                !state
                    .get(&(chat_id.to_string(), correlation_id.to_string()))
                    .map(|e| e.started)
                    .unwrap_or(false)
            };
            if let Err(err) = self
                .messenger
                .send_or_update_status(chat_id, correlation_id, text, is_first, None)
                .await
            {
                tracing::warn!(%chat_id, %correlation_id, error = %err, "status relay terminal update failed");
            }
        }
        self.messenger.clear_status(chat_id, correlation_id).await;
        self.state.lock().await.remove(&(chat_id.to_string(), correlation_id.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use nanoclaw_protocol::NormalizedMessage;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    use crate::error::MessengerError;
    use crate::messenger::CommandSpec;

    #[derive(Default)]
    struct RecordingMessenger {
        sends: AtomicUsize,
    }

    #[async_trait]
    impl Messenger for RecordingMessenger {
        async fn connect(&self) -> Result<(), MessengerError> {
            Ok(())
        }
        async fn send(&self, _chat_id: &str, _text: &str) -> Result<(), MessengerError> {
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
            self.sends.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn clear_status(&self, _chat_id: &str, _correlation_id: &str) {}
        async fn register_commands(&self, _commands: &[CommandSpec]) -> Result<(), MessengerError> {
            Ok(())
        }
        async fn start_listener(&self, _tx: mpsc::Sender<NormalizedMessage>) -> Result<(), MessengerError> {
            Ok(())
        }
        fn needs_polling(&self) -> bool {
            false
        }
        fn poll_interval(&self) -> Duration {
            Duration::from_secs(1)
        }
    }

    #[tokio::test]
    async fn identical_lines_within_window_are_coalesced() {
        let messenger = Arc::new(RecordingMessenger::default());
        let relay = StatusRelay::new(messenger.clone(), Duration::from_secs(2));

        relay.report_line("chat-1", "corr-1", "thinking").await;
        relay.report_line("chat-1", "corr-1", "thinking").await;

        assert_eq!(messenger.sends.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn distinct_correlation_ids_get_independent_messages() {
        let messenger = Arc::new(RecordingMessenger::default());
        let relay = StatusRelay::new(messenger.clone(), Duration::from_secs(2));

        relay.report_line("chat-1", "corr-1", "thinking").await;
        relay.report_line("chat-1", "corr-2", "thinking").await;

        assert_eq!(messenger.sends.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn finish_clears_tracking_so_next_batch_starts_fresh() {
        let messenger = Arc::new(RecordingMessenger::default());
        let relay = StatusRelay::new(messenger.clone(), Duration::from_secs(2));

        relay.report_line("chat-1", "corr-1", "thinking").await;
        relay.finish("chat-1", "corr-1", None).await;

        assert!(relay.state.lock().await.is_empty());
    }
}
