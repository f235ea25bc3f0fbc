use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;

use nanoclaw_protocol::NormalizedMessage;

use crate::error::MessengerError;

/// A command the platform may expose in its UI (e.g. a Telegram bot command menu entry).
#[derive(Clone, Debug)]
pub struct CommandSpec {
    pub name: String,
    pub description: String,
}

/// Normalises one chat platform into a send interface and an inbound event stream.
///
/// Implementations fall into two shapes: push-based (a WebSocket or long-poll subscription
/// delivers events as they happen; `needs_polling` returns `false`) and pull-based (events
/// only ever land in the store via a separate tailing loop; `needs_polling` returns `true`
/// and `start_listener` may be a no-op).
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Establishes the platform session. Must fail fast when credentials are absent rather
    /// than retrying silently.
    async fn connect(&self) -> Result<(), MessengerError>;

    /// Sends a plain message. Failures are the caller's to log; they must never abort the
    /// batch that produced the message.
    async fn send(&self, chat_id: &str, text: &str) -> Result<(), MessengerError>;

    /// Maintains at most one platform message per `(chat_id, correlation_id)`, appending
    /// `text` on successive calls with `is_first = false`. If an edit is rejected by the
    /// platform (message too old or deleted), implementations allocate a fresh message and
    /// continue transparently.
    async fn send_or_update_status(
        &self,
        chat_id: &str,
        correlation_id: &str,
        text: &str,
        is_first: bool,
        reply_to: Option<&str>,
    ) -> Result<(), MessengerError>;

    /// Forgets the tracked status message id(s) for this correlation id so a future batch on
    /// the same chat starts a fresh status message.
    async fn clear_status(&self, chat_id: &str, correlation_id: &str);

    /// Best-effort registration of the command menu. A no-op for platforms without one.
    async fn register_commands(&self, commands: &[CommandSpec]) -> Result<(), MessengerError>;

    /// Subscribes to inbound events, forwarding normalised messages to `tx` until the
    /// adapter is dropped or the channel closes. Returns once the subscription is
    /// established, not when it ends.
    async fn start_listener(&self, tx: mpsc::Sender<NormalizedMessage>) -> Result<(), MessengerError>;

    /// When `true`, the router must also tail the persistent store for this adapter's
    /// chats; when `false`, every inbound event arrives via `start_listener`.
    fn needs_polling(&self) -> bool;

    /// Cadence hint for the tailing loop when `needs_polling()` is true.
    fn poll_interval(&self) -> Duration;
}
