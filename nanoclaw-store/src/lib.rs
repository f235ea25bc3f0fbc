//! Persistent store for NanoClaw: chats, messages, registered workspaces, agent sessions,
//! router cursors, and scheduled tasks, backed by an embedded SQLite database.

mod error;
mod schema;
mod store;
mod types;

pub use error::StoreError;
pub use schema::migrate;
pub use store::{Store, DISCOVERY_SENTINEL_CHAT_ID};
pub use types::{Chat, MessageOrigin, RegisteredWorkspace, ScheduledTask, StoredMessage, TaskRunLogEntry};
