//! Filesystem IPC watcher: polls per-workspace directories for agent-authored records,
//! enforces the authorization table, and hands authorized records to the router.

mod actions;
mod watcher;

pub use actions::IpcActions;
pub use watcher::IpcWatcher;
