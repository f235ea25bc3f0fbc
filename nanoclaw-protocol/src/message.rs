//! Normalized messenger event.

use serde::{Deserialize, Serialize};

/// Whether the chat a message arrived on is a 1-to-1 conversation or a group.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatType {
    Private,
    Group,
}

/// One inbound event as normalized by a [`Messenger`](crate) adapter, independent of the
/// originating platform. Media is flattened to a textual placeholder before this point;
/// mentions are flattened to `@name`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NormalizedMessage {
    pub id: String,
    pub chat_id: String,
    pub sender_id: String,
    pub sender_display_name: String,
    pub content: String,
    /// ISO-8601, string-orderable.
    pub timestamp: String,
    pub chat_type: ChatType,
}
