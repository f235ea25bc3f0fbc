//! Agent child-process contract.
//!
//! stdin carries one [`AgentInput`] document; stdout carries free text with exactly one
//! [`AgentPayload`] block delimited by [`OUTPUT_START_MARKER`] / [`OUTPUT_END_MARKER`].

use serde::{Deserialize, Serialize};

pub const OUTPUT_START_MARKER: &str = "---NANOCLAW_OUTPUT_START---";
pub const OUTPUT_END_MARKER: &str = "---NANOCLAW_OUTPUT_END---";

/// stderr lines carrying a batch status update are prefixed with this.
pub const STATUS_PREFIX: &str = "STATUS:";

/// stderr lines carrying a human log (not a status) are prefixed with this.
pub const LOG_PREFIX: &str = "[agent-runner]";

/// JSON document written to the agent's stdin.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgentInput {
    pub prompt: String,
    #[serde(rename = "sessionId", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(rename = "groupFolder")]
    pub group_folder: String,
    #[serde(rename = "chatJid")]
    pub chat_jid: String,
    #[serde(rename = "isMain")]
    pub is_main: bool,
    #[serde(rename = "isScheduledTask", skip_serializing_if = "Option::is_none")]
    pub is_scheduled_task: Option<bool>,
}

/// Top-level status of one agent run, as reported in the stdout payload block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentOutcome {
    Success,
    Error,
}

/// What kind of user-facing artifact the agent produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OutputType {
    Message,
    Log,
}

/// The `result` object inside a successful (or partially-successful) [`AgentPayload`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgentResultPayload {
    #[serde(rename = "outputType")]
    pub output_type: OutputType,
    #[serde(rename = "userMessage", skip_serializing_if = "Option::is_none")]
    pub user_message: Option<String>,
    #[serde(rename = "internalLog", skip_serializing_if = "Option::is_none")]
    pub internal_log: Option<String>,
}

/// The payload block the dispatcher extracts from the agent's stdout.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgentPayload {
    pub status: AgentOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<AgentResultPayload>,
    #[serde(rename = "newSessionId", skip_serializing_if = "Option::is_none")]
    pub new_session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Extracts and parses the payload block from the agent's full stdout text. Returns `None`
/// when the markers are absent (the agent never emitted a payload) or malformed.
pub fn extract_payload(stdout: &str) -> Option<Result<AgentPayload, serde_json::Error>> {
    let start = stdout.find(OUTPUT_START_MARKER)? + OUTPUT_START_MARKER.len();
    let end = stdout[start..].find(OUTPUT_END_MARKER)? + start;
    let body = stdout[start..end].trim();
    Some(serde_json::from_str(body))
}
