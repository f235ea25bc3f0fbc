#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("mount {name} is outside the allow-list root")]
    MountOutsideAllowList { name: String },
    #[error("mount {name} matches a blocked pattern")]
    MountBlocked { name: String },
    #[error("invalid blocked-pattern glob {pattern}: {source}")]
    InvalidGlob { pattern: String, #[source] source: glob::PatternError },
    #[error("failed to spawn agent container: {0}")]
    Spawn(String),
    #[error("agent batch timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("agent exited without a result payload: {0}")]
    NoPayload(String),
    #[error("snapshot write failed: {0}")]
    Snapshot(#[from] std::io::Error),
    #[error("payload serialization failed: {0}")]
    Serde(#[from] serde_json::Error),
}
