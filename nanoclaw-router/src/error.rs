#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error(transparent)]
    Store(#[from] nanoclaw_store::StoreError),
    #[error(transparent)]
    Agent(#[from] nanoclaw_agent::AgentError),
    #[error("registration failed: {0}")]
    Registration(String),
}
