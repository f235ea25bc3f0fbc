#[derive(Debug, thiserror::Error)]
pub enum MessengerError {
    #[error("missing credentials for messenger adapter")]
    MissingCredentials,
    #[error("send failed: {0}")]
    Send(String),
    #[error("connect failed: {0}")]
    Connect(String),
}
