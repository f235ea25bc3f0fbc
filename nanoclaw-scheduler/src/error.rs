#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("invalid cron expression {0:?}: {1}")]
    InvalidCron(String, String),
    #[error("invalid timezone {0:?}")]
    InvalidTimezone(String),
    #[error("invalid interval value {0:?}: expected milliseconds")]
    InvalidInterval(String),
    #[error("invalid once value {0:?}: expected an ISO-8601 timestamp")]
    InvalidOnce(String),
}
