use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use nanoclaw_protocol::agent_io::{extract_payload, AgentInput, AgentOutcome, OutputType, LOG_PREFIX, STATUS_PREFIX};

use crate::error::AgentError;
use crate::mount::ResolvedMount;
use crate::runtime::{AgentProcess, ContainerRuntime};

/// Forwards one `STATUS:` stderr line at a time; implemented by the router over its status
/// relay so this crate never depends on the messenger stack.
#[async_trait]
pub trait StatusSink: Send + Sync {
    async fn on_status_line(&self, line: &str);
}

/// Outcome of one agent batch, matching the error-handling policy: a spawn failure, a crash
/// with no payload, or a timeout all become `Retry`; a crash that still produced a payload is
/// treated as `Success`.
#[derive(Debug)]
pub enum DispatchOutcome {
    Success { user_message: Option<String>, new_session_id: Option<String> },
    Retry { reason: String },
}

pub struct DispatchRequest<'a> {
    pub container_name: String,
    pub workspace_path: PathBuf,
    pub mounts: Vec<ResolvedMount>,
    pub container_cli: &'a str,
    pub input: AgentInput,
    pub timeout: Duration,
}

/// Runs one agent batch end to end: spawn, stream stdin/stdout/stderr, parse the payload,
/// and classify the result. Always attempts to terminate the process on timeout before
/// returning.
pub async fn dispatch(
    runtime: &dyn ContainerRuntime,
    status_sink: &dyn StatusSink,
    request: DispatchRequest<'_>,
) -> Result<DispatchOutcome, AgentError> {
    let mut process = runtime
        .launch(&request.container_name, &request.workspace_path, &request.mounts, request.container_cli)
        .await?;

    let stdin_body = serde_json::to_vec(&request.input)?;

    let run = run_to_completion(process.as_mut(), stdin_body, status_sink);
    match tokio::time::timeout(request.timeout, run).await {
        Ok(result) => result,
        Err(_) => {
            process.terminate();
            tokio::time::sleep(Duration::from_secs(2)).await;
            process.kill();
            Err(AgentError::Timeout(request.timeout))
        }
    }
}

async fn run_to_completion(
    process: &mut dyn AgentProcess,
    stdin_body: Vec<u8>,
    status_sink: &dyn StatusSink,
) -> Result<DispatchOutcome, AgentError> {
    process.write_stdin(&stdin_body).await?;

    let mut stdout_text = String::new();
    let mut stdout_done = false;
    let mut stderr_done = false;

    while !stdout_done || !stderr_done {
        if !stdout_done {
            match process.next_stdout_line().await? {
                Some(line) => {
                    stdout_text.push_str(&line);
                    stdout_text.push('\n');
                }
                None => stdout_done = true,
            }
        }
        if !stderr_done {
            match process.next_stderr_line().await? {
                Some(line) => handle_stderr_line(&line, status_sink).await,
                None => stderr_done = true,
            }
        }
    }

    let exit_code = process.wait().await?;
    classify(&stdout_text, exit_code)
}

async fn handle_stderr_line(line: &str, status_sink: &dyn StatusSink) {
    if let Some(status) = line.strip_prefix(STATUS_PREFIX) {
        status_sink.on_status_line(status.trim()).await;
    } else if let Some(log) = line.strip_prefix(LOG_PREFIX) {
        tracing::info!(target: "nanoclaw_agent::child", "{}", log.trim());
    } else if !line.trim().is_empty() {
        tracing::debug!(target: "nanoclaw_agent::child", "{line}");
    }
}

fn classify(stdout_text: &str, exit_code: Option<i32>) -> Result<DispatchOutcome, AgentError> {
    let payload = match extract_payload(stdout_text) {
        Some(Ok(payload)) => payload,
        Some(Err(err)) => {
            return Ok(DispatchOutcome::Retry { reason: format!("malformed payload: {err}") });
        }
        None => {
            return match exit_code {
                Some(0) => Ok(DispatchOutcome::Retry { reason: "exited cleanly without a payload".into() }),
                other => Ok(DispatchOutcome::Retry { reason: format!("exited {other:?} without a payload") }),
            };
        }
    };

    let new_session_id = payload.new_session_id;
    match payload.status {
        AgentOutcome::Success => {
            let user_message = payload
                .result
                .filter(|r| r.output_type == OutputType::Message)
                .and_then(|r| r.user_message)
                .filter(|m| !m.is_empty());
            Ok(DispatchOutcome::Success { user_message, new_session_id })
        }
        AgentOutcome::Error => {
            if let Some(result) = payload.result {
                let user_message = (result.output_type == OutputType::Message)
                    .then_some(result.user_message)
                    .flatten()
                    .filter(|m| !m.is_empty());
                Ok(DispatchOutcome::Success { user_message, new_session_id })
            } else {
                Ok(DispatchOutcome::Retry {
                    reason: payload.error.unwrap_or_else(|| "agent reported an error".into()),
                })
            }
        }
    }
}
