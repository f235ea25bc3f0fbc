use std::path::PathBuf;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};

use crate::error::AgentError;
use crate::mount::ResolvedMount;

/// One launched agent process, abstracted so dispatch logic is testable without a real
/// container runtime and so `nanoclaw-router`'s work queue can register it for cancellation.
#[async_trait]
pub trait AgentProcess: Send {
    /// Writes `input` to stdin and closes it so the agent sees EOF.
    async fn write_stdin(&mut self, input: &[u8]) -> Result<(), AgentError>;

    /// Reads the next line of combined stdout, or `None` at EOF.
    async fn next_stdout_line(&mut self) -> Result<Option<String>, AgentError>;

    /// Reads the next line of stderr, or `None` at EOF.
    async fn next_stderr_line(&mut self) -> Result<Option<String>, AgentError>;

    /// Waits for the process to exit, returning its exit code.
    async fn wait(&mut self) -> Result<Option<i32>, AgentError>;

    /// Sends SIGTERM.
    fn terminate(&mut self);

    /// Sends SIGKILL.
    fn kill(&mut self);
}

/// Launches agent containers. `name` must be unique per run so concurrent batches never
/// collide.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn launch(
        &self,
        name: &str,
        workspace_path: &PathBuf,
        mounts: &[ResolvedMount],
        cli: &str,
    ) -> Result<Box<dyn AgentProcess>, AgentError>;
}

/// Spawns the configured agent CLI as a real child process, bind-mounting the workspace and
/// any resolved additional mounts via `-v host:container[:ro]` flags (the common convention
/// shared by Docker and Podman CLIs).
pub struct ProcessContainerRuntime;

#[async_trait]
impl ContainerRuntime for ProcessContainerRuntime {
    async fn launch(
        &self,
        name: &str,
        workspace_path: &PathBuf,
        mounts: &[ResolvedMount],
        cli: &str,
    ) -> Result<Box<dyn AgentProcess>, AgentError> {
        let mut cmd = Command::new(cli);
        cmd.arg("run")
            .arg("--rm")
            .arg("--name")
            .arg(name)
            .arg("-i")
            .arg("-v")
            .arg(format!("{}:/workspace", workspace_path.display()));
        for mount in mounts {
            let ro = if mount.read_only { ":ro" } else { "" };
            cmd.arg("-v").arg(format!(
                "{}:/workspace/extra/{}{ro}",
                mount.host_path.display(),
                mount.name
            ));
        }
        cmd.stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped());

        let child = cmd.spawn().map_err(|e| AgentError::Spawn(e.to_string()))?;
        Ok(Box::new(RealAgentProcess::new(child)?))
    }
}

struct RealAgentProcess {
    child: Child,
    stdin: Option<tokio::process::ChildStdin>,
    stdout: BufReader<tokio::process::ChildStdout>,
    stderr: BufReader<tokio::process::ChildStderr>,
}

impl RealAgentProcess {
    fn new(mut child: Child) -> Result<Self, AgentError> {
        let stdin = child.stdin.take();
        let stdout = BufReader::new(child.stdout.take().ok_or_else(|| AgentError::Spawn("no stdout pipe".into()))?);
        let stderr = BufReader::new(child.stderr.take().ok_or_else(|| AgentError::Spawn("no stderr pipe".into()))?);
        Ok(Self { child, stdin, stdout, stderr })
    }
}

#[async_trait]
impl AgentProcess for RealAgentProcess {
    async fn write_stdin(&mut self, input: &[u8]) -> Result<(), AgentError> {
        if let Some(mut stdin) = self.stdin.take() {
            stdin.write_all(input).await.map_err(|e| AgentError::Spawn(e.to_string()))?;
            stdin.shutdown().await.map_err(|e| AgentError::Spawn(e.to_string()))?;
        }
        Ok(())
    }

    async fn next_stdout_line(&mut self) -> Result<Option<String>, AgentError> {
        let mut line = String::new();
        let n = self.stdout.read_line(&mut line).await.map_err(|e| AgentError::Spawn(e.to_string()))?;
        if n == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches('\n').to_string()))
    }

    async fn next_stderr_line(&mut self) -> Result<Option<String>, AgentError> {
        let mut line = String::new();
        let n = self.stderr.read_line(&mut line).await.map_err(|e| AgentError::Spawn(e.to_string()))?;
        if n == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches('\n').to_string()))
    }

    async fn wait(&mut self) -> Result<Option<i32>, AgentError> {
        let status = self.child.wait().await.map_err(|e| AgentError::Spawn(e.to_string()))?;
        Ok(status.code())
    }

    fn terminate(&mut self) {
        if let Some(id) = self.child.id() {
            let pid = nix::unistd::Pid::from_raw(id as i32);
            let _ = nix::sys::signal::kill(pid, nix::sys::signal::Signal::SIGTERM);
        }
    }

    fn kill(&mut self) {
        if let Some(id) = self.child.id() {
            let pid = nix::unistd::Pid::from_raw(id as i32);
            let _ = nix::sys::signal::kill(pid, nix::sys::signal::Signal::SIGKILL);
        }
    }
}
