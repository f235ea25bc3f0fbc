//! Wiring helpers for the `nanoclaw` daemon, split out of `main.rs` so integration tests can
//! drive the startup-failure paths without spawning the real binary.

pub mod logging;

/// Treats a failing `<cli> info` as "container subsystem down" per the startup fatal-error
/// policy; a missing binary and a daemon that refuses connections both fail this check.
pub async fn check_container_subsystem(container_cli: &str) -> Result<(), String> {
    tokio::process::Command::new(container_cli)
        .arg("info")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .await
        .map_err(|e| e.to_string())
        .and_then(|status| {
            if status.success() {
                Ok(())
            } else {
                Err(format!("`{container_cli} info` exited {status}"))
            }
        })
}

pub async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
        tokio::select! {
            _ = sigterm.recv() => {}
            _ = sigint.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
