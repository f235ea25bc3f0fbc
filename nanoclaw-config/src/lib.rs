//! Loads operator configuration from XDG `config.toml` and project `.env`, then exposes a
//! typed [`OperatorConfig`]. Layering: environment variables that are already set win;
//! otherwise `.env` wins over XDG `config.toml`.

mod dotenv;
mod xdg_toml;

use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("read xdg config: {0}")]
    XdgRead(std::io::Error),
    #[error("parse xdg toml: {0}")]
    XdgParse(#[from] toml::de::Error),
    #[error("read .env: {0}")]
    DotenvRead(std::io::Error),
    #[error("invalid value for {field}: {value}")]
    InvalidValue { field: &'static str, value: String },
}

const APP_NAME: &str = "nanoclaw";

/// Loads config from XDG `config.toml` and optional project `.env`, then sets process
/// environment variables for keys not already set (existing env wins).
pub fn load_and_apply(override_dir: Option<&Path>) -> Result<(), LoadError> {
    let xdg_map = xdg_toml::load_env_map(APP_NAME)?;
    let dotenv_map = dotenv::load_env_map(override_dir).map_err(LoadError::DotenvRead)?;

    let mut keys: std::collections::HashSet<String> = xdg_map.keys().cloned().collect();
    keys.extend(dotenv_map.keys().cloned());

    for key in keys {
        if std::env::var(&key).is_ok() {
            continue;
        }
        if let Some(v) = dotenv_map.get(&key).or_else(|| xdg_map.get(&key)) {
            std::env::set_var(&key, v);
        }
    }
    Ok(())
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_u64(key: &str, default: u64) -> Result<u64, LoadError> {
    match std::env::var(key) {
        Ok(v) => v
            .parse()
            .map_err(|_| LoadError::InvalidValue { field: leak(key), value: v }),
        Err(_) => Ok(default),
    }
}

fn env_usize(key: &str, default: usize) -> Result<usize, LoadError> {
    match std::env::var(key) {
        Ok(v) => v
            .parse()
            .map_err(|_| LoadError::InvalidValue { field: leak(key), value: v }),
        Err(_) => Ok(default),
    }
}

// env_u64/env_usize only run a handful of times at startup; a leaked &'static str keeps
// LoadError::InvalidValue's field Copy without plumbing a lifetime through the config module.
fn leak(s: &str) -> &'static str {
    Box::leak(s.to_string().into_boxed_str())
}

/// Operator-facing configuration. Every field has an environment variable and
/// a documented default; nothing here is required to be set for the router to boot against
/// a local/dev setup, except `main_workspace_folder` which always defaults to `"main"`.
#[derive(Clone, Debug)]
pub struct OperatorConfig {
    pub assistant_name: String,
    /// Global fallback trigger pattern used when a registered group's own trigger is empty
    ///.
    pub trigger_pattern: String,
    pub main_workspace_folder: String,
    pub messenger_poll_interval_ms: u64,
    pub ipc_poll_interval_ms: u64,
    pub scheduler_tick_interval_ms: u64,
    pub timezone: String,
    pub storage_root: PathBuf,
    pub workspaces_root: PathBuf,
    pub ipc_root: PathBuf,
    pub allow_list_path: PathBuf,
    pub container_timeout_ms: u64,
    pub container_cli: String,
    pub shutdown_grace_ms: u64,
    pub status_debounce_ms: u64,
    pub duplicate_lru_capacity: usize,
    pub queue_backoff_base_ms: u64,
    pub queue_backoff_cap_ms: u64,
    pub queue_max_retries: u32,
    /// Outbound messages whose content starts with this are the bot's own echoes and are
    /// excluded by the store's `getNewMessages`/`getMessagesSince` queries.
    pub bot_message_prefix: String,
    /// Comma-separated glob patterns rejected by mount resolution regardless of the
    /// allow-list (e.g. `.ssh`, credential directories).
    pub blocked_mount_patterns: String,
}

impl OperatorConfig {
    /// Applies layered env/.env/XDG config, then builds a typed config from the resulting
    /// process environment. Call [`load_and_apply`] once at startup before this.
    pub fn from_env() -> Result<Self, LoadError> {
        let assistant_name = env_string("NANOCLAW_ASSISTANT_NAME", "Andy");
        Ok(Self {
            trigger_pattern: env_string("NANOCLAW_TRIGGER_PATTERN", &format!("@{assistant_name}")),
            assistant_name,
            main_workspace_folder: env_string("NANOCLAW_MAIN_FOLDER", "main"),
            messenger_poll_interval_ms: env_u64("NANOCLAW_MESSENGER_POLL_MS", 3_000)?,
            ipc_poll_interval_ms: env_u64("NANOCLAW_IPC_POLL_MS", 500)?,
            scheduler_tick_interval_ms: env_u64("NANOCLAW_SCHEDULER_TICK_MS", 30_000)?,
            timezone: env_string("NANOCLAW_TIMEZONE", "UTC"),
            storage_root: PathBuf::from(env_string("NANOCLAW_STORAGE_ROOT", "./data/nanoclaw.db")),
            workspaces_root: PathBuf::from(env_string("NANOCLAW_WORKSPACES_ROOT", "./data/workspaces")),
            ipc_root: PathBuf::from(env_string("NANOCLAW_IPC_ROOT", "./data/ipc")),
            allow_list_path: PathBuf::from(env_string(
                "NANOCLAW_MOUNT_ALLOWLIST",
                "./data/mount-allowlist.txt",
            )),
            container_timeout_ms: env_u64("NANOCLAW_CONTAINER_TIMEOUT_MS", 5 * 60_000)?,
            container_cli: env_string("NANOCLAW_CONTAINER_CLI", "docker"),
            shutdown_grace_ms: env_u64("NANOCLAW_SHUTDOWN_GRACE_MS", 10_000)?,
            status_debounce_ms: env_u64("NANOCLAW_STATUS_DEBOUNCE_MS", 2_000)?,
            duplicate_lru_capacity: env_usize("NANOCLAW_DEDUP_LRU_CAPACITY", 1_000)?,
            queue_backoff_base_ms: env_u64("NANOCLAW_QUEUE_BACKOFF_BASE_MS", 1_000)?,
            queue_backoff_cap_ms: env_u64("NANOCLAW_QUEUE_BACKOFF_CAP_MS", 5 * 60_000)?,
            queue_max_retries: env_u64("NANOCLAW_QUEUE_MAX_RETRIES", 6)? as u32,
            bot_message_prefix: env_string("NANOCLAW_BOT_PREFIX", "\u{1F916}"),
            blocked_mount_patterns: env_string(
                "NANOCLAW_BLOCKED_MOUNT_PATTERNS",
                "**/.ssh/**,**/.gnupg/**,**/.aws/**",
            ),
        })
    }

    pub fn container_timeout(&self) -> Duration {
        Duration::from_millis(self.container_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    pub fn blocked_mount_pattern_list(&self) -> Vec<String> {
        self.blocked_mount_patterns
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    fn clear_nanoclaw_env() {
        for (k, _) in env::vars() {
            if k.starts_with("NANOCLAW_") {
                env::remove_var(k);
            }
        }
    }

    #[test]
    fn defaults_apply_when_env_unset() {
        clear_nanoclaw_env();
        let cfg = OperatorConfig::from_env().unwrap();
        assert_eq!(cfg.assistant_name, "Andy");
        assert_eq!(cfg.main_workspace_folder, "main");
        assert_eq!(cfg.container_timeout_ms, 300_000);
        clear_nanoclaw_env();
    }

    #[test]
    fn trigger_pattern_defaults_from_assistant_name() {
        clear_nanoclaw_env();
        env::set_var("NANOCLAW_ASSISTANT_NAME", "Rex");
        let cfg = OperatorConfig::from_env().unwrap();
        assert_eq!(cfg.trigger_pattern, "@Rex");
        clear_nanoclaw_env();
    }

    #[test]
    fn invalid_numeric_env_is_rejected() {
        clear_nanoclaw_env();
        env::set_var("NANOCLAW_SCHEDULER_TICK_MS", "not-a-number");
        let err = OperatorConfig::from_env().unwrap_err();
        assert!(matches!(err, LoadError::InvalidValue { .. }));
        clear_nanoclaw_env();
    }

    #[test]
    fn existing_env_wins_over_dotenv_and_xdg() {
        env::set_var("CONFIG_TEST_EXISTING", "from_env");
        let _ = load_and_apply(None);
        assert_eq!(env::var("CONFIG_TEST_EXISTING").as_deref(), Ok("from_env"));
        env::remove_var("CONFIG_TEST_EXISTING");
    }
}
