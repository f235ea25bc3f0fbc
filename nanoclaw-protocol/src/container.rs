//! Per-workspace container override.

use serde::{Deserialize, Serialize};

/// One additional bind mount requested by a workspace's registration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MountSpec {
    /// Name under which the mount appears inside the sandbox, at `extra/<name>`.
    pub name: String,
    /// Host-side path; must resolve under the configured allow-list root.
    pub host_path: String,
    pub read_only: bool,
}

/// Overrides a workspace's registration may carry for its container runs.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerConfig {
    #[serde(default)]
    pub additional_mounts: Vec<MountSpec>,
    /// Overrides the default per-batch timeout, in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}
