//! Resolves an agent's additional bind mounts against a host-side allow-list root and a set
//! of blocked-path globs. The allow-list file itself is read by the caller and never mounted
//! into any container.

use std::path::{Path, PathBuf};

use glob::Pattern;
use nanoclaw_protocol::MountSpec;

use crate::error::AgentError;

#[derive(Clone, Debug)]
pub struct ResolvedMount {
    pub name: String,
    pub host_path: PathBuf,
    pub read_only: bool,
}

/// Resolves every requested additional mount, rejecting any that escape `allow_list_root` or
/// match a blocked-path glob (e.g. `.ssh`, `.gnupg`). Non-main workspaces get every mount
/// forced read-only regardless of what was requested.
pub fn resolve_mounts(
    requested: &[MountSpec],
    allow_list_root: &Path,
    blocked_patterns: &[String],
    is_main: bool,
) -> Result<Vec<ResolvedMount>, AgentError> {
    let blocked: Vec<Pattern> = blocked_patterns
        .iter()
        .map(|p| Pattern::new(p).map_err(|source| AgentError::InvalidGlob { pattern: p.clone(), source }))
        .collect::<Result<_, _>>()?;

    let mut resolved = Vec::with_capacity(requested.len());
    for mount in requested {
        let host_path = normalize(Path::new(&mount.host_path));
        let allow_root = normalize(allow_list_root);
        if !host_path.starts_with(&allow_root) {
            return Err(AgentError::MountOutsideAllowList { name: mount.name.clone() });
        }
        if blocked.iter().any(|pattern| pattern.matches_path(&host_path)) {
            return Err(AgentError::MountBlocked { name: mount.name.clone() });
        }
        resolved.push(ResolvedMount {
            name: mount.name.clone(),
            host_path,
            read_only: mount.read_only || !is_main,
        });
    }
    Ok(resolved)
}

/// Lexical normalization without touching the filesystem: mounts may reference paths that do
/// not exist yet inside the allow-list root, so `canonicalize` would fail spuriously.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        use std::path::Component;
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mount(name: &str, host_path: &str, read_only: bool) -> MountSpec {
        MountSpec { name: name.to_string(), host_path: host_path.into(), read_only }
    }

    #[test]
    fn rejects_mount_outside_allow_list() {
        let err = resolve_mounts(
            &[mount("etc", "/etc", false)],
            Path::new("/srv/nanoclaw-allow"),
            &[],
            true,
        )
        .unwrap_err();
        assert!(matches!(err, AgentError::MountOutsideAllowList { .. }));
    }

    #[test]
    fn rejects_blocked_pattern() {
        let err = resolve_mounts(
            &[mount("secrets", "/srv/nanoclaw-allow/.ssh", false)],
            Path::new("/srv/nanoclaw-allow"),
            &["**/.ssh".to_string()],
            true,
        )
        .unwrap_err();
        assert!(matches!(err, AgentError::MountBlocked { .. }));
    }

    #[test]
    fn forces_read_only_for_non_main_workspaces() {
        let resolved = resolve_mounts(
            &[mount("shared", "/srv/nanoclaw-allow/shared", false)],
            Path::new("/srv/nanoclaw-allow"),
            &[],
            false,
        )
        .unwrap();
        assert!(resolved[0].read_only);
    }

    #[test]
    fn honors_requested_flag_for_main_workspace() {
        let resolved = resolve_mounts(
            &[mount("shared", "/srv/nanoclaw-allow/shared", false)],
            Path::new("/srv/nanoclaw-allow"),
            &[],
            true,
        )
        .unwrap();
        assert!(!resolved[0].read_only);
    }

    #[test]
    fn traversal_via_parent_dir_is_caught() {
        let err = resolve_mounts(
            &[mount("escape", "/srv/nanoclaw-allow/../etc", false)],
            Path::new("/srv/nanoclaw-allow"),
            &[],
            true,
        )
        .unwrap_err();
        assert!(matches!(err, AgentError::MountOutsideAllowList { .. }));
    }
}
