//! Operator-level policy the room manager enforces on every create:
//! the EPR pool, storage roots, image/mount whitelists, and the
//! knobs exposed to callers via `Config()`.

use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::model::EprRange;

/// Declarative policy for one control-plane instance. Built by the
/// embedding binary (from flags/env) and handed to the room manager
/// at construction; the manager never re-reads the environment itself.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Value stamped into every room's `instance` label and used as the
    /// primary host-query filter.
    pub instance_name: String,
    pub epr_pool: EprRange,
    /// `true` when every room shares one EPR port for UDP+TCP instead
    /// of a per-connection range.
    pub mux_mode: bool,
    pub image_allowlist: Vec<String>,
    pub mount_whitelist: Vec<PathBuf>,
    pub storage_internal_root: PathBuf,
    pub storage_external_root: PathBuf,
    pub private_uid: u32,
    pub private_gid: u32,
    pub stop_timeout_secs: i64,
    pub wait_mode_enabled: bool,
    pub network_mode: Option<String>,
    /// Label-template strings for an external routing sidecar (§6);
    /// empty when the internal `proxy.*` label scheme is used instead.
    pub routing_label_templates: Vec<(String, String)>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            instance_name: "neko-rooms".to_string(),
            epr_pool: EprRange::new(59000, 59100),
            mux_mode: false,
            image_allowlist: Vec::new(),
            mount_whitelist: Vec::new(),
            storage_internal_root: PathBuf::from("/storage/internal"),
            storage_external_root: PathBuf::from("/storage/external"),
            private_uid: 1000,
            private_gid: 1000,
            stop_timeout_secs: 10,
            wait_mode_enabled: true,
            network_mode: None,
            routing_label_templates: Vec::new(),
        }
    }
}

impl ManagerConfig {
    pub fn is_image_allowed(&self, image: &str) -> bool {
        self.image_allowlist.iter().any(|allowed| allowed == image)
    }

    pub fn is_path_whitelisted(&self, path: &Path) -> bool {
        match clean_mount_path(path) {
            Some(clean) => self.mount_whitelist.iter().any(|root| clean.starts_with(root)),
            None => false,
        }
    }
}

/// Lexically normalizes `path`: drops `.` components and resolves `..`
/// against the components collected so far, without touching the
/// filesystem. Returns `None` if a `..` would escape past the root —
/// `Path::starts_with` is a component-prefix check and doesn't itself
/// protect a whitelist root against a path like `/data/../../etc/shadow`.
pub(crate) fn clean_mount_path(path: &Path) -> Option<PathBuf> {
    let mut out: Vec<Component> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.last() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                _ => return None,
            },
            other => out.push(other),
        }
    }
    Some(out.into_iter().collect())
}

/// External view of [`ManagerConfig`] returned from `GET /config/rooms`,
/// deliberately excluding filesystem roots and the mount whitelist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomsConfig {
    pub instance_name: String,
    pub epr_min: u16,
    pub epr_max: u16,
    pub mux_mode: bool,
    pub image_allowlist: Vec<String>,
    pub wait_mode_enabled: bool,
}

impl From<&ManagerConfig> for RoomsConfig {
    fn from(cfg: &ManagerConfig) -> Self {
        Self {
            instance_name: cfg.instance_name.clone(),
            epr_min: cfg.epr_pool.min,
            epr_max: cfg.epr_pool.max,
            mux_mode: cfg.mux_mode,
            image_allowlist: cfg.image_allowlist.clone(),
            wait_mode_enabled: cfg.wait_mode_enabled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitelist_checks_path_prefix() {
        let mut cfg = ManagerConfig::default();
        cfg.mount_whitelist.push(PathBuf::from("/srv/public"));
        assert!(cfg.is_path_whitelisted(Path::new("/srv/public/assets")));
        assert!(!cfg.is_path_whitelisted(Path::new("/etc/shadow")));
    }

    #[test]
    fn whitelist_rejects_dot_dot_escape() {
        let mut cfg = ManagerConfig::default();
        cfg.mount_whitelist.push(PathBuf::from("/srv/public"));
        assert!(!cfg.is_path_whitelisted(Path::new("/srv/public/../../etc/shadow")));
    }

    #[test]
    fn whitelist_allows_dot_dot_that_stays_inside_root() {
        let mut cfg = ManagerConfig::default();
        cfg.mount_whitelist.push(PathBuf::from("/srv/public"));
        assert!(cfg.is_path_whitelisted(Path::new("/srv/public/assets/../images")));
    }
}
