use serde::{Deserialize, Serialize};

/// A filesystem mount requested by a [`super::RoomSpec`]. Tagged by
/// kind rather than a free-form access-mode flag, because each kind
/// carries different resolution rules (§4.4 step 11): `private` and
/// `template` are rewritten relative to configured storage roots,
/// `protected`/`public` are validated against an operator whitelist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MountKind {
    /// Per-room persistent storage under the host's private root.
    Private,
    /// Read-only shared asset storage under the host's template root.
    Template,
    /// Read-only bind from an operator-whitelisted absolute path.
    Protected,
    /// Read-write bind from an operator-whitelisted absolute path.
    Public,
}

impl MountKind {
    pub fn is_read_only(&self) -> bool {
        matches!(self, MountKind::Template | MountKind::Protected)
    }
}

/// A single mount request. `host_path` is relative-to-root for
/// `private`/`template` until resolved by the room manager; absolute
/// already for `protected`/`public`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mount {
    pub kind: MountKind,
    pub host_path: String,
    pub container_path: String,
}

impl Mount {
    pub fn new(kind: MountKind, host_path: impl Into<String>, container_path: impl Into<String>) -> Self {
        Self {
            kind,
            host_path: host_path.into(),
            container_path: container_path.into(),
        }
    }

    /// Drops later entries that share a `container_path` with an
    /// earlier one, keeping first occurrence — per the data model
    /// invariant in §3.
    pub fn dedupe(mounts: Vec<Mount>) -> Vec<Mount> {
        let mut seen = std::collections::HashSet::new();
        mounts
            .into_iter()
            .filter(|m| seen.insert(m.container_path.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedupe_keeps_first_occurrence() {
        let mounts = vec![
            Mount::new(MountKind::Private, "/data", "/home/user"),
            Mount::new(MountKind::Public, "/other", "/home/user"),
        ];
        let deduped = Mount::dedupe(mounts);
        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped[0].host_path, "/data");
    }
}
