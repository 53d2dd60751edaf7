//! Provider-neutral remote object descriptors
//!
//! Every backend translates its native listing format into [`RemoteFile`]
//! records; the engine never sees provider types. The `data` field carries
//! an opaque payload the backend may need on later calls (the raw provider
//! JSON, a path, a session cookie), round-tripped untouched.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Whether a remote object is a plain file or a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    File,
    Directory,
}

/// Provider-neutral description of one remote object.
///
/// `parents` is an ordered list of parent ids. An empty list means the
/// object sits at the root of the mount. Providers that support multiple
/// parents report all of them; the engine treats the first as canonical
/// for listing and preserves the rest for move semantics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteFile {
    /// Opaque provider identifier, unique within the provider.
    pub id: String,
    /// Leaf name exactly as the provider stores it. May contain characters
    /// (notably `/`) that are invalid in local names; the engine sanitizes
    /// its local view without touching this field.
    pub name: String,
    /// Ordered parent ids; empty means root-level.
    pub parents: Vec<String>,
    /// Size in bytes; zero for directories.
    pub size: u64,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    pub accessed: DateTime<Utc>,
    pub kind: NodeKind,
    /// Permission bits reported to the kernel (e.g. 0o644 / 0o755).
    pub perm: u16,
    /// Opaque provider payload, carried back on later backend calls.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub data: serde_json::Value,
}

impl RemoteFile {
    /// Minimal constructor used by backends and tests; timestamps default
    /// to now and permissions to the conventional 0o644 / 0o755.
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: NodeKind) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            parents: Vec::new(),
            size: 0,
            created: now,
            modified: now,
            accessed: now,
            kind,
            perm: match kind {
                NodeKind::File => 0o644,
                NodeKind::Directory => 0o755,
            },
            data: serde_json::Value::Null,
        }
    }

    /// Builder-style parent assignment.
    pub fn with_parents(mut self, parents: Vec<String>) -> Self {
        self.parents = parents;
        self
    }

    pub fn is_dir(&self) -> bool {
        self.kind == NodeKind::Directory
    }

    /// True if `id` appears in this file's parent list.
    pub fn has_parent_id(&self, id: &str) -> bool {
        self.parents.iter().any(|p| p == id)
    }

    /// True if `parent` (or the root, when `None`) is among this file's
    /// parents.
    pub fn has_parent(&self, parent: Option<&RemoteFile>) -> bool {
        match parent {
            Some(p) => self.has_parent_id(&p.id),
            None => self.parents.is_empty(),
        }
    }
}

/// One delta reported by [`Backend::changes`]: the addition, replacement,
/// or removal of a single remote object, keyed by provider id.
///
/// [`Backend::changes`]: crate::ports::Backend::changes
#[derive(Debug, Clone)]
pub struct Change {
    /// Provider id of the affected object.
    pub id: String,
    /// The new state of the object; `None` when `remove` is set.
    pub file: Option<RemoteFile>,
    /// True when the object was deleted or trashed.
    pub remove: bool,
}

/// Capacity numbers reported by a provider, in bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Quota {
    pub total_bytes: u64,
    pub used_bytes: u64,
}

impl Quota {
    pub fn free_bytes(&self) -> u64 {
        self.total_bytes.saturating_sub(self.used_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_file_defaults() {
        let f = RemoteFile::new("id-1", "notes.txt", NodeKind::File);
        assert_eq!(f.perm, 0o644);
        assert!(!f.is_dir());
        assert!(f.parents.is_empty());

        let d = RemoteFile::new("id-2", "docs", NodeKind::Directory);
        assert_eq!(d.perm, 0o755);
        assert!(d.is_dir());
    }

    #[test]
    fn parent_checks() {
        let f = RemoteFile::new("c", "child", NodeKind::File)
            .with_parents(vec!["a".to_string(), "b".to_string()]);
        assert!(f.has_parent_id("a"));
        assert!(f.has_parent_id("b"));
        assert!(!f.has_parent_id("c"));

        let parent = RemoteFile::new("a", "dir", NodeKind::Directory);
        assert!(f.has_parent(Some(&parent)));
        assert!(!f.has_parent(None));

        let root_level = RemoteFile::new("r", "top", NodeKind::File);
        assert!(root_level.has_parent(None));
    }

    #[test]
    fn quota_free_saturates() {
        let q = Quota {
            total_bytes: 10,
            used_bytes: 25,
        };
        assert_eq!(q.free_bytes(), 0);
        let q = Quota {
            total_bytes: 100,
            used_bytes: 25,
        };
        assert_eq!(q.free_bytes(), 75);
    }
}
