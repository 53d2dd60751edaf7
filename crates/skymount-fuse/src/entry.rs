//! Per-inode entry state.
//!
//! A [`FileEntry`] pairs an inode with the [`RemoteFile`] it reflects, the
//! locally visible name (which may diverge from the remote name after
//! collision disambiguation), cached POSIX attributes, and the optional
//! scratch file staging its bytes.

use std::{
    sync::RwLock,
    time::{SystemTime, UNIX_EPOCH},
};

use fuser::{FileAttr, FileType};
use skymount_core::domain::RemoteFile;
use tokio::sync::{Mutex, MutexGuard};

use crate::cache::ScratchFile;

/// The root of every mount. Always present, always a directory, never
/// backed by a [`RemoteFile`].
pub const ROOT_INODE: u64 = 1;

/// Inode of the transient "Loading…" placeholder shown before the first
/// listing completes. The maximum value keeps it unambiguous and sorting
/// last.
pub const LOADING_INODE: u64 = u64::MAX;

/// Content staged locally for one entry.
///
/// Guarded by the entry's content mutex, which serializes cache
/// population, concurrent writers, and upload.
#[derive(Default)]
pub struct ContentState {
    /// Scratch file holding downloaded or dirty bytes; `None` until the
    /// first read/write/truncate and again after release.
    pub scratch: Option<ScratchFile>,
    /// Set by truncate-to-zero: the next flush must upload even if the
    /// flushing handle never wrote.
    pub upload_pending: bool,
}

struct RemoteState {
    file: Option<RemoteFile>,
    attr: FileAttr,
}

/// In-memory state for one inode.
pub struct FileEntry {
    inode: u64,
    name: String,
    remote: RwLock<RemoteState>,
    content: Mutex<ContentState>,
}

impl FileEntry {
    /// Create an entry for `file` under `inode`. A `None` file produces
    /// the root directory shape (and is also used by tests).
    pub fn new(inode: u64, name: String, file: Option<RemoteFile>, uid: u32, gid: u32) -> Self {
        let attr = attributes(inode, file.as_ref(), uid, gid);
        Self {
            inode,
            name,
            remote: RwLock::new(RemoteState { file, attr }),
            content: Mutex::new(ContentState::default()),
        }
    }

    pub fn inode(&self) -> u64 {
        self.inode
    }

    /// Locally visible name; may differ from `file().name` after
    /// disambiguation or sanitization.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Cached POSIX attributes.
    pub fn attr(&self) -> FileAttr {
        self.remote.read().expect("remote state poisoned").attr
    }

    /// The remote object this entry reflects; `None` for the root.
    pub fn file(&self) -> Option<RemoteFile> {
        self.remote.read().expect("remote state poisoned").file.clone()
    }

    pub fn file_id(&self) -> Option<String> {
        self.remote
            .read()
            .expect("remote state poisoned")
            .file
            .as_ref()
            .map(|f| f.id.clone())
    }

    pub fn is_dir(&self) -> bool {
        self.attr().kind == FileType::Directory
    }

    /// Replace the backing remote record and recompute attributes. Called
    /// after upload and rename return the refreshed record.
    pub fn set_file(&self, file: RemoteFile, uid: u32, gid: u32) {
        let mut state = self.remote.write().expect("remote state poisoned");
        state.attr = attributes(self.inode, Some(&file), uid, gid);
        state.file = Some(file);
    }

    /// Force the reported size; used by truncate-to-zero, which changes
    /// local content without a backend round trip.
    pub fn set_size(&self, size: u64) {
        let mut state = self.remote.write().expect("remote state poisoned");
        state.attr.size = size;
        state.attr.blocks = size.div_ceil(512);
    }

    /// Lock the staged content for this entry.
    pub async fn content(&self) -> MutexGuard<'_, ContentState> {
        self.content.lock().await
    }

    /// True if `parent_id` anchors this entry. The empty id means "at the
    /// root"; the root itself is nobody's child.
    pub fn has_parent_id(&self, parent_id: &str) -> bool {
        if self.inode == ROOT_INODE {
            return false;
        }
        let state = self.remote.read().expect("remote state poisoned");
        match (&state.file, parent_id.is_empty()) {
            (None, root) => root,
            (Some(f), true) => f.parents.is_empty(),
            (Some(f), false) => f.has_parent_id(parent_id),
        }
    }

    /// True if this entry lists `parent` among its parents.
    pub fn has_parent(&self, parent: &FileEntry) -> bool {
        match parent.file_id() {
            Some(id) => self.has_parent_id(&id),
            None => self.has_parent_id(""),
        }
    }
}

impl std::fmt::Debug for FileEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileEntry")
            .field("inode", &self.inode)
            .field("name", &self.name)
            .field("file_id", &self.file_id())
            .finish()
    }
}

/// Derive kernel attributes from a remote record plus the mount identity.
fn attributes(inode: u64, file: Option<&RemoteFile>, uid: u32, gid: u32) -> FileAttr {
    let (kind, perm, size, created, modified, accessed) = match file {
        Some(f) => {
            let kind = if f.is_dir() {
                FileType::Directory
            } else {
                FileType::RegularFile
            };
            (
                kind,
                f.perm,
                f.size,
                SystemTime::from(f.created),
                SystemTime::from(f.modified),
                SystemTime::from(f.accessed),
            )
        }
        // The root has no remote record; it is a plain directory.
        None => (
            FileType::Directory,
            0o755,
            0,
            UNIX_EPOCH,
            UNIX_EPOCH,
            UNIX_EPOCH,
        ),
    };

    FileAttr {
        ino: inode,
        size,
        blocks: size.div_ceil(512),
        atime: accessed,
        mtime: modified,
        ctime: created,
        crtime: created,
        kind,
        perm,
        nlink: if kind == FileType::Directory { 2 } else { 1 },
        uid,
        gid,
        rdev: 0,
        blksize: 4096,
        flags: 0,
    }
}
