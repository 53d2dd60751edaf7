//! The authoritative in-memory index of live entries.
//!
//! A [`FileContainer`] owns every [`FileEntry`] of one mount generation:
//! inode allocation, id and name lookups, child enumeration, and the
//! backend-effecting operations (create, delete, populate, upload,
//! truncate). Entries refer to each other only through parent ids resolved
//! on demand, so a full refresh can drop in a replacement container
//! without chasing pointers.
//!
//! The allocation mutex guards inode allocation and entry-set mutation
//! only; it is never held across a backend call.

use std::{path::PathBuf, sync::Arc, sync::Mutex};

use dashmap::DashMap;
use skymount_core::{
    domain::{BackendError, RemoteFile},
    ports::Backend,
};
use tracing::debug;

use crate::{
    cache::ScratchFile,
    entry::{ContentState, FileEntry, ROOT_INODE},
    error::FsError,
};

/// Inode→entry index plus the mount identity stamped on every attribute.
pub struct FileContainer {
    entries: DashMap<u64, Arc<FileEntry>>,
    backend: Arc<dyn Backend>,
    uid: u32,
    gid: u32,
    scratch_dir: PathBuf,
    /// Protects inode allocation and entry-set mutation.
    alloc_mu: Mutex<()>,
}

impl FileContainer {
    /// A fresh container holding only the root entry (inode 1).
    pub fn new(backend: Arc<dyn Backend>, uid: u32, gid: u32, scratch_dir: PathBuf) -> Self {
        let container = Self {
            entries: DashMap::new(),
            backend,
            uid,
            gid,
            scratch_dir,
            alloc_mu: Mutex::new(()),
        };
        let root = Arc::new(FileEntry::new(
            ROOT_INODE,
            String::new(),
            None,
            uid,
            gid,
        ));
        container.entries.insert(ROOT_INODE, root);
        container
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn find_by_inode(&self, inode: u64) -> Option<Arc<FileEntry>> {
        self.entries.get(&inode).map(|e| Arc::clone(&e))
    }

    /// Locate an entry by the id of its remote record. Linear scan; the
    /// change feed is the only frequent caller.
    pub fn find_by_id(&self, id: &str) -> Option<Arc<FileEntry>> {
        self.entries.iter().find_map(|e| {
            if e.value().file_id().as_deref() == Some(id) {
                Some(Arc::clone(e.value()))
            } else {
                None
            }
        })
    }

    /// Find the child of `parent` with the given visible name.
    pub fn lookup(&self, parent: &FileEntry, name: &str) -> Option<Arc<FileEntry>> {
        self.entries.iter().find_map(|e| {
            if e.value().has_parent(parent) && e.value().name() == name {
                Some(Arc::clone(e.value()))
            } else {
                None
            }
        })
    }

    /// Find a child by raw parent id; the empty id means root-level.
    pub fn lookup_by_parent_id(&self, parent_id: &str, name: &str) -> Option<Arc<FileEntry>> {
        self.entries.iter().find_map(|e| {
            if e.value().has_parent_id(parent_id) && e.value().name() == name {
                Some(Arc::clone(e.value()))
            } else {
                None
            }
        })
    }

    /// All children of `parent`.
    pub fn children(&self, parent: &FileEntry) -> Vec<Arc<FileEntry>> {
        self.entries
            .iter()
            .filter(|e| e.value().has_parent(parent))
            .map(|e| Arc::clone(e.value()))
            .collect()
    }

    /// Register `file` under a freshly allocated inode.
    pub fn register(&self, file: RemoteFile) -> Arc<FileEntry> {
        let _guard = self.alloc_mu.lock().expect("container lock poisoned");
        let inode = self.lowest_free_inode();
        self.insert_locked(inode, file)
    }

    /// Register `file` under a specific inode (refresh copy-forward,
    /// rename, change replacement). If the inode is already occupied the
    /// existing entry is returned untouched.
    pub fn register_at(&self, file: RemoteFile, inode: u64) -> Arc<FileEntry> {
        let _guard = self.alloc_mu.lock().expect("container lock poisoned");
        if let Some(existing) = self.entries.get(&inode) {
            return Arc::clone(&existing);
        }
        self.insert_locked(inode, file)
    }

    /// Drop `entry` from the index.
    pub fn remove(&self, entry: &FileEntry) {
        let _guard = self.alloc_mu.lock().expect("container lock poisoned");
        self.entries.remove(&entry.inode());
    }

    /// Create an empty file or directory under `parent` on the provider
    /// and register the result.
    pub async fn create(
        &self,
        parent: &FileEntry,
        name: &str,
        is_dir: bool,
    ) -> Result<Arc<FileEntry>, BackendError> {
        let parent_file = parent.file();
        let created = self
            .backend
            .create(parent_file.as_ref(), name, is_dir)
            .await?;
        Ok(self.register(created))
    }

    /// Delete `entry` on the provider and drop it from the index.
    pub async fn delete(&self, entry: &FileEntry) -> Result<(), BackendError> {
        let file = entry.file().ok_or_else(|| {
            BackendError::InvalidArgument("entry has no remote record".to_string())
        })?;
        self.backend.delete(&file).await?;
        self.remove(entry);
        Ok(())
    }

    /// Read from the entry's staged content, populating it from the
    /// provider on first access. Zero bytes means end-of-file.
    pub async fn read(
        &self,
        entry: &FileEntry,
        offset: u64,
        buf: &mut [u8],
    ) -> Result<usize, FsError> {
        let mut content = entry.content().await;
        self.ensure_scratch(entry, &mut content).await?;
        let scratch = content.scratch.as_ref().expect("scratch just ensured");
        Ok(scratch.read_at(buf, offset)?)
    }

    /// Write into the entry's staged content at `offset`. Never contacts
    /// the backend; flush uploads later.
    pub async fn write(
        &self,
        entry: &FileEntry,
        offset: u64,
        data: &[u8],
    ) -> Result<usize, FsError> {
        let mut content = entry.content().await;
        self.ensure_scratch(entry, &mut content).await?;
        let scratch = content.scratch.as_ref().expect("scratch just ensured");
        let written = scratch.write_at(offset, data)?;
        let end = offset + written as u64;
        if end > entry.attr().size {
            entry.set_size(end);
        }
        Ok(written)
    }

    /// Upload the staged content and adopt the refreshed remote record.
    /// Returns false when there is nothing staged.
    pub async fn sync(&self, entry: &FileEntry) -> Result<bool, FsError> {
        let mut content = entry.content().await;
        let Some(scratch) = content.scratch.as_ref() else {
            return Ok(false);
        };
        let file = entry
            .file()
            .ok_or(FsError::InvalidArgument("entry has no remote record"))?;
        let reader = tokio::fs::File::from_std(scratch.reader()?);
        let updated = self.backend.upload(reader, &file).await?;
        entry.set_file(updated, self.uid, self.gid);
        content.upload_pending = false;
        Ok(true)
    }

    /// Truncate the staged content to zero bytes, creating it empty when
    /// absent, and mark the entry upload-pending so the next flush pushes
    /// the empty body.
    pub async fn truncate(&self, entry: &FileEntry) -> Result<(), FsError> {
        let mut content = entry.content().await;
        match content.scratch.as_ref() {
            Some(scratch) => scratch.clear()?,
            None => content.scratch = Some(ScratchFile::new_in(&self.scratch_dir)?),
        }
        content.upload_pending = true;
        entry.set_size(0);
        Ok(())
    }

    /// Drop the entry's scratch file; the backing temporary file is
    /// unlinked. Staged-but-unflushed content is discarded.
    pub async fn clear_cache(&self, entry: &FileEntry) {
        let mut content = entry.content().await;
        content.scratch = None;
        content.upload_pending = false;
    }

    async fn ensure_scratch(
        &self,
        entry: &FileEntry,
        content: &mut ContentState,
    ) -> Result<(), FsError> {
        if content.scratch.is_some() {
            return Ok(());
        }
        let scratch = ScratchFile::new_in(&self.scratch_dir)?;
        if let Some(file) = entry.file() {
            let dest = tokio::fs::File::from_std(scratch.writer()?);
            let bytes = self.backend.download_to(dest, &file).await?;
            debug!(inode = entry.inode(), id = %file.id, bytes, "populated scratch file");
        }
        content.scratch = Some(scratch);
        Ok(())
    }

    /// Lowest unused inode, scanning upward from 2. Caller holds the
    /// allocation mutex.
    fn lowest_free_inode(&self) -> u64 {
        let mut inode = ROOT_INODE + 1;
        while self.entries.contains_key(&inode) {
            inode += 1;
        }
        inode
    }

    fn insert_locked(&self, inode: u64, file: RemoteFile) -> Arc<FileEntry> {
        let name = self.unique_name(&file);
        let entry = Arc::new(FileEntry::new(inode, name, Some(file), self.uid, self.gid));
        self.entries.insert(inode, Arc::clone(&entry));
        entry
    }

    /// Produce the visible name for `file`: sanitize separators, then
    /// append `(k)` before the extension until no sibling under any of the
    /// file's parents claims the candidate.
    fn unique_name(&self, file: &RemoteFile) -> String {
        let sanitized = file.name.replace('/', "_");
        let parent_ids: Vec<&str> = if file.parents.is_empty() {
            vec![""]
        } else {
            file.parents.iter().map(String::as_str).collect()
        };

        let mut name = sanitized.clone();
        let mut count = 1;
        while parent_ids
            .iter()
            .any(|p| self.lookup_by_parent_id(p, &name).is_some())
        {
            count += 1;
            name = match sanitized.split_once('.') {
                Some((base, rest)) => format!("{base}({count}).{rest}"),
                None => format!("{sanitized}({count})"),
            };
        }
        if name != file.name {
            debug!(remote = %file.name, local = %name, "remote name adjusted for local view");
        }
        name
    }
}

#[cfg(test)]
mod tests {
    use skymount_core::domain::{Change, NodeKind, Quota};
    use tokio::fs::File;

    use super::*;

    /// A backend that refuses everything; container index operations never
    /// reach it.
    #[derive(Debug)]
    struct InertBackend;

    #[async_trait::async_trait]
    impl Backend for InertBackend {
        async fn list_all(&self) -> Result<Vec<RemoteFile>, BackendError> {
            Ok(Vec::new())
        }
        async fn changes(&self) -> Result<Vec<Change>, BackendError> {
            Ok(Vec::new())
        }
        async fn create(
            &self,
            _parent: Option<&RemoteFile>,
            _name: &str,
            _is_dir: bool,
        ) -> Result<RemoteFile, BackendError> {
            Err(BackendError::NotImplemented("create"))
        }
        async fn upload(&self, _content: File, _file: &RemoteFile) -> Result<RemoteFile, BackendError> {
            Err(BackendError::NotImplemented("upload"))
        }
        async fn download_to(&self, _dest: File, _file: &RemoteFile) -> Result<u64, BackendError> {
            Err(BackendError::NotImplemented("download_to"))
        }
        async fn rename(
            &self,
            _file: &RemoteFile,
            _new_parent: Option<&RemoteFile>,
            _name: &str,
        ) -> Result<RemoteFile, BackendError> {
            Err(BackendError::NotImplemented("rename"))
        }
        async fn delete(&self, _file: &RemoteFile) -> Result<(), BackendError> {
            Err(BackendError::NotImplemented("delete"))
        }
        async fn quota(&self) -> Result<Quota, BackendError> {
            Err(BackendError::NotImplemented("quota"))
        }
    }

    fn container() -> FileContainer {
        FileContainer::new(Arc::new(InertBackend), 1000, 1000, std::env::temp_dir())
    }

    fn file(id: &str, name: &str, parents: &[&str]) -> RemoteFile {
        RemoteFile::new(id, name, NodeKind::File)
            .with_parents(parents.iter().map(|p| p.to_string()).collect())
    }

    #[test]
    fn new_container_holds_only_the_root() {
        let c = container();
        assert_eq!(c.len(), 1);
        let root = c.find_by_inode(ROOT_INODE).unwrap();
        assert!(root.is_dir());
        assert!(root.file().is_none());
    }

    #[test]
    fn register_allocates_lowest_free_inode() {
        let c = container();
        let a = c.register(file("a", "a.txt", &[]));
        let b = c.register(file("b", "b.txt", &[]));
        assert_eq!(a.inode(), 2);
        assert_eq!(b.inode(), 3);

        c.remove(&a);
        let d = c.register(file("d", "d.txt", &[]));
        assert_eq!(d.inode(), 2);
    }

    #[test]
    fn register_at_is_idempotent_for_occupied_inodes() {
        let c = container();
        let first = c.register_at(file("a", "a.txt", &[]), 10);
        let second = c.register_at(file("b", "b.txt", &[]), 10);
        assert_eq!(first.inode(), 10);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.file_id().as_deref(), Some("a"));
    }

    #[test]
    fn lookup_and_children_by_parent() {
        let c = container();
        let root = c.find_by_inode(ROOT_INODE).unwrap();
        let dir = c.register(RemoteFile::new("d", "docs", NodeKind::Directory));
        c.register(file("x", "x.txt", &["d"]));
        c.register(file("y", "y.txt", &["d"]));
        c.register(file("z", "z.txt", &[]));

        let found = c.lookup(&dir, "x.txt").unwrap();
        assert_eq!(found.file_id().as_deref(), Some("x"));
        assert!(c.lookup(&dir, "missing.txt").is_none());

        let names: Vec<String> = c
            .children(&dir)
            .iter()
            .map(|e| e.name().to_string())
            .collect();
        assert_eq!(names.len(), 2);
        assert!(names.contains(&"x.txt".to_string()));
        assert!(names.contains(&"y.txt".to_string()));

        // Root-level children: the directory itself and z.txt.
        let top: Vec<String> = c
            .children(&root)
            .iter()
            .map(|e| e.name().to_string())
            .collect();
        assert_eq!(top.len(), 2);
        assert!(top.contains(&"docs".to_string()));
        assert!(top.contains(&"z.txt".to_string()));
    }

    #[test]
    fn find_by_id_scans_remote_ids() {
        let c = container();
        let e = c.register(file("abc", "a.txt", &[]));
        assert!(Arc::ptr_eq(&c.find_by_id("abc").unwrap(), &e));
        assert!(c.find_by_id("nope").is_none());
    }

    #[test]
    fn colliding_names_get_numbered() {
        let c = container();
        let first = c.register(file("a", "doc.txt", &["p"]));
        let second = c.register(file("b", "doc.txt", &["p"]));
        let third = c.register(file("c", "doc.txt", &["p"]));

        assert_eq!(first.name(), "doc.txt");
        assert_eq!(second.name(), "doc(2).txt");
        assert_eq!(third.name(), "doc(3).txt");

        // The remote names are preserved untouched.
        assert_eq!(second.file().unwrap().name, "doc.txt");
    }

    #[test]
    fn collision_without_extension() {
        let c = container();
        c.register(file("a", "x", &["p"]));
        let second = c.register(file("b", "x", &["p"]));
        assert_eq!(second.name(), "x(2)");
    }

    #[test]
    fn collision_splits_at_first_dot() {
        let c = container();
        c.register(file("a", "a.b.c", &["p"]));
        let second = c.register(file("b", "a.b.c", &["p"]));
        assert_eq!(second.name(), "a(2).b.c");
    }

    #[test]
    fn collisions_apply_at_root_level_too() {
        let c = container();
        c.register(file("a", "notes.txt", &[]));
        let second = c.register(file("b", "notes.txt", &[]));
        assert_eq!(second.name(), "notes(2).txt");
    }

    #[test]
    fn slashes_become_underscores() {
        let c = container();
        let e = c.register(file("a", "reports/2024.txt", &["p"]));
        assert_eq!(e.name(), "reports_2024.txt");
        assert_eq!(e.file().unwrap().name, "reports/2024.txt");
    }

    #[test]
    fn remove_frees_the_name() {
        let c = container();
        let root = c.find_by_inode(ROOT_INODE).unwrap();
        let e = c.register(file("a", "gone.txt", &[]));
        assert!(c.lookup(&root, "gone.txt").is_some());
        c.remove(&e);
        assert!(c.lookup(&root, "gone.txt").is_none());
        assert_eq!(c.len(), 1);
    }
}
