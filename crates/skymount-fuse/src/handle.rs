//! Open-handle bookkeeping.
//!
//! Handles are process-unique ids the kernel passes back on read, write,
//! flush and release. Allocation scans for the lowest free id under a
//! dedicated mutex; the table itself is shared lock-free.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};

use dashmap::DashMap;
use fuser::FileType;

use crate::entry::FileEntry;

/// One directory record captured in a handle's snapshot.
#[derive(Debug, Clone)]
pub struct DirRecord {
    pub inode: u64,
    pub name: String,
    pub kind: FileType,
    /// Offset the kernel passes back to resume after this record.
    pub offset: i64,
}

/// An open file or directory handle bound to a live entry.
pub struct Handle {
    id: u64,
    entry: Arc<FileEntry>,
    /// One-way bit: set by writes, create-with-content, and truncate.
    dirty: AtomicBool,
    /// Directory listing captured when offset 0 was requested, so paged
    /// reads stay consistent while the container mutates.
    dir_snapshot: Mutex<Option<Vec<DirRecord>>>,
}

impl Handle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn entry(&self) -> &Arc<FileEntry> {
        &self.entry
    }

    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::SeqCst);
    }

    pub fn clear_dirty(&self) {
        self.dirty.store(false, Ordering::SeqCst);
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    /// Replace the directory snapshot (taken at offset 0).
    pub fn set_dir_snapshot(&self, records: Vec<DirRecord>) {
        *self.dir_snapshot.lock().expect("snapshot lock poisoned") = Some(records);
    }

    /// Records at positions `>= offset`, or `None` when no snapshot has
    /// been captured yet. `Err` when the offset lies past the snapshot.
    pub fn dir_records_from(&self, offset: usize) -> Option<Result<Vec<DirRecord>, ()>> {
        let guard = self.dir_snapshot.lock().expect("snapshot lock poisoned");
        let records = guard.as_ref()?;
        if offset > records.len() {
            return Some(Err(()));
        }
        Some(Ok(records[offset..].to_vec()))
    }
}

/// All open handles of one engine instance.
pub struct HandleTable {
    handles: DashMap<u64, Arc<Handle>>,
    alloc_mu: Mutex<()>,
}

impl HandleTable {
    pub fn new() -> Self {
        Self {
            handles: DashMap::new(),
            alloc_mu: Mutex::new(()),
        }
    }

    /// Allocate the lowest free id and bind a handle to `entry`.
    pub fn open(&self, entry: Arc<FileEntry>) -> Arc<Handle> {
        let _guard = self.alloc_mu.lock().expect("handle lock poisoned");
        let mut id = 1;
        while self.handles.contains_key(&id) {
            id += 1;
        }
        let handle = Arc::new(Handle {
            id,
            entry,
            dirty: AtomicBool::new(false),
            dir_snapshot: Mutex::new(None),
        });
        self.handles.insert(id, Arc::clone(&handle));
        handle
    }

    pub fn get(&self, id: u64) -> Option<Arc<Handle>> {
        self.handles.get(&id).map(|h| Arc::clone(&h))
    }

    /// Drop the handle; returns it so the caller can run release-time
    /// cleanup against the bound entry.
    pub fn release(&self, id: u64) -> Option<Arc<Handle>> {
        let _guard = self.alloc_mu.lock().expect("handle lock poisoned");
        self.handles.remove(&id).map(|(_, h)| h)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

impl Default for HandleTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> Arc<FileEntry> {
        Arc::new(FileEntry::new(42, "x".to_string(), None, 0, 0))
    }

    #[test]
    fn ids_are_lowest_free() {
        let table = HandleTable::new();
        let a = table.open(entry());
        let b = table.open(entry());
        let c = table.open(entry());
        assert_eq!((a.id(), b.id(), c.id()), (1, 2, 3));

        table.release(2);
        let d = table.open(entry());
        assert_eq!(d.id(), 2);
    }

    #[test]
    fn release_returns_the_bound_handle() {
        let table = HandleTable::new();
        let h = table.open(entry());
        let released = table.release(h.id()).unwrap();
        assert_eq!(released.entry().inode(), 42);
        assert!(table.get(h.id()).is_none());
        assert!(table.release(999).is_none());
    }

    #[test]
    fn dirty_is_one_way_until_cleared() {
        let table = HandleTable::new();
        let h = table.open(entry());
        assert!(!h.is_dirty());
        h.mark_dirty();
        h.mark_dirty();
        assert!(h.is_dirty());
        h.clear_dirty();
        assert!(!h.is_dirty());
    }

    #[test]
    fn dir_snapshot_pages() {
        let table = HandleTable::new();
        let h = table.open(entry());
        assert!(h.dir_records_from(0).is_none());

        h.set_dir_snapshot(vec![
            DirRecord {
                inode: 2,
                name: "a".to_string(),
                kind: FileType::RegularFile,
                offset: 1,
            },
            DirRecord {
                inode: 3,
                name: "b".to_string(),
                kind: FileType::Directory,
                offset: 2,
            },
        ]);

        let all = h.dir_records_from(0).unwrap().unwrap();
        assert_eq!(all.len(), 2);
        let tail = h.dir_records_from(1).unwrap().unwrap();
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].name, "b");
        let end = h.dir_records_from(2).unwrap().unwrap();
        assert!(end.is_empty());
        assert!(h.dir_records_from(3).unwrap().is_err());
    }
}
