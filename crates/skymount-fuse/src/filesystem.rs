//! The filesystem engine and its `fuser::Filesystem` adapter.
//!
//! [`CloudFs`] implements every filesystem operation by consulting the
//! [`FileContainer`] and invoking the [`Backend`]. The engine surface is
//! the set of public `Result`-returning operations (`lookup`, `read_file`,
//! `create_file`, …); the `fuser::Filesystem` impl at the bottom of this
//! file is a thin translation layer that converts arguments, calls the
//! engine, and maps [`FsError`] to errno replies.
//!
//! FUSE callbacks arrive on kernel-driven threads; backend calls are async
//! and bridged with `tokio::runtime::Handle::block_on`. The container's
//! allocation mutex is never held across such a call.

use std::{
    ffi::OsStr,
    path::PathBuf,
    sync::{Arc, RwLock},
    time::Duration,
};

use fuser::{
    FileAttr, FileType, Filesystem, ReplyAttr, ReplyCreate, ReplyData, ReplyDirectory, ReplyEmpty,
    ReplyEntry, ReplyOpen, ReplyStatfs, ReplyWrite, ReplyXattr, Request, TimeOrNow,
};
use skymount_core::{
    config::MountConfig,
    domain::{BackendError, NodeKind, RemoteFile},
    ports::Backend,
};
use tokio::{runtime::Handle, sync::Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    container::FileContainer,
    entry::LOADING_INODE,
    error::FsError,
    handle::{DirRecord, HandleTable},
    sync,
};

/// How long the kernel may cache attributes returned by getattr.
const TTL_ATTR: Duration = Duration::from_secs(60);

/// How long the kernel may cache a lookup result.
const TTL_ENTRY: Duration = Duration::from_secs(1);

/// FUSE open flag requesting unbuffered reads and writes. Content lives in
/// scratch files whose size the kernel cannot predict, so page-cache
/// shortcuts are off.
const FOPEN_DIRECT_IO: u32 = 1 << 0;

/// POSIX NAME_MAX; longer names are refused before touching the container.
const NAME_MAX: usize = 255;

/// Filesystem statistics reported to statfs.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsStats {
    pub blocks: u64,
    pub bfree: u64,
    pub bavail: u64,
    pub files: u64,
    pub ffree: u64,
    pub bsize: u32,
    pub namelen: u32,
    pub frsize: u32,
}

/// State shared between the engine, the change-synchronization task and
/// the host's signal handler.
pub struct FsState {
    backend: Arc<dyn Backend>,
    root: RwLock<Arc<FileContainer>>,
    handles: HandleTable,
    uid: u32,
    gid: u32,
    scratch_dir: PathBuf,
    refresh_interval: Duration,
    refresh_now: Notify,
    shutdown: CancellationToken,
}

impl FsState {
    /// The current container generation.
    pub fn container(&self) -> Arc<FileContainer> {
        Arc::clone(&self.root.read().expect("container lock poisoned"))
    }

    /// Atomically replace the container (full refresh).
    pub fn swap_container(&self, fresh: Arc<FileContainer>) {
        *self.root.write().expect("container lock poisoned") = fresh;
    }

    /// Build an empty container generation wired to the same backend and
    /// mount identity.
    pub fn new_container(&self) -> FileContainer {
        FileContainer::new(
            Arc::clone(&self.backend),
            self.uid,
            self.gid,
            self.scratch_dir.clone(),
        )
    }

    pub fn backend(&self) -> Arc<dyn Backend> {
        Arc::clone(&self.backend)
    }

    pub fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }

    /// Ask the synchronization task for an immediate refresh (SIGUSR1).
    pub fn request_refresh(&self) {
        self.refresh_now.notify_one();
    }

    pub(crate) fn refresh_requested(&self) -> &Notify {
        &self.refresh_now
    }

    /// Signal the synchronization task to exit.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub(crate) fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// Live entry count, for statistics logging.
    pub fn entry_count(&self) -> usize {
        self.container().len()
    }

    /// Open handle count, for statistics logging.
    pub fn handle_count(&self) -> usize {
        self.handles.len()
    }
}

/// The backend-agnostic filesystem engine.
pub struct CloudFs {
    rt: Handle,
    state: Arc<FsState>,
    read_only: bool,
}

impl CloudFs {
    /// Build an engine over `backend`, seeded with an empty container and
    /// the transient "Loading..." placeholder that the first refresh
    /// shadows.
    pub fn new(rt: Handle, backend: Arc<dyn Backend>, config: &MountConfig) -> Self {
        let scratch_dir = std::env::temp_dir();
        let container = FileContainer::new(
            Arc::clone(&backend),
            config.uid,
            config.gid,
            scratch_dir.clone(),
        );

        let mut loading = RemoteFile::new("0", "Loading...", NodeKind::File);
        loading.perm = 0;
        container.register_at(loading, LOADING_INODE);

        let state = Arc::new(FsState {
            backend,
            root: RwLock::new(Arc::new(container)),
            handles: HandleTable::new(),
            uid: config.uid,
            gid: config.gid,
            scratch_dir,
            refresh_interval: config.refresh_interval,
            refresh_now: Notify::new(),
            shutdown: CancellationToken::new(),
        });

        Self {
            rt,
            state,
            read_only: config.read_only,
        }
    }

    /// Shared state, cloned by the host before the engine is handed to the
    /// FUSE session.
    pub fn state(&self) -> Arc<FsState> {
        Arc::clone(&self.state)
    }

    /// Spawn the change-synchronization task: one full listing, then the
    /// periodic change poll.
    pub fn start(&self) {
        let state = Arc::clone(&self.state);
        self.rt.spawn(async move {
            sync::run(state).await;
        });
    }

    /// Run one full refresh synchronously; used by tests and by hosts that
    /// want a populated tree before mounting returns.
    pub fn refresh_blocking(&self) -> bool {
        self.rt.block_on(sync::full_refresh(&self.state))
    }

    fn container(&self) -> Arc<FileContainer> {
        self.state.container()
    }

    fn guard_writable(&self) -> Result<(), FsError> {
        if self.read_only {
            Err(FsError::ReadOnly)
        } else {
            Ok(())
        }
    }

    // ------------------------------------------------------------------
    // Engine operations
    // ------------------------------------------------------------------

    /// Open a directory handle. No backend call.
    pub fn open_dir(&self, inode: u64) -> Result<u64, FsError> {
        let container = self.container();
        let entry = container
            .find_by_inode(inode)
            .ok_or(FsError::NotFound("inode"))?;
        if !entry.is_dir() {
            return Err(FsError::NotADirectory);
        }
        Ok(self.state.handles.open(entry).id())
    }

    /// Directory records at `offset` and beyond. Offset 0 (re)captures the
    /// snapshot from the container; later offsets page through it.
    pub fn read_dir(&self, fh: u64, offset: i64) -> Result<Vec<DirRecord>, FsError> {
        let handle = self
            .state
            .handles
            .get(fh)
            .ok_or(FsError::StaleHandle(fh))?;

        if offset == 0 {
            let container = self.container();
            let records = container
                .children(handle.entry())
                .iter()
                .enumerate()
                .map(|(i, child)| DirRecord {
                    inode: child.inode(),
                    name: child.name().to_string(),
                    kind: if child.is_dir() {
                        FileType::Directory
                    } else {
                        FileType::RegularFile
                    },
                    offset: i as i64 + 1,
                })
                .collect();
            handle.set_dir_snapshot(records);
        }

        if offset < 0 {
            return Err(FsError::InvalidArgument("negative directory offset"));
        }
        match handle.dir_records_from(offset as usize) {
            Some(Ok(records)) => Ok(records),
            Some(Err(())) => Err(FsError::InvalidArgument("offset beyond directory snapshot")),
            None => Err(FsError::InvalidArgument("no directory snapshot captured")),
        }
    }

    /// Drop a directory handle.
    pub fn release_dir_handle(&self, fh: u64) {
        self.state.handles.release(fh);
    }

    /// Resolve `name` under `parent_inode`.
    pub fn lookup(&self, parent_inode: u64, name: &str) -> Result<FileAttr, FsError> {
        let container = self.container();
        let parent = container
            .find_by_inode(parent_inode)
            .ok_or(FsError::NotFound("parent inode"))?;
        let entry = container
            .lookup(&parent, name)
            .ok_or(FsError::NotFound("name"))?;
        Ok(entry.attr())
    }

    pub fn get_attr(&self, inode: u64) -> Result<FileAttr, FsError> {
        let container = self.container();
        let entry = container
            .find_by_inode(inode)
            .ok_or(FsError::NotFound("inode"))?;
        Ok(entry.attr())
    }

    /// Attribute update. Only truncate-to-zero is supported; any other
    /// size is refused. Truncation stages an empty scratch file and leaves
    /// the upload to the next flush.
    pub fn set_attr(
        &self,
        inode: u64,
        size: Option<u64>,
        fh: Option<u64>,
    ) -> Result<FileAttr, FsError> {
        let container = self.container();
        let entry = container
            .find_by_inode(inode)
            .ok_or(FsError::NotFound("inode"))?;

        if let Some(size) = size {
            if size != 0 {
                return Err(FsError::NotSupported("truncate to nonzero size"));
            }
            self.guard_writable()?;
            self.rt.block_on(container.truncate(&entry))?;
            if let Some(fh) = fh {
                if let Some(handle) = self.state.handles.get(fh) {
                    handle.mark_dirty();
                }
            }
        }

        Ok(entry.attr())
    }

    /// Open a file handle. No backend call; content is staged lazily.
    pub fn open_file(&self, inode: u64) -> Result<u64, FsError> {
        let container = self.container();
        let entry = container
            .find_by_inode(inode)
            .ok_or(FsError::NotFound("inode"))?;
        if entry.is_dir() {
            return Err(FsError::IsADirectory);
        }
        Ok(self.state.handles.open(entry).id())
    }

    /// Read through a handle, populating the scratch file from the
    /// provider on first access. End-of-file is an empty result.
    pub fn read_file(&self, fh: u64, offset: u64, size: u32) -> Result<Vec<u8>, FsError> {
        let handle = self
            .state
            .handles
            .get(fh)
            .ok_or(FsError::StaleHandle(fh))?;
        let container = self.container();
        let mut buf = vec![0u8; size as usize];
        let read = self
            .rt
            .block_on(container.read(handle.entry(), offset, &mut buf))?;
        buf.truncate(read);
        Ok(buf)
    }

    /// Write through a handle into the scratch file and mark the handle
    /// dirty. The backend is not contacted until flush.
    pub fn write_file(&self, fh: u64, offset: u64, data: &[u8]) -> Result<u32, FsError> {
        self.guard_writable()?;
        let handle = self
            .state
            .handles
            .get(fh)
            .ok_or(FsError::StaleHandle(fh))?;
        let container = self.container();
        let written = self
            .rt
            .block_on(container.write(handle.entry(), offset, data))?;
        handle.mark_dirty();
        Ok(written as u32)
    }

    /// Create an empty file under `parent_inode` and open a dirty handle
    /// on it, so the following flush uploads whatever was written.
    pub fn create_file(&self, parent_inode: u64, name: &str) -> Result<(u64, FileAttr), FsError> {
        self.guard_writable()?;
        let container = self.container();
        let parent = container
            .find_by_inode(parent_inode)
            .ok_or(FsError::NotFound("parent inode"))?;
        if container.lookup(&parent, name).is_some() {
            return Err(FsError::AlreadyExists(name.to_string()));
        }

        let entry = self.rt.block_on(container.create(&parent, name, false))?;
        let handle = self.state.handles.open(Arc::clone(&entry));
        handle.mark_dirty();
        Ok((handle.id(), entry.attr()))
    }

    /// Create a directory under `parent_inode`.
    pub fn mkdir(&self, parent_inode: u64, name: &str) -> Result<FileAttr, FsError> {
        self.guard_writable()?;
        let container = self.container();
        let parent = container
            .find_by_inode(parent_inode)
            .ok_or(FsError::NotFound("parent inode"))?;
        if container.lookup(&parent, name).is_some() {
            return Err(FsError::AlreadyExists(name.to_string()));
        }
        let entry = self.rt.block_on(container.create(&parent, name, true))?;
        Ok(entry.attr())
    }

    /// Upload staged content if this handle wrote (or the entry carries a
    /// pending truncate). A handle that has not written since the last
    /// flush produces no upload.
    pub fn flush_file(&self, fh: u64) -> Result<(), FsError> {
        let handle = self
            .state
            .handles
            .get(fh)
            .ok_or(FsError::StaleHandle(fh))?;
        let container = self.container();
        let entry = Arc::clone(handle.entry());
        self.rt.block_on(async {
            let pending = entry.content().await.upload_pending;
            if handle.is_dirty() || pending {
                container.sync(&entry).await?;
                handle.clear_dirty();
            }
            Ok(())
        })
    }

    /// Drop the handle and the entry's scratch file. Unflushed content is
    /// discarded; callers flush first.
    pub fn release_file_handle(&self, fh: u64) {
        if let Some(handle) = self.state.handles.release(fh) {
            let container = self.container();
            self.rt.block_on(container.clear_cache(handle.entry()));
        }
    }

    /// Remove the file `name` under `parent_inode`.
    pub fn unlink(&self, parent_inode: u64, name: &str) -> Result<(), FsError> {
        self.guard_writable()?;
        let container = self.container();
        let parent = container
            .find_by_inode(parent_inode)
            .ok_or(FsError::NotFound("parent inode"))?;
        let entry = container
            .lookup(&parent, name)
            .ok_or_else(|| FsError::NameNotFound(name.to_string()))?;
        self.rt.block_on(container.delete(&entry))?;
        Ok(())
    }

    /// Remove the directory `name` under `parent_inode`. The provider
    /// refuses populated directories, which surfaces as ENOTEMPTY.
    pub fn rmdir(&self, parent_inode: u64, name: &str) -> Result<(), FsError> {
        self.guard_writable()?;
        let container = self.container();
        let parent = container
            .find_by_inode(parent_inode)
            .ok_or(FsError::NotFound("parent inode"))?;
        let entry = container
            .lookup(&parent, name)
            .ok_or(FsError::NotFound("name"))?;
        self.rt.block_on(container.delete(&entry))?;
        Ok(())
    }

    /// Move and/or rename. The source entry keeps its inode: the old
    /// entry is removed and the refreshed record re-registered under the
    /// same number, re-running collision disambiguation.
    pub fn rename_entry(
        &self,
        old_parent_inode: u64,
        old_name: &str,
        new_parent_inode: u64,
        new_name: &str,
    ) -> Result<(), FsError> {
        self.guard_writable()?;
        let container = self.container();
        let old_parent = container
            .find_by_inode(old_parent_inode)
            .ok_or(FsError::NotFound("old parent inode"))?;
        let new_parent = container
            .find_by_inode(new_parent_inode)
            .ok_or(FsError::NotFound("new parent inode"))?;
        let source = container
            .lookup(&old_parent, old_name)
            .ok_or(FsError::NotFound("source name"))?;
        if container.lookup(&new_parent, new_name).is_some() {
            return Err(FsError::AlreadyExists(new_name.to_string()));
        }

        let file = source
            .file()
            .ok_or(FsError::InvalidArgument("cannot rename the root"))?;
        let new_parent_file = new_parent.file();
        let moved = self.rt.block_on(self.state.backend.rename(
            &file,
            new_parent_file.as_ref(),
            new_name,
        ))?;

        let inode = source.inode();
        container.remove(&source);
        container.register_at(moved, inode);
        Ok(())
    }

    /// Capacity report: provider quota plus local inode accounting. A
    /// backend without quota support yields zeroed block counts.
    pub fn statfs(&self) -> FsStats {
        let quota = match self.rt.block_on(self.state.backend.quota()) {
            Ok(q) => Some(q),
            Err(BackendError::NotImplemented(_)) => None,
            Err(err) => {
                warn!(error = %err, "quota query failed");
                None
            }
        };

        const BSIZE: u32 = 4096;
        let (blocks, bfree) = match quota {
            Some(q) => (
                q.total_bytes / BSIZE as u64,
                q.free_bytes() / BSIZE as u64,
            ),
            None => (0, 0),
        };
        let files = self.container().len() as u64;
        FsStats {
            blocks,
            bfree,
            bavail: bfree,
            files,
            ffree: u64::MAX - files,
            bsize: BSIZE,
            namelen: NAME_MAX as u32,
            frsize: BSIZE,
        }
    }
}

// ----------------------------------------------------------------------
// fuser adapter
// ----------------------------------------------------------------------

/// Convert a kernel-supplied name, refusing non-UTF-8 and oversized names
/// before the engine sees them.
fn name_str(name: &OsStr) -> Result<&str, libc::c_int> {
    let name = name.to_str().ok_or(libc::ENOENT)?;
    if name.len() > NAME_MAX {
        return Err(libc::ENAMETOOLONG);
    }
    Ok(name)
}

impl Filesystem for CloudFs {
    fn destroy(&mut self) {
        debug!(
            entries = self.state.entry_count(),
            handles = self.state.handle_count(),
            "filesystem shutting down"
        );
        self.state.shutdown();
    }

    #[tracing::instrument(level = "debug", skip(self, _req, reply))]
    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let name = match name_str(name) {
            Ok(n) => n,
            Err(errno) => return reply.error(errno),
        };
        match CloudFs::lookup(self, parent, name) {
            Ok(attr) => reply.entry(&TTL_ENTRY, &attr, 0),
            Err(err) => reply.error(err.into()),
        }
    }

    #[tracing::instrument(level = "debug", skip(self, _req, reply))]
    fn getattr(&mut self, _req: &Request<'_>, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        match self.get_attr(ino) {
            Ok(attr) => reply.attr(&TTL_ATTR, &attr),
            Err(err) => reply.error(err.into()),
        }
    }

    #[allow(clippy::too_many_arguments)]
    #[tracing::instrument(level = "debug", skip_all, fields(ino, size))]
    fn setattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        size: Option<u64>,
        _atime: Option<TimeOrNow>,
        _mtime: Option<TimeOrNow>,
        _ctime: Option<std::time::SystemTime>,
        fh: Option<u64>,
        _crtime: Option<std::time::SystemTime>,
        _chgtime: Option<std::time::SystemTime>,
        _bkuptime: Option<std::time::SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        match self.set_attr(ino, size, fh) {
            Ok(attr) => reply.attr(&TTL_ATTR, &attr),
            Err(err) => reply.error(err.into()),
        }
    }

    #[tracing::instrument(level = "debug", skip(self, _req, reply))]
    fn opendir(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        match self.open_dir(ino) {
            Ok(fh) => reply.opened(fh, 0),
            Err(err) => reply.error(err.into()),
        }
    }

    #[tracing::instrument(level = "debug", skip(self, _req, reply))]
    fn readdir(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        match self.read_dir(fh, offset) {
            Ok(records) => {
                for record in records {
                    if reply.add(
                        record.inode,
                        record.offset,
                        record.kind,
                        OsStr::new(&record.name),
                    ) {
                        // Kernel buffer full; the rest is served from the
                        // snapshot on the next call.
                        break;
                    }
                }
                reply.ok();
            }
            Err(err) => reply.error(err.into()),
        }
    }

    #[tracing::instrument(level = "debug", skip(self, _req, reply))]
    fn releasedir(&mut self, _req: &Request<'_>, _ino: u64, fh: u64, _flags: i32, reply: ReplyEmpty) {
        self.release_dir_handle(fh);
        reply.ok();
    }

    #[tracing::instrument(level = "debug", skip(self, _req, reply))]
    fn open(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        match self.open_file(ino) {
            Ok(fh) => reply.opened(fh, FOPEN_DIRECT_IO),
            Err(err) => reply.error(err.into()),
        }
    }

    #[allow(clippy::too_many_arguments)]
    #[tracing::instrument(level = "debug", skip_all, fields(fh, offset, size))]
    fn read(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        if offset < 0 {
            return reply.error(libc::EINVAL);
        }
        match self.read_file(fh, offset as u64, size) {
            Ok(data) => reply.data(&data),
            Err(err) => reply.error(err.into()),
        }
    }

    #[allow(clippy::too_many_arguments)]
    #[tracing::instrument(level = "debug", skip_all, fields(fh, offset, len = data.len()))]
    fn write(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        if offset < 0 {
            return reply.error(libc::EINVAL);
        }
        match self.write_file(fh, offset as u64, data) {
            Ok(written) => reply.written(written),
            Err(err) => reply.error(err.into()),
        }
    }

    #[tracing::instrument(level = "debug", skip(self, _req, reply))]
    fn create(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
        _flags: i32,
        reply: ReplyCreate,
    ) {
        let name = match name_str(name) {
            Ok(n) => n,
            Err(errno) => return reply.error(errno),
        };
        match self.create_file(parent, name) {
            Ok((fh, attr)) => reply.created(&TTL_ATTR, &attr, 0, fh, FOPEN_DIRECT_IO),
            Err(err) => reply.error(err.into()),
        }
    }

    #[tracing::instrument(level = "debug", skip(self, _req, reply))]
    fn mkdir(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
        reply: ReplyEntry,
    ) {
        let name = match name_str(name) {
            Ok(n) => n,
            Err(errno) => return reply.error(errno),
        };
        match CloudFs::mkdir(self, parent, name) {
            Ok(attr) => reply.entry(&TTL_ATTR, &attr, 0),
            Err(err) => reply.error(err.into()),
        }
    }

    #[tracing::instrument(level = "debug", skip(self, _req, reply))]
    fn flush(&mut self, _req: &Request<'_>, _ino: u64, fh: u64, _lock_owner: u64, reply: ReplyEmpty) {
        match self.flush_file(fh) {
            Ok(()) => reply.ok(),
            Err(err) => reply.error(err.into()),
        }
    }

    #[tracing::instrument(level = "debug", skip(self, _req, reply))]
    fn release(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        self.release_file_handle(fh);
        reply.ok();
    }

    #[tracing::instrument(level = "debug", skip(self, _req, reply))]
    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let name = match name_str(name) {
            Ok(n) => n,
            Err(errno) => return reply.error(errno),
        };
        match CloudFs::unlink(self, parent, name) {
            Ok(()) => reply.ok(),
            Err(err) => reply.error(err.into()),
        }
    }

    #[tracing::instrument(level = "debug", skip(self, _req, reply))]
    fn rmdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let name = match name_str(name) {
            Ok(n) => n,
            Err(errno) => return reply.error(errno),
        };
        match CloudFs::rmdir(self, parent, name) {
            Ok(()) => reply.ok(),
            Err(err) => reply.error(err.into()),
        }
    }

    #[allow(clippy::too_many_arguments)]
    #[tracing::instrument(level = "debug", skip_all, fields(parent, newparent))]
    fn rename(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        _flags: u32,
        reply: ReplyEmpty,
    ) {
        let (name, newname) = match (name_str(name), name_str(newname)) {
            (Ok(a), Ok(b)) => (a, b),
            (Err(errno), _) | (_, Err(errno)) => return reply.error(errno),
        };
        match self.rename_entry(parent, name, newparent, newname) {
            Ok(()) => reply.ok(),
            Err(err) => reply.error(err.into()),
        }
    }

    #[tracing::instrument(level = "debug", skip(self, _req, reply))]
    fn statfs(&mut self, _req: &Request<'_>, _ino: u64, reply: ReplyStatfs) {
        let stats = CloudFs::statfs(self);
        reply.statfs(
            stats.blocks,
            stats.bfree,
            stats.bavail,
            stats.files,
            stats.ffree,
            stats.bsize,
            stats.namelen,
            stats.frsize,
        );
    }

    fn forget(&mut self, _req: &Request<'_>, _ino: u64, _nlookup: u64) {}

    #[tracing::instrument(level = "debug", skip(self, _req, reply))]
    fn getxattr(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        _name: &OsStr,
        size: u32,
        reply: ReplyXattr,
    ) {
        // Extended attributes are not carried by any supported provider.
        if size == 0 {
            reply.size(0);
        } else {
            reply.data(&[]);
        }
    }
}
