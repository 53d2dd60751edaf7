//! Cloud backend port (driven/secondary port)
//!
//! Defines the contract every storage provider implements. The engine in
//! `skymount-fuse` drives all remote side effects through this trait and
//! stays agnostic of the provider behind it.
//!
//! ## Design notes
//!
//! - Content moves through duplicated `tokio::fs::File` descriptors rather
//!   than in-memory buffers, so providers can stream bodies of any size and
//!   a transport layer that drops its body cannot invalidate the engine's
//!   copy of the scratch file.
//! - Implementations are assumed internally thread-safe; the engine calls
//!   them concurrently from different operation threads.
//! - Errors are classified into [`BackendError`] kinds; the engine maps
//!   them to errno values and decides retry policy.

use async_trait::async_trait;
use tokio::fs::File;

use crate::domain::{BackendError, Change, Quota, RemoteFile};

/// Contract between the filesystem engine and one cloud provider.
#[async_trait]
pub trait Backend: Send + Sync + std::fmt::Debug {
    /// Enumerate every reachable file and directory, transitively.
    ///
    /// Results may arrive in any order. If a returned file references a
    /// parent id that is not itself part of the result, the backend must
    /// resolve that parent and include it (recursive parent walk), so the
    /// engine can always anchor every entry.
    async fn list_all(&self) -> Result<Vec<RemoteFile>, BackendError>;

    /// Return all changes since the last call.
    ///
    /// Providers without a native change feed return an empty list; the
    /// engine's periodic full refresh then carries reconciliation.
    async fn changes(&self) -> Result<Vec<Change>, BackendError>;

    /// Create an empty file or a directory under `parent`.
    ///
    /// A `None` parent means the root of the mount.
    async fn create(
        &self,
        parent: Option<&RemoteFile>,
        name: &str,
        is_dir: bool,
    ) -> Result<RemoteFile, BackendError>;

    /// Overwrite the backing bytes of `file` with the contents of
    /// `content`, positioned at the start. Returns the refreshed record
    /// (size and modified time updated).
    async fn upload(&self, content: File, file: &RemoteFile) -> Result<RemoteFile, BackendError>;

    /// Stream the full body of `file` into `dest`. Returns the number of
    /// bytes written.
    ///
    /// Provider-native document types that have no raw byte form are
    /// exported to a configured plain-text representation instead.
    async fn download_to(&self, dest: File, file: &RemoteFile) -> Result<u64, BackendError>;

    /// Relocate and/or rename `file`. A `None` parent moves it to the
    /// root. Returns the refreshed record.
    async fn rename(
        &self,
        file: &RemoteFile,
        new_parent: Option<&RemoteFile>,
        name: &str,
    ) -> Result<RemoteFile, BackendError>;

    /// Remove `file`. Deleting a populated directory must fail with
    /// [`BackendError::NotEmpty`].
    async fn delete(&self, file: &RemoteFile) -> Result<(), BackendError>;

    /// Capacity reporting; optional. The default refuses with
    /// [`BackendError::NotImplemented`] and the engine reports zeros.
    async fn quota(&self) -> Result<Quota, BackendError> {
        Err(BackendError::NotImplemented("quota"))
    }
}
