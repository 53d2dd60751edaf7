//! Error types for the filesystem engine.
//!
//! Defines `FsError` and the conversion to libc errno values returned at
//! the FUSE boundary.

use skymount_core::domain::BackendError;
use thiserror::Error;

/// Errors raised by engine operations before they are flattened to errno.
#[derive(Error, Debug)]
pub enum FsError {
    #[error("not found: {0}")]
    NotFound(&'static str),

    #[error("no entry named '{0}' in parent")]
    NameNotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("not a directory")]
    NotADirectory,

    #[error("is a directory")]
    IsADirectory,

    #[error("stale handle {0}")]
    StaleHandle(u64),

    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    #[error("operation not supported: {0}")]
    NotSupported(&'static str),

    #[error("read-only mount")]
    ReadOnly,

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl From<FsError> for libc::c_int {
    fn from(err: FsError) -> libc::c_int {
        match err {
            FsError::NotFound(_) => libc::ENOENT,
            // ENODATA is the Linux spelling of ENOATTR.
            FsError::NameNotFound(_) => libc::ENODATA,
            FsError::AlreadyExists(_) => libc::EEXIST,
            FsError::NotADirectory => libc::ENOTDIR,
            FsError::IsADirectory => libc::EISDIR,
            FsError::StaleHandle(_) => libc::EIO,
            FsError::InvalidArgument(_) => libc::EINVAL,
            FsError::NotSupported(_) => libc::ENOSYS,
            FsError::ReadOnly => libc::EROFS,
            FsError::Io(_) => libc::EIO,
            FsError::Backend(e) => backend_errno(&e),
        }
    }
}

/// Flatten a backend error kind to the errno surfaced to the kernel.
pub fn backend_errno(err: &BackendError) -> libc::c_int {
    match err {
        BackendError::NotFound(_) => libc::ENOENT,
        BackendError::PermissionDenied(_) => libc::EPERM,
        BackendError::AlreadyExists(_) => libc::EEXIST,
        BackendError::NotEmpty(_) => libc::ENOTEMPTY,
        BackendError::NotImplemented(_) => libc::ENOSYS,
        BackendError::Transient(_) | BackendError::Io(_) => libc::EIO,
        BackendError::InvalidArgument(_) | BackendError::Other(_) => libc::EINVAL,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_errors_map_to_errno() {
        assert_eq!(libc::c_int::from(FsError::NotFound("inode")), libc::ENOENT);
        assert_eq!(
            libc::c_int::from(FsError::NameNotFound("a".into())),
            libc::ENODATA
        );
        assert_eq!(libc::c_int::from(FsError::ReadOnly), libc::EROFS);
        assert_eq!(
            libc::c_int::from(FsError::NotSupported("truncate")),
            libc::ENOSYS
        );
    }

    #[test]
    fn backend_errors_map_per_kind() {
        assert_eq!(
            backend_errno(&BackendError::NotFound("x".into())),
            libc::ENOENT
        );
        assert_eq!(
            backend_errno(&BackendError::PermissionDenied("x".into())),
            libc::EPERM
        );
        assert_eq!(
            backend_errno(&BackendError::NotEmpty("d".into())),
            libc::ENOTEMPTY
        );
        assert_eq!(
            backend_errno(&BackendError::Transient("503".into())),
            libc::EIO
        );
        assert_eq!(
            backend_errno(&BackendError::InvalidArgument("bad".into())),
            libc::EINVAL
        );
    }
}
