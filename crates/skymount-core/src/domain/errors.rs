//! Backend error taxonomy
//!
//! Every provider adapter classifies its failures into these kinds; the
//! engine maps them onto errno values at the FUSE boundary and never lets
//! a provider error escape unclassified.

use thiserror::Error;

/// Errors reported by a [`Backend`] implementation.
///
/// `Transient` covers network failures and provider 5xx/429 responses:
/// the full-refresh path retries those with backoff and the polling loop
/// simply waits for the next tick.
///
/// [`Backend`]: crate::ports::Backend
#[derive(Debug, Error)]
pub enum BackendError {
    /// The provider reports the object is gone.
    #[error("not found: {0}")]
    NotFound(String),

    /// The provider refused the operation.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// A sibling with the requested name already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Delete of a populated directory.
    #[error("directory not empty: {0}")]
    NotEmpty(String),

    /// Optional backend call the provider does not support.
    #[error("not implemented: {0}")]
    NotImplemented(&'static str),

    /// Network failure or provider-side 5xx/429; safe to retry.
    #[error("transient provider error: {0}")]
    Transient(String),

    /// Malformed request.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Local I/O failure while staging or streaming content.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Anything the adapter could not classify.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl BackendError {
    /// True for errors worth retrying without operator intervention.
    pub fn is_transient(&self) -> bool {
        matches!(self, BackendError::Transient(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_context() {
        let err = BackendError::NotFound("file-123".to_string());
        assert_eq!(err.to_string(), "not found: file-123");

        let err = BackendError::NotEmpty("dir-9".to_string());
        assert_eq!(err.to_string(), "directory not empty: dir-9");
    }

    #[test]
    fn io_errors_convert() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe");
        let err: BackendError = io.into();
        assert!(matches!(err, BackendError::Io(_)));
    }

    #[test]
    fn transient_classification() {
        assert!(BackendError::Transient("502".to_string()).is_transient());
        assert!(!BackendError::NotFound("x".to_string()).is_transient());
    }
}
