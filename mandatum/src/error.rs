//! Error types shared by the engine and its backends.
//!
//! Every result handed to a user callback is a [`VfsResult`]. Backend
//! failures travel inside [`VfsError::Backend`] untouched; everything else
//! is produced by the engine itself.

use crate::job::Handle;

use std::io;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type VfsResult<T> = Result<T, VfsError>;

/// Errors reported by the engine or forwarded from a backend.
#[derive(Debug, Error)]
pub enum VfsError {
    /// End of data was reached (read, directory listing).
    #[error("end of file")]
    Eof,

    /// The operation was cancelled before it produced a result.
    #[error("operation cancelled")]
    Cancelled,

    /// A backend call was interrupted and may be retried.
    #[error("operation interrupted")]
    Interrupted,

    /// The handle does not refer to a live job.
    #[error("invalid handle {0}")]
    InvalidHandle(Handle),

    /// The URI could not be parsed or is not handled by the backend.
    #[error("invalid uri: {0}")]
    InvalidUri(String),

    /// Error produced by the storage backend, passed through unmodified.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// Engine-side fault: pipe creation, thread spawn, worker panic.
    #[error("internal error: {0}")]
    Internal(String),

    /// The engine is shutting down and no longer accepts work.
    #[error("engine is shutting down")]
    Rejected,

    /// Caller misuse, such as a priority out of range.
    #[error("bad parameters: {0}")]
    BadParameters(String),
}

/// Errors a backend reports for its own storage.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("not supported: {0}")]
    NotSupported(String),

    #[error("is a directory: {0}")]
    IsDirectory(String),

    #[error("not a directory: {0}")]
    NotDirectory(String),

    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("{0}")]
    Other(String),
}

/// Coarse classification of a [`VfsError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Eof,
    Cancelled,
    InvalidHandle,
    InvalidUri,
    Backend,
    Internal,
    BadParameters,
}

impl VfsError {
    /// Returns the taxonomy bucket this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            VfsError::Eof => ErrorKind::Eof,
            VfsError::Cancelled => ErrorKind::Cancelled,
            VfsError::InvalidHandle(_) => ErrorKind::InvalidHandle,
            VfsError::InvalidUri(_) => ErrorKind::InvalidUri,
            VfsError::Backend(_) => ErrorKind::Backend,
            VfsError::Internal(_) | VfsError::Rejected | VfsError::Interrupted => {
                ErrorKind::Internal
            }
            VfsError::BadParameters(_) => ErrorKind::BadParameters,
        }
    }

    /// Returns `true` for [`VfsError::Eof`].
    pub fn is_eof(&self) -> bool {
        matches!(self, VfsError::Eof)
    }
}

impl From<io::Error> for VfsError {
    fn from(error: io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::Interrupted => VfsError::Interrupted,
            io::ErrorKind::UnexpectedEof => VfsError::Eof,
            _ => VfsError::Backend(BackendError::Io(error)),
        }
    }
}
