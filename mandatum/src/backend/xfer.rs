use super::Uri;
use crate::error::ErrorKind;

use bitflags::bitflags;

bitflags! {
    /// Behaviour switches for a copy or move.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct XferOptions: u32 {
        /// Copy what symbolic links point to rather than the links.
        const FOLLOW_LINKS = 1 << 0;
        /// Descend into directories.
        const RECURSIVE = 1 << 1;
        /// Delete each source after it was copied (a move).
        const REMOVE_SOURCE = 1 << 2;
        /// Refuse to cross filesystem boundaries.
        const SAME_FS = 1 << 3;
    }
}

/// What to do when copying a file fails.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum XferErrorMode {
    Abort,
    /// Ask the progress callback (`Abort`, `Retry` or `Skip`).
    #[default]
    Query,
}

/// What to do when the target already exists.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum XferOverwriteMode {
    Abort,
    /// Ask the progress callback (`Abort`, `Replace` or `Skip`).
    #[default]
    Query,
    Replace,
    Skip,
}

/// A recursive copy or move between pairs of URIs.
///
/// `sources[i]` is transferred to `targets[i]`; both lists must have the
/// same, non-zero length.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct XferRequest {
    pub sources: Vec<Uri>,
    pub targets: Vec<Uri>,
    pub options: XferOptions,
    pub error_mode: XferErrorMode,
    pub overwrite_mode: XferOverwriteMode,
}

impl XferRequest {
    pub fn new(sources: Vec<Uri>, targets: Vec<Uri>) -> Self {
        Self {
            sources,
            targets,
            options: XferOptions::RECURSIVE,
            error_mode: XferErrorMode::default(),
            overwrite_mode: XferOverwriteMode::default(),
        }
    }

    pub fn options(mut self, options: XferOptions) -> Self {
        self.options = options;
        self
    }

    pub fn error_mode(mut self, mode: XferErrorMode) -> Self {
        self.error_mode = mode;
        self
    }

    pub fn overwrite_mode(mut self, mode: XferOverwriteMode) -> Self {
        self.overwrite_mode = mode;
        self
    }
}

/// Meaning of a progress report.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum XferProgressStatus {
    /// Plain progress; reply `Continue` or `Abort`.
    #[default]
    Ok,
    /// An error occurred; `vfs_status` says which.
    VfsError,
    /// The target exists and the overwrite mode is `Query`.
    Overwrite,
}

/// Step of the transfer a progress report refers to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum XferPhase {
    #[default]
    Initial,
    Collecting,
    ReadyToGo,
    OpenSource,
    OpenTarget,
    Copying,
    Moving,
    DeleteSource,
    FileDone,
    Cleanup,
    Completed,
}

/// Snapshot passed to the xfer progress callback.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct XferProgressInfo {
    pub status: XferProgressStatus,
    pub vfs_status: Option<ErrorKind>,
    pub phase: XferPhase,
    pub source: Option<Uri>,
    pub target: Option<Uri>,
    pub file_index: u64,
    pub files_total: u64,
    pub bytes_total: u64,
    pub file_size: u64,
    pub bytes_copied: u64,
    pub total_bytes_copied: u64,
}

/// Answer returned by the xfer progress callback.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum XferReply {
    Continue,
    Skip,
    Abort,
    Retry,
    Replace,
}
