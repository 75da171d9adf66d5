//! The storage collaborator the engine drives.
//!
//! The engine never touches storage itself. Every job ends up calling one of
//! the blocking methods below on a worker thread, passing the job's
//! [`CancellationToken`]. Implementations should poll the token between units
//! of work and return [`VfsError::Cancelled`](crate::VfsError::Cancelled)
//! when it trips.
//!
//! Backends may call [`request_on_loop`](crate::request_on_loop) from inside
//! any of these methods to run a closure on the issuing thread (for example
//! to ask the user for credentials) and wait for its answer.

mod types;
mod xfer;

pub use types::{
    FileInfo, FileInfoOptions, FileInfoResult, FileType, FindDirectoryKind, FindDirectoryResult,
    OpenMode, SetFileInfoMask, Uri,
};
pub use xfer::{
    XferErrorMode, XferOptions, XferOverwriteMode, XferPhase, XferProgressInfo,
    XferProgressStatus, XferReply, XferRequest,
};

use crate::cancel::CancellationToken;
use crate::error::{BackendError, VfsResult};

use std::any::Any;
use std::io::SeekFrom;

/// Progress sink handed to [`Backend::xfer`].
///
/// Each call blocks until the issuing loop has run the user's progress
/// callback, and returns its reply.
pub type XferProgress<'a> = dyn FnMut(&XferProgressInfo) -> XferReply + 'a;

/// A storage backend.
pub trait Backend: Send + Sync {
    fn open(
        &self,
        uri: &Uri,
        mode: OpenMode,
        token: &CancellationToken,
    ) -> VfsResult<Box<dyn FileHandle>>;

    fn create(
        &self,
        uri: &Uri,
        mode: OpenMode,
        exclusive: bool,
        permissions: u32,
        token: &CancellationToken,
    ) -> VfsResult<Box<dyn FileHandle>>;

    fn create_symbolic_link(
        &self,
        uri: &Uri,
        target: &str,
        token: &CancellationToken,
    ) -> VfsResult<()>;

    fn get_file_info(
        &self,
        uri: &Uri,
        options: FileInfoOptions,
        token: &CancellationToken,
    ) -> VfsResult<FileInfo>;

    fn set_file_info(
        &self,
        uri: &Uri,
        info: &FileInfo,
        mask: SetFileInfoMask,
        token: &CancellationToken,
    ) -> VfsResult<()>;

    fn open_directory(
        &self,
        uri: &Uri,
        options: FileInfoOptions,
        token: &CancellationToken,
    ) -> VfsResult<Box<dyn DirectoryHandle>>;

    /// Locates (and optionally creates) a well-known directory on the
    /// volume holding `near`.
    fn find_directory(
        &self,
        near: &Uri,
        kind: FindDirectoryKind,
        create_if_needed: bool,
        find_if_needed: bool,
        permissions: u32,
        token: &CancellationToken,
    ) -> VfsResult<Uri>;

    /// Performs a recursive copy or move, reporting through `progress`.
    ///
    /// A reply of [`XferReply::Abort`] must stop the transfer and make the
    /// call return [`VfsError::Interrupted`](crate::VfsError::Interrupted).
    fn xfer(
        &self,
        request: &XferRequest,
        progress: &mut XferProgress<'_>,
        token: &CancellationToken,
    ) -> VfsResult<()>;
}

/// An open file owned by exactly one job.
pub trait FileHandle: Send {
    /// Reads into `buffer`. Returns [`VfsError::Eof`](crate::VfsError::Eof)
    /// once no data is left.
    fn read(&mut self, buffer: &mut [u8], token: &CancellationToken) -> VfsResult<usize>;

    fn write(&mut self, buffer: &[u8], token: &CancellationToken) -> VfsResult<usize>;

    /// Moves the file position and returns the new absolute offset.
    fn seek(&mut self, position: SeekFrom, token: &CancellationToken) -> VfsResult<u64>;

    /// Backend specific control call. `data` is owned by the caller and is
    /// handed back to it once the call completes.
    fn file_control(
        &mut self,
        operation: &str,
        data: &mut (dyn Any + Send),
        token: &CancellationToken,
    ) -> VfsResult<()> {
        let _ = (data, token);
        Err(BackendError::NotSupported(operation.to_string()).into())
    }

    fn close(self: Box<Self>, token: &CancellationToken) -> VfsResult<()>;
}

/// An open directory listing.
pub trait DirectoryHandle: Send {
    /// Returns the next entry, or [`VfsError::Eof`](crate::VfsError::Eof)
    /// after the last one.
    fn read_next(&mut self, token: &CancellationToken) -> VfsResult<FileInfo>;
}
