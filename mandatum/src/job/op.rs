use super::Handle;
use crate::backend::{
    FileInfo, FileInfoOptions, FileInfoResult, FindDirectoryKind, FindDirectoryResult, OpenMode,
    SetFileInfoMask, Uri, XferProgressInfo, XferReply, XferRequest,
};
use crate::error::VfsResult;
use crate::stream::Channel;

use parking_lot::Mutex;
use std::any::Any;
use std::fmt;
use std::io::SeekFrom;
use std::sync::Arc;

pub(crate) type OpenCallback = Box<dyn FnOnce(Handle, VfsResult<()>) + Send>;
pub(crate) type ChannelCallback = Box<dyn FnOnce(Handle, VfsResult<Channel>) + Send>;
pub(crate) type CloseCallback = Box<dyn FnOnce(Handle, VfsResult<()>) + Send>;
pub(crate) type ReadCallback = Box<dyn FnOnce(Handle, VfsResult<Vec<u8>>) + Send>;
pub(crate) type WriteCallback = Box<dyn FnOnce(Handle, VfsResult<usize>) + Send>;
pub(crate) type SeekCallback = Box<dyn FnOnce(Handle, VfsResult<u64>) + Send>;
pub(crate) type GetFileInfoCallback = Box<dyn FnOnce(Handle, Vec<FileInfoResult>) + Send>;
pub(crate) type SetFileInfoCallback =
    Box<dyn FnOnce(Handle, VfsResult<()>, Option<FileInfo>) + Send>;
pub(crate) type FindDirectoryCallback = Box<dyn FnOnce(Handle, Vec<FindDirectoryResult>) + Send>;
pub(crate) type FileControlCallback =
    Box<dyn FnOnce(Handle, VfsResult<()>, Box<dyn Any + Send>) + Send>;

/// Invoked once per batch of entries; shared between the job and every
/// notification it produced.
pub(crate) type LoadDirectoryCallback =
    Arc<Mutex<Box<dyn FnMut(Handle, VfsResult<()>, Vec<FileInfo>) + Send>>>;

/// Invoked for every progress report of a transfer; its return value is
/// carried back to the worker.
pub(crate) type XferCallback =
    Arc<Mutex<Box<dyn FnMut(Handle, &XferProgressInfo) -> XferReply + Send>>>;

/// The operation a job performs next, with its parameters and callback.
pub(crate) enum Op {
    Open {
        uri: Uri,
        mode: OpenMode,
        callback: OpenCallback,
    },
    OpenAsChannel {
        uri: Uri,
        mode: OpenMode,
        advised_block_size: usize,
        callback: ChannelCallback,
    },
    Create {
        uri: Uri,
        mode: OpenMode,
        exclusive: bool,
        permissions: u32,
        callback: OpenCallback,
    },
    CreateAsChannel {
        uri: Uri,
        mode: OpenMode,
        exclusive: bool,
        permissions: u32,
        callback: ChannelCallback,
    },
    CreateSymbolicLink {
        uri: Uri,
        target: String,
        callback: OpenCallback,
    },
    /// A close without callback is scheduled by the engine itself to release
    /// a resource nobody will ever see.
    Close {
        callback: Option<CloseCallback>,
    },
    Read {
        bytes: usize,
        callback: ReadCallback,
    },
    Write {
        data: Vec<u8>,
        callback: WriteCallback,
    },
    Seek {
        position: SeekFrom,
        callback: SeekCallback,
    },
    GetFileInfo {
        uris: Vec<Uri>,
        options: FileInfoOptions,
        callback: GetFileInfoCallback,
    },
    SetFileInfo {
        uri: Uri,
        info: FileInfo,
        mask: SetFileInfoMask,
        options: FileInfoOptions,
        callback: SetFileInfoCallback,
    },
    FindDirectory {
        near: Vec<Uri>,
        kind: FindDirectoryKind,
        create_if_needed: bool,
        find_if_needed: bool,
        permissions: u32,
        callback: FindDirectoryCallback,
    },
    LoadDirectory {
        uri: Uri,
        options: FileInfoOptions,
        items_per_notification: usize,
        callback: LoadDirectoryCallback,
    },
    Xfer {
        request: XferRequest,
        callback: XferCallback,
    },
    FileControl {
        operation: String,
        data: Box<dyn Any + Send>,
        callback: FileControlCallback,
    },
}

impl Op {
    pub(crate) fn kind(&self) -> OpKind {
        match self {
            Op::Open { .. } => OpKind::Open,
            Op::OpenAsChannel { .. } => OpKind::OpenAsChannel,
            Op::Create { .. } => OpKind::Create,
            Op::CreateAsChannel { .. } => OpKind::CreateAsChannel,
            Op::CreateSymbolicLink { .. } => OpKind::CreateSymbolicLink,
            Op::Close { .. } => OpKind::Close,
            Op::Read { .. } => OpKind::Read,
            Op::Write { .. } => OpKind::Write,
            Op::Seek { .. } => OpKind::Seek,
            Op::GetFileInfo { .. } => OpKind::GetFileInfo,
            Op::SetFileInfo { .. } => OpKind::SetFileInfo,
            Op::FindDirectory { .. } => OpKind::FindDirectory,
            Op::LoadDirectory { .. } => OpKind::LoadDirectory,
            Op::Xfer { .. } => OpKind::Xfer,
            Op::FileControl { .. } => OpKind::FileControl,
        }
    }
}

/// Tag of an [`Op`], kept on the job after the op itself was taken by a
/// worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum OpKind {
    Open,
    OpenAsChannel,
    Create,
    CreateAsChannel,
    CreateSymbolicLink,
    Close,
    Read,
    Write,
    Seek,
    /// A read or write finished; the job waits for the next continuation.
    ReadWriteDone,
    GetFileInfo,
    SetFileInfo,
    FindDirectory,
    LoadDirectory,
    Xfer,
    FileControl,
    /// A backend asked to run a closure on the issuing loop.
    BackendRequest,
}

impl OpKind {
    /// Operations that obtain a resource the caller is expected to close.
    pub(crate) fn is_open(self) -> bool {
        matches!(self, OpKind::Open | OpKind::Create)
    }

    pub(crate) fn is_channel(self) -> bool {
        matches!(self, OpKind::OpenAsChannel | OpKind::CreateAsChannel)
    }

    /// Operations after which the job never becomes continuable again.
    pub(crate) fn ends_job(self) -> bool {
        matches!(
            self,
            OpKind::CreateSymbolicLink
                | OpKind::Close
                | OpKind::GetFileInfo
                | OpKind::SetFileInfo
                | OpKind::FindDirectory
                | OpKind::LoadDirectory
                | OpKind::Xfer
                | OpKind::BackendRequest
        )
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OpKind::Open => "open",
            OpKind::OpenAsChannel => "open as channel",
            OpKind::Create => "create",
            OpKind::CreateAsChannel => "create as channel",
            OpKind::CreateSymbolicLink => "create symbolic link",
            OpKind::Close => "close",
            OpKind::Read => "read",
            OpKind::Write => "write",
            OpKind::Seek => "seek",
            OpKind::ReadWriteDone => "read/write done",
            OpKind::GetFileInfo => "get file info",
            OpKind::SetFileInfo => "set file info",
            OpKind::FindDirectory => "find directory",
            OpKind::LoadDirectory => "load directory",
            OpKind::Xfer => "xfer",
            OpKind::FileControl => "file control",
            OpKind::BackendRequest => "backend request",
        };

        f.write_str(name)
    }
}
