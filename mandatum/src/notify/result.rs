use crate::backend::{FileInfo, FileInfoResult, FindDirectoryResult, XferProgressInfo, XferReply};
use crate::error::{VfsError, VfsResult};
use crate::job::{
    ChannelCallback, CloseCallback, FileControlCallback, FindDirectoryCallback,
    GetFileInfoCallback, Handle, LoadDirectoryCallback, OpKind, OpenCallback, ReadCallback,
    SeekCallback, SetFileInfoCallback, WriteCallback, XferCallback,
};
use crate::registry::CallbackId;
use crate::stream::Channel;

use std::any::Any;
use std::sync::mpsc::SyncSender;

/// Value a synchronous notification sends back to its worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Reply {
    /// The callback ran.
    Ack,

    /// The xfer progress callback ran and answered.
    Xfer(XferReply),

    /// The callback did not run: the job was cancelled or the loop is gone.
    Cancelled,
}

/// Outcome of one operation plus the callback that consumes it.
pub(crate) enum Payload {
    /// Open, create and create-symbolic-link.
    Open {
        result: VfsResult<()>,
        callback: OpenCallback,
    },
    /// Successful channel open/create, handed over synchronously.
    Channel {
        channel: Channel,
        callback: ChannelCallback,
    },
    ChannelFailed {
        error: VfsError,
        callback: ChannelCallback,
    },
    Close {
        result: VfsResult<()>,
        callback: CloseCallback,
    },
    Read {
        result: VfsResult<Vec<u8>>,
        callback: ReadCallback,
    },
    Write {
        result: VfsResult<usize>,
        callback: WriteCallback,
    },
    Seek {
        result: VfsResult<u64>,
        callback: SeekCallback,
    },
    GetFileInfo {
        results: Vec<FileInfoResult>,
        callback: GetFileInfoCallback,
    },
    SetFileInfo {
        result: VfsResult<()>,
        info: Option<FileInfo>,
        callback: SetFileInfoCallback,
    },
    FindDirectory {
        results: Vec<FindDirectoryResult>,
        callback: FindDirectoryCallback,
    },
    LoadDirectory {
        result: VfsResult<()>,
        entries: Vec<FileInfo>,
        callback: LoadDirectoryCallback,
    },
    Xfer {
        info: XferProgressInfo,
        callback: XferCallback,
    },
    FileControl {
        result: VfsResult<()>,
        data: Box<dyn Any + Send>,
        callback: FileControlCallback,
    },
    /// A closure a backend wants to run on the issuing loop.
    Request { request: Box<dyn FnOnce() + Send> },
}

/// A result travelling from a worker to the issuing loop.
pub(crate) struct NotifyResult {
    pub(crate) handle: Handle,
    pub(crate) kind: OpKind,
    pub(crate) callback_id: CallbackId,
    pub(crate) payload: Payload,

    /// Present for synchronous deliveries; the worker blocks on the other
    /// end.
    pub(crate) reply: Option<SyncSender<Reply>>,
}

impl NotifyResult {
    pub(crate) fn new(handle: Handle, kind: OpKind, payload: Payload) -> Self {
        Self {
            handle,
            kind,
            callback_id: 0,
            payload,
            reply: None,
        }
    }

    pub(crate) fn is_synchronous(&self) -> bool {
        self.reply.is_some()
    }

    /// Runs the user callback and, for synchronous deliveries, releases the
    /// waiting worker with the callback's answer.
    pub(crate) fn deliver(self) {
        let NotifyResult {
            handle,
            payload,
            reply,
            ..
        } = self;

        let answer = match payload {
            Payload::Open { result, callback } => {
                callback(handle, result);
                Reply::Ack
            }
            Payload::Channel { channel, callback } => {
                callback(handle, Ok(channel));
                Reply::Ack
            }
            Payload::ChannelFailed { error, callback } => {
                callback(handle, Err(error));
                Reply::Ack
            }
            Payload::Close { result, callback } => {
                callback(handle, result);
                Reply::Ack
            }
            Payload::Read { result, callback } => {
                callback(handle, result);
                Reply::Ack
            }
            Payload::Write { result, callback } => {
                callback(handle, result);
                Reply::Ack
            }
            Payload::Seek { result, callback } => {
                callback(handle, result);
                Reply::Ack
            }
            Payload::GetFileInfo { results, callback } => {
                callback(handle, results);
                Reply::Ack
            }
            Payload::SetFileInfo {
                result,
                info,
                callback,
            } => {
                callback(handle, result, info);
                Reply::Ack
            }
            Payload::FindDirectory { results, callback } => {
                callback(handle, results);
                Reply::Ack
            }
            Payload::LoadDirectory {
                result,
                entries,
                callback,
            } => {
                let mut callback = callback.lock();
                (*callback)(handle, result, entries);
                Reply::Ack
            }
            Payload::Xfer { info, callback } => {
                let mut callback = callback.lock();
                Reply::Xfer((*callback)(handle, &info))
            }
            Payload::FileControl {
                result,
                data,
                callback,
            } => {
                callback(handle, result, data);
                Reply::Ack
            }
            Payload::Request { request } => {
                request();
                Reply::Ack
            }
        };

        if let Some(reply) = reply {
            let _ = reply.send(answer);
        }
    }

    /// Drops the result without running user code.
    pub(crate) fn abandon(self) {
        if let Some(reply) = self.reply {
            let _ = reply.send(Reply::Cancelled);
        }
    }
}
