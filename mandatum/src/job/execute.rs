use super::{ChannelCallback, CloseCallback, Job, LoadDirectoryCallback, Op, OpKind, XferCallback};
use crate::backend::{
    FileHandle, FileInfo, FileInfoOptions, FileInfoResult, FindDirectoryKind,
    FindDirectoryResult, OpenMode, SetFileInfoMask, Uri, XferPhase, XferProgressInfo,
    XferProgressStatus, XferReply, XferRequest,
};
use crate::cancel::CancellationToken;
use crate::engine::Shared;
use crate::error::{VfsError, VfsResult};
use crate::notify::{NotifyResult, Payload, Reply};
use crate::stream::{Bridge, Direction};

use log::{debug, trace, warn};
use std::mem;

/// One operation of one job, as seen by the worker running it.
///
/// Built at pickup from what the worker took out of the job. Everything the
/// completion step needs afterwards (resource, kind marker, failure) lives
/// here until it is put back under the job lock.
pub(crate) struct Execution<'a> {
    shared: &'a Shared,
    job: &'a Job,
    token: CancellationToken,
    pub(crate) resource: Option<Box<dyn FileHandle>>,
    pub(crate) kind: OpKind,
    pub(crate) failed: bool,
}

impl<'a> Execution<'a> {
    pub(crate) fn new(
        shared: &'a Shared,
        job: &'a Job,
        token: CancellationToken,
        resource: Option<Box<dyn FileHandle>>,
        kind: OpKind,
    ) -> Self {
        Self {
            shared,
            job,
            token,
            resource,
            kind,
            failed: false,
        }
    }

    /// Runs `op` unless the job was cancelled before pickup.
    pub(crate) fn run(&mut self, op: Op, cancelled: bool) {
        if cancelled {
            self.skip(op);
        } else {
            self.execute(op);
        }
    }

    /// The job was cancelled before its operation started: no backend call,
    /// no callback. Resources scheduled for closing are still released.
    fn skip(&mut self, op: Op) {
        debug!("job {} cancelled before {} started", self.job.handle(), op.kind());

        match op {
            Op::Read { .. } | Op::Write { .. } => self.kind = OpKind::ReadWriteDone,
            Op::Close { .. } => {
                if let Some(resource) = self.resource.take() {
                    if let Err(e) = resource.close(&CancellationToken::new()) {
                        debug!("closing job {} after cancel: {e}", self.job.handle());
                    }
                }
            }
            _ => {}
        }
    }

    fn execute(&mut self, op: Op) {
        trace!("job {} executing {}", self.job.handle(), op.kind());

        if self.token.is_cancelled() {
            return self.skip(op);
        }

        match op {
            Op::Open {
                uri,
                mode,
                callback,
            } => {
                let opened = self.shared.backend.open(&uri, mode, &self.token);
                let result = self.install(opened);
                self.oneway(Payload::Open { result, callback });
            }
            Op::Create {
                uri,
                mode,
                exclusive,
                permissions,
                callback,
            } => {
                let created =
                    self.shared
                        .backend
                        .create(&uri, mode, exclusive, permissions, &self.token);
                let result = self.install(created);
                self.oneway(Payload::Open { result, callback });
            }
            Op::OpenAsChannel {
                uri,
                mode,
                advised_block_size,
                callback,
            } => {
                let opened = self.shared.backend.open(&uri, mode, &self.token);
                self.serve_channel(opened, mode, advised_block_size, callback);
            }
            Op::CreateAsChannel {
                uri,
                mode,
                exclusive,
                permissions,
                callback,
            } => {
                let created =
                    self.shared
                        .backend
                        .create(&uri, mode, exclusive, permissions, &self.token);
                self.serve_channel(created, mode, 0, callback);
            }
            Op::CreateSymbolicLink {
                uri,
                target,
                callback,
            } => {
                let result =
                    self.shared
                        .backend
                        .create_symbolic_link(&uri, &target, &self.token);
                self.failed = result.is_err();
                self.oneway(Payload::Open { result, callback });
            }
            Op::Close { callback } => self.close(callback),
            Op::Read { bytes, callback } => {
                let result = self.read(bytes);
                self.kind = OpKind::ReadWriteDone;
                self.oneway_as(OpKind::Read, Payload::Read { result, callback });
            }
            Op::Write { data, callback } => {
                let token = self.token.clone();
                let result = self.resource().and_then(|r| r.write(&data, &token));
                self.kind = OpKind::ReadWriteDone;
                self.oneway_as(OpKind::Write, Payload::Write { result, callback });
            }
            Op::Seek { position, callback } => {
                let token = self.token.clone();
                let result = self.resource().and_then(|r| r.seek(position, &token));
                self.oneway(Payload::Seek { result, callback });
            }
            Op::GetFileInfo {
                uris,
                options,
                callback,
            } => {
                let results = self.get_file_info(uris, options);
                self.oneway(Payload::GetFileInfo { results, callback });
            }
            Op::SetFileInfo {
                uri,
                info,
                mask,
                options,
                callback,
            } => {
                let (result, info) = self.set_file_info(&uri, &info, mask, options);
                self.oneway(Payload::SetFileInfo {
                    result,
                    info,
                    callback,
                });
            }
            Op::FindDirectory {
                near,
                kind,
                create_if_needed,
                find_if_needed,
                permissions,
                callback,
            } => {
                let results =
                    self.find_directory(near, kind, create_if_needed, find_if_needed, permissions);
                self.oneway(Payload::FindDirectory { results, callback });
            }
            Op::LoadDirectory {
                uri,
                options,
                items_per_notification,
                callback,
            } => self.load_directory(&uri, options, items_per_notification, callback),
            Op::Xfer { request, callback } => self.xfer(&request, callback),
            Op::FileControl {
                operation,
                mut data,
                callback,
            } => {
                let token = self.token.clone();
                let result = self
                    .resource()
                    .and_then(|r| r.file_control(&operation, data.as_mut(), &token));
                self.oneway(Payload::FileControl {
                    result,
                    data,
                    callback,
                });
            }
        }
    }

    /// Keeps the resource of a successful open or create.
    fn install(&mut self, opened: VfsResult<Box<dyn FileHandle>>) -> VfsResult<()> {
        match opened {
            Ok(resource) => {
                self.resource = Some(resource);
                Ok(())
            }
            Err(e) => {
                self.failed = true;
                Err(e)
            }
        }
    }

    fn resource(&mut self) -> VfsResult<&mut Box<dyn FileHandle>> {
        self.resource
            .as_mut()
            .ok_or_else(|| VfsError::Internal("job has no open resource".into()))
    }

    fn close(&mut self, callback: Option<CloseCallback>) {
        let result = match self.resource.take() {
            Some(resource) => resource.close(&self.token),
            None => Err(VfsError::Internal("job has no open resource".into())),
        };

        match callback {
            Some(callback) => self.oneway(Payload::Close { result, callback }),
            None => {
                if let Err(e) = result {
                    debug!("silent close of job {} failed: {e}", self.job.handle());
                }
            }
        }
    }

    fn read(&mut self, bytes: usize) -> VfsResult<Vec<u8>> {
        let token = self.token.clone();
        let resource = self.resource()?;
        let mut buffer = vec![0; bytes];

        let count = resource.read(&mut buffer, &token)?;
        buffer.truncate(count);

        Ok(buffer)
    }

    fn get_file_info(&self, uris: Vec<Uri>, options: FileInfoOptions) -> Vec<FileInfoResult> {
        uris.into_iter()
            .map(|uri| {
                let result = self.shared.backend.get_file_info(&uri, options, &self.token);
                FileInfoResult { uri, result }
            })
            .collect()
    }

    /// Applies the change, then reads the info back from where the file now
    /// lives.
    fn set_file_info(
        &self,
        uri: &Uri,
        info: &FileInfo,
        mask: SetFileInfoMask,
        options: FileInfoOptions,
    ) -> (VfsResult<()>, Option<FileInfo>) {
        if let Err(e) = self
            .shared
            .backend
            .set_file_info(uri, info, mask, &self.token)
        {
            return (Err(e), None);
        }

        let current = if mask.contains(SetFileInfoMask::NAME) {
            match uri.parent() {
                Some(parent) => parent.append_file_name(&info.name),
                None => uri.clone(),
            }
        } else {
            uri.clone()
        };

        let info = self
            .shared
            .backend
            .get_file_info(&current, options, &self.token)
            .map_err(|e| debug!("re-reading {current} after set_file_info: {e}"))
            .ok();

        (Ok(()), info)
    }

    fn find_directory(
        &self,
        near: Vec<Uri>,
        kind: FindDirectoryKind,
        create_if_needed: bool,
        find_if_needed: bool,
        permissions: u32,
    ) -> Vec<FindDirectoryResult> {
        near.into_iter()
            .map(|near| {
                let result = self.shared.backend.find_directory(
                    &near,
                    kind,
                    create_if_needed,
                    find_if_needed,
                    permissions,
                    &self.token,
                );
                FindDirectoryResult { near, result }
            })
            .collect()
    }

    /// Streams the directory in batches of `items_per_notification`; the last
    /// notification carries `Err(Eof)` or the error that stopped the listing.
    fn load_directory(
        &self,
        uri: &Uri,
        options: FileInfoOptions,
        items_per_notification: usize,
        callback: LoadDirectoryCallback,
    ) {
        let mut directory = match self.shared.backend.open_directory(uri, options, &self.token) {
            Ok(directory) => directory,
            Err(e) => {
                self.oneway(Payload::LoadDirectory {
                    result: Err(e),
                    entries: Vec::new(),
                    callback,
                });
                return;
            }
        };

        let mut entries = Vec::with_capacity(items_per_notification);

        let result = loop {
            if let Err(e) = self.token.check() {
                break Err(e);
            }

            match directory.read_next(&self.token) {
                Ok(entry) => {
                    entries.push(entry);

                    if entries.len() == items_per_notification {
                        let batch = mem::replace(
                            &mut entries,
                            Vec::with_capacity(items_per_notification),
                        );

                        self.oneway(Payload::LoadDirectory {
                            result: Ok(()),
                            entries: batch,
                            callback: callback.clone(),
                        });
                    }
                }
                Err(e) => break Err(e),
            }
        };

        self.oneway(Payload::LoadDirectory {
            result,
            entries,
            callback,
        });
    }

    /// Runs the transfer, routing every progress report through the issuing
    /// loop and back.
    fn xfer(&self, request: &XferRequest, callback: XferCallback) {
        let mut progress = |info: &XferProgressInfo| -> XferReply {
            if self.token.is_cancelled() {
                return XferReply::Abort;
            }

            let payload = Payload::Xfer {
                info: info.clone(),
                callback: callback.clone(),
            };

            match self.synchronous(payload) {
                Reply::Xfer(reply) => reply,
                Reply::Ack | Reply::Cancelled => XferReply::Abort,
            }
        };

        let result = self
            .shared
            .backend
            .xfer(request, &mut progress, &self.token);

        match result {
            Ok(()) | Err(VfsError::Interrupted) => {}
            Err(e) => {
                debug!("xfer of job {} failed: {e}", self.job.handle());

                let info = XferProgressInfo {
                    status: XferProgressStatus::VfsError,
                    vfs_status: Some(e.kind()),
                    phase: XferPhase::Completed,
                    ..XferProgressInfo::default()
                };

                progress(&info);
            }
        }
    }

    /// Opens the bridge for a channel job, hands the consumer its end and
    /// serves until the stream ends. The resource is always closed here.
    fn serve_channel(
        &mut self,
        opened: VfsResult<Box<dyn FileHandle>>,
        mode: OpenMode,
        advised_block_size: usize,
        callback: ChannelCallback,
    ) {
        let mut resource = match opened {
            Ok(resource) => resource,
            Err(error) => {
                self.failed = true;
                self.oneway(Payload::ChannelFailed { error, callback });
                return;
            }
        };

        let bridge = Direction::from_mode(mode)
            .ok_or_else(|| VfsError::BadParameters("channels need exactly one of READ or WRITE".into()))
            .and_then(|direction| {
                Bridge::new(direction, advised_block_size)
                    .map_err(|e| VfsError::Internal(e.to_string()))
            });

        match bridge {
            Ok((bridge, channel)) => match self.synchronous(Payload::Channel { channel, callback }) {
                Reply::Ack => {
                    if let Err(e) = bridge.serve(resource.as_mut(), &self.token) {
                        debug!("channel of job {} stopped: {e}", self.job.handle());
                    }
                }
                Reply::Xfer(_) | Reply::Cancelled => {
                    debug!("channel of job {} cancelled before handoff", self.job.handle());
                }
            },
            Err(error) => {
                warn!("cannot set up channel for job {}: {error}", self.job.handle());
                self.failed = true;
                self.oneway(Payload::ChannelFailed { error, callback });
            }
        }

        if let Err(e) = resource.close(&CancellationToken::new()) {
            debug!("closing channel resource of job {}: {e}", self.job.handle());
        }
    }

    fn oneway(&self, payload: Payload) {
        self.oneway_as(self.kind, payload);
    }

    fn oneway_as(&self, kind: OpKind, payload: Payload) {
        let result = NotifyResult::new(self.job.handle(), kind, payload);
        self.shared
            .notifier
            .oneway(&self.shared.callbacks, self.job, result);
    }

    fn synchronous(&self, payload: Payload) -> Reply {
        let result = NotifyResult::new(self.job.handle(), self.kind, payload);
        self.shared
            .notifier
            .synchronous(&self.shared.callbacks, self.job, result)
    }
}
