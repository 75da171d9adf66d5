use super::{Shared, close_orphan};
use crate::backend::{
    FileInfo, FileInfoOptions, FileInfoResult, FindDirectoryKind, FindDirectoryResult, OpenMode,
    SetFileInfoMask, Uri, XferProgressInfo, XferReply, XferRequest,
};
use crate::error::{VfsError, VfsResult};
use crate::job::{Handle, Job, JobState, Op, validate_priority};
use crate::notify::EventLoop;
use crate::stream::{Channel, Direction};

use log::{debug, trace, warn};
use parking_lot::Mutex;
use std::any::Any;
use std::io::SeekFrom;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;

/// How long a continuation waits before looking at a busy job again.
const CONTINUATION_POLL: Duration = Duration::from_micros(100);

/// Longest single loop wait while shutdown drains the pool.
const SHUTDOWN_SLICE: Duration = Duration::from_millis(20);

/// Entry point for issuing file operations.
///
/// `Engine` is responsible for:
/// - registering a job for every operation and handing it to the pool,
/// - continuing open jobs with read, write, seek, file control and close,
/// - cancelling jobs,
/// - tuning and shutting down the worker pool.
///
/// Every method returns without waiting for the backend. Results arrive as
/// callbacks on the thread driving the [`EventLoop`] built alongside the
/// engine. The engine is cheap to clone; all clones drive the same jobs.
#[derive(Clone)]
pub struct Engine {
    pub(crate) shared: Arc<Shared>,
}

impl Engine {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Opens `uri`. On success the handle stays valid for
    /// [`read`](Self::read), [`write`](Self::write), [`seek`](Self::seek),
    /// [`file_control`](Self::file_control) until [`close`](Self::close).
    ///
    /// # Errors
    ///
    /// - [`VfsError::BadParameters`] for an out-of-range priority
    /// - [`VfsError::Rejected`] once the engine is shutting down
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// engine.open(Uri::parse("mem:///notes.txt")?, OpenMode::READ, PRIORITY_DEFAULT, |handle, result| {
    ///     if result.is_ok() {
    ///         println!("{handle} is open");
    ///     }
    /// })?;
    /// ```
    pub fn open<F>(&self, uri: Uri, mode: OpenMode, priority: i32, callback: F) -> VfsResult<Handle>
    where
        F: FnOnce(Handle, VfsResult<()>) + Send + 'static,
    {
        self.submit(
            priority,
            Op::Open {
                uri,
                mode,
                callback: Box::new(callback),
            },
        )
    }

    /// Opens `uri` and streams it through a pipe.
    ///
    /// `mode` must contain exactly one of `READ` and `WRITE`. The callback
    /// receives the consumer end; the job ends when the stream does and the
    /// handle accepts no continuation.
    pub fn open_as_channel<F>(
        &self,
        uri: Uri,
        mode: OpenMode,
        advised_block_size: usize,
        priority: i32,
        callback: F,
    ) -> VfsResult<Handle>
    where
        F: FnOnce(Handle, VfsResult<Channel>) + Send + 'static,
    {
        check_channel_mode(mode)?;

        self.submit(
            priority,
            Op::OpenAsChannel {
                uri,
                mode,
                advised_block_size,
                callback: Box::new(callback),
            },
        )
    }

    /// Creates `uri`, failing if it exists and `exclusive` is set.
    pub fn create<F>(
        &self,
        uri: Uri,
        mode: OpenMode,
        exclusive: bool,
        permissions: u32,
        priority: i32,
        callback: F,
    ) -> VfsResult<Handle>
    where
        F: FnOnce(Handle, VfsResult<()>) + Send + 'static,
    {
        self.submit(
            priority,
            Op::Create {
                uri,
                mode,
                exclusive,
                permissions,
                callback: Box::new(callback),
            },
        )
    }

    /// Creates `uri` and streams into it through a pipe.
    pub fn create_as_channel<F>(
        &self,
        uri: Uri,
        mode: OpenMode,
        exclusive: bool,
        permissions: u32,
        priority: i32,
        callback: F,
    ) -> VfsResult<Handle>
    where
        F: FnOnce(Handle, VfsResult<Channel>) + Send + 'static,
    {
        check_channel_mode(mode)?;

        self.submit(
            priority,
            Op::CreateAsChannel {
                uri,
                mode,
                exclusive,
                permissions,
                callback: Box::new(callback),
            },
        )
    }

    /// Creates a symbolic link at `uri` pointing to `target`.
    pub fn create_symbolic_link<F>(
        &self,
        uri: Uri,
        target: impl Into<String>,
        priority: i32,
        callback: F,
    ) -> VfsResult<Handle>
    where
        F: FnOnce(Handle, VfsResult<()>) + Send + 'static,
    {
        self.submit(
            priority,
            Op::CreateSymbolicLink {
                uri,
                target: target.into(),
                callback: Box::new(callback),
            },
        )
    }

    /// Looks up every URI in `uris`. The callback receives one result per
    /// URI, in order.
    pub fn get_file_info<F>(
        &self,
        uris: Vec<Uri>,
        options: FileInfoOptions,
        priority: i32,
        callback: F,
    ) -> VfsResult<Handle>
    where
        F: FnOnce(Handle, Vec<FileInfoResult>) + Send + 'static,
    {
        self.submit(
            priority,
            Op::GetFileInfo {
                uris,
                options,
                callback: Box::new(callback),
            },
        )
    }

    /// Applies the fields of `info` selected by `mask` to `uri`.
    ///
    /// After a successful change the info is read back, from the new
    /// location if the name changed, and passed to the callback.
    pub fn set_file_info<F>(
        &self,
        uri: Uri,
        info: FileInfo,
        mask: SetFileInfoMask,
        options: FileInfoOptions,
        priority: i32,
        callback: F,
    ) -> VfsResult<Handle>
    where
        F: FnOnce(Handle, VfsResult<()>, Option<FileInfo>) + Send + 'static,
    {
        self.submit(
            priority,
            Op::SetFileInfo {
                uri,
                info,
                mask,
                options,
                callback: Box::new(callback),
            },
        )
    }

    /// Locates (and optionally creates) a special directory such as the
    /// trash for every URI in `near_uris`.
    #[allow(clippy::too_many_arguments)]
    pub fn find_directory<F>(
        &self,
        near_uris: Vec<Uri>,
        kind: FindDirectoryKind,
        create_if_needed: bool,
        find_if_needed: bool,
        permissions: u32,
        priority: i32,
        callback: F,
    ) -> VfsResult<Handle>
    where
        F: FnOnce(Handle, Vec<FindDirectoryResult>) + Send + 'static,
    {
        self.submit(
            priority,
            Op::FindDirectory {
                near: near_uris,
                kind,
                create_if_needed,
                find_if_needed,
                permissions,
                callback: Box::new(callback),
            },
        )
    }

    /// Lists `uri`.
    ///
    /// The callback runs once per `items_per_notification` entries and once
    /// more at the end, with `Err(Eof)` when the listing completed or the
    /// error that stopped it.
    pub fn load_directory<F>(
        &self,
        uri: Uri,
        options: FileInfoOptions,
        items_per_notification: usize,
        priority: i32,
        callback: F,
    ) -> VfsResult<Handle>
    where
        F: FnMut(Handle, VfsResult<()>, Vec<FileInfo>) + Send + 'static,
    {
        if items_per_notification == 0 {
            return Err(VfsError::BadParameters(
                "items_per_notification must be > 0".into(),
            ));
        }

        self.submit(
            priority,
            Op::LoadDirectory {
                uri,
                options,
                items_per_notification,
                callback: Arc::new(Mutex::new(Box::new(callback))),
            },
        )
    }

    /// Copies or moves files.
    ///
    /// The worker waits for the callback's answer to every progress report:
    /// `Continue` to go on, `Abort` to stop, and the skip/retry/replace
    /// answers to error and overwrite queries.
    pub fn xfer<F>(&self, request: XferRequest, priority: i32, callback: F) -> VfsResult<Handle>
    where
        F: FnMut(Handle, &XferProgressInfo) -> XferReply + Send + 'static,
    {
        self.submit(
            priority,
            Op::Xfer {
                request,
                callback: Arc::new(Mutex::new(Box::new(callback))),
            },
        )
    }

    /// Reads up to `bytes` bytes from an open handle.
    ///
    /// # Errors
    ///
    /// - [`VfsError::InvalidHandle`] if `handle` is not an open job
    /// - [`VfsError::BadParameters`] if `handle` is a channel job
    pub fn read<F>(&self, handle: Handle, bytes: usize, callback: F) -> VfsResult<()>
    where
        F: FnOnce(Handle, VfsResult<Vec<u8>>) + Send + 'static,
    {
        self.continue_job(
            handle,
            Op::Read {
                bytes,
                callback: Box::new(callback),
            },
        )
    }

    /// Writes `data` to an open handle. The callback receives the number of
    /// bytes the backend accepted.
    pub fn write<F>(&self, handle: Handle, data: Vec<u8>, callback: F) -> VfsResult<()>
    where
        F: FnOnce(Handle, VfsResult<usize>) + Send + 'static,
    {
        self.continue_job(
            handle,
            Op::Write {
                data,
                callback: Box::new(callback),
            },
        )
    }

    pub fn seek<F>(&self, handle: Handle, position: SeekFrom, callback: F) -> VfsResult<()>
    where
        F: FnOnce(Handle, VfsResult<u64>) + Send + 'static,
    {
        self.continue_job(
            handle,
            Op::Seek {
                position,
                callback: Box::new(callback),
            },
        )
    }

    /// Closes an open handle. The handle is invalid once the callback ran.
    pub fn close<F>(&self, handle: Handle, callback: F) -> VfsResult<()>
    where
        F: FnOnce(Handle, VfsResult<()>) + Send + 'static,
    {
        self.continue_job(
            handle,
            Op::Close {
                callback: Some(Box::new(callback)),
            },
        )
    }

    /// Runs a backend-specific `operation` on an open handle.
    ///
    /// `data` goes to the backend by mutable reference and comes back to the
    /// callback, changed or not. Dropping it there releases it.
    pub fn file_control<F>(
        &self,
        handle: Handle,
        operation: impl Into<String>,
        data: Box<dyn Any + Send>,
        callback: F,
    ) -> VfsResult<()>
    where
        F: FnOnce(Handle, VfsResult<()>, Box<dyn Any + Send>) + Send + 'static,
    {
        self.continue_job(
            handle,
            Op::FileControl {
                operation: operation.into(),
                data,
                callback: Box::new(callback),
            },
        )
    }

    /// Cancels whatever `handle` is doing.
    ///
    /// A job that has not started yet is dropped and its callback never
    /// runs. A running job sees its [`CancellationToken`](crate::CancellationToken) tripped, and
    /// results already on their way to the loop are discarded. Cancelling a
    /// finished handle does nothing.
    pub fn cancel(&self, handle: Handle) {
        let mut handles = self.shared.handles.lock();
        let job = handles.lookup(handle);

        let Some(job) = job else {
            let marked = self.shared.callbacks.cancel_job_and_callbacks(handle, None);
            debug!("cancel {handle}: no job, {marked} pending callbacks dropped");
            return;
        };

        let inner = job.lock();
        inner.token.cancel();

        let remove = inner.state == JobState::Scheduled && inner.resource.is_none();
        let marked = self
            .shared
            .callbacks
            .cancel_job_and_callbacks(handle, Some(&*job));

        drop(inner);

        if remove {
            handles.remove(handle);
        }

        debug!("cancel {handle}: {marked} pending callbacks dropped, removed: {remove}");
    }

    /// Changes how many jobs may run at once.
    ///
    /// # Errors
    ///
    /// [`VfsError::BadParameters`] if `limit` is below the configured
    /// minimum thread count.
    pub fn set_job_limit(&self, limit: usize) -> VfsResult<()> {
        self.shared.pool.set_limit(limit)
    }

    pub fn job_limit(&self) -> usize {
        self.shared.pool.limit()
    }

    /// Number of live handles.
    pub fn job_count(&self) -> usize {
        self.shared.handles.lock().len()
    }

    /// Jobs running or waiting for a worker.
    pub fn active_job_count(&self) -> usize {
        self.shared.pool.active_jobs()
    }

    /// Shuts the engine down.
    ///
    /// This performs the following steps:
    /// 1. Refuses new jobs and continuations
    /// 2. Dispatches notifications on `event_loop` until no job runs or waits
    /// 3. Joins all worker threads
    /// 4. Dispatches what is still queued
    /// 5. Closes the resources of handles nobody closed
    ///
    /// Calling it again does nothing. Dropping the [`EventLoop`] calls it.
    ///
    /// # Errors
    ///
    /// [`VfsError::BadParameters`] if `event_loop` belongs to another engine.
    pub fn shutdown(&self, event_loop: &EventLoop) -> VfsResult<()> {
        if !Arc::ptr_eq(&event_loop.engine().shared, &self.shared) {
            return Err(VfsError::BadParameters(
                "event loop belongs to another engine".into(),
            ));
        }

        if self.shared.shut_down.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        debug!(
            "shutting down with {} live jobs and {} pending notifications",
            self.job_count(),
            self.shared.callbacks.len()
        );

        self.shared.pool.shutdown();
        self.shared.handles.lock().begin_shutdown();

        while self.shared.pool.active_jobs() > 0 {
            event_loop.dispatch_timeout(SHUTDOWN_SLICE);
        }

        self.shared.pool.join();
        event_loop.dispatch_pending();

        let leftover = self.shared.handles.lock().drain();
        for job in leftover {
            let resource = job.lock().resource.take();

            if let Some(resource) = resource {
                warn!("job {} still open at shutdown, closing it", job.handle());
                close_orphan(job.handle(), resource);
            }
        }

        self.shared.callbacks.shutdown();
        debug!("shutdown complete");

        Ok(())
    }

    /// Bookkeeping for a cancelled oneway result reaching the loop: an open
    /// that completed before the cancel still holds its resource, and no
    /// one else will close it.
    pub(crate) fn finish_cancelled(&self, handle: Handle) {
        let mut handles = self.shared.handles.lock();

        let Some(job) = handles.lookup(handle) else {
            return;
        };

        let mut inner = job.lock();

        if inner.state == JobState::Continuable && inner.kind.is_open() && inner.resource.is_some()
        {
            debug!("job {handle} cancelled after open, closing");
            let orphan = self.shared.close_silently(&mut handles, &job, &mut inner);

            drop(inner);
            drop(handles);

            if let Some(resource) = orphan {
                close_orphan(handle, resource);
            }
        }
    }

    fn submit(&self, priority: i32, op: Op) -> VfsResult<Handle> {
        validate_priority(priority)?;

        let kind = op.kind();
        let mut handles = self.shared.handles.lock();

        let job = handles.create(|handle| Job::new(handle, priority, op))?;
        let handle = job.handle();

        let mut inner = job.lock();
        inner.state = JobState::Scheduled;

        if let Err(e) = self.shared.pool.submit(handle, priority) {
            warn!("cannot schedule {kind} job {handle}: {e}");
            inner.state = JobState::Terminal;
            drop(inner);
            handles.remove(handle);

            return Err(e);
        }

        debug!("job {handle} created for {kind} (priority {priority})");

        Ok(handle)
    }

    /// Installs `op` on a continuable job and schedules it.
    ///
    /// Waits while the job is queued or running, so operations on one
    /// handle never overlap.
    fn continue_job(&self, handle: Handle, op: Op) -> VfsResult<()> {
        let kind = op.kind();

        loop {
            let mut handles = self.shared.handles.lock();

            let Some(job) = handles.lookup(handle) else {
                return Err(VfsError::InvalidHandle(handle));
            };

            let mut inner = job.lock();

            if inner.kind.is_channel() {
                return Err(VfsError::BadParameters(format!(
                    "{kind} on channel job {handle}"
                )));
            }

            if inner.state.is_busy() {
                if inner.kind.ends_job() {
                    return Err(VfsError::InvalidHandle(handle));
                }

                drop(inner);
                drop(handles);

                thread::sleep(CONTINUATION_POLL);
                continue;
            }

            if inner.state != JobState::Continuable {
                return Err(VfsError::InvalidHandle(handle));
            }

            job.set(&mut inner, op);

            if let Err(e) = self.shared.pool.submit(handle, job.priority()) {
                warn!("cannot schedule {kind} on job {handle}: {e}");
                inner.state = JobState::Terminal;
                let orphan = inner.resource.take();
                drop(inner);
                handles.remove(handle);
                drop(handles);

                if let Some(resource) = orphan {
                    close_orphan(handle, resource);
                }

                return Err(e);
            }

            trace!("job {handle} continued with {kind}");

            return Ok(());
        }
    }
}

fn check_channel_mode(mode: OpenMode) -> VfsResult<()> {
    match Direction::from_mode(mode) {
        Some(_) => Ok(()),
        None => Err(VfsError::BadParameters(
            "channels need exactly one of READ or WRITE".into(),
        )),
    }
}
