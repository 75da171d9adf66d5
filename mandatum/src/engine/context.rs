use super::Shared;
use crate::error::{VfsError, VfsResult};
use crate::job::{Job, OpKind};
use crate::notify::{NotifyResult, Payload, Reply};

use std::cell::RefCell;
use std::sync::{Arc, mpsc};

struct JobContext {
    shared: Arc<Shared>,
    job: Arc<Job>,
}

thread_local! {
    static CURRENT_JOB: RefCell<Option<JobContext>> = const { RefCell::new(None) };
}

/// Restores the previous context even if the job panics.
struct ContextGuard {
    prev: Option<JobContext>,
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        let prev = self.prev.take();
        CURRENT_JOB.with(|cell| cell.replace(prev));
    }
}

/// Runs `f` with `job` installed as the current job of this worker thread.
pub(crate) fn enter_job<R>(shared: Arc<Shared>, job: Arc<Job>, f: impl FnOnce() -> R) -> R {
    let prev = CURRENT_JOB.with(|cell| cell.replace(Some(JobContext { shared, job })));
    let _guard = ContextGuard { prev };

    f()
}

/// Runs `f` on the issuing loop and waits for its return value.
///
/// Meant for backends that need something only the issuing side can do
/// (asking the user, touching loop-owned state) in the middle of an
/// operation. The calling worker blocks until the loop ran `f`.
///
/// # Errors
///
/// - [`VfsError::BadParameters`] when called outside a backend call made by
///   an engine worker
/// - [`VfsError::Cancelled`] if the job is cancelled before the loop gets to
///   `f`, or the loop is gone
///
/// # Examples
///
/// ```rust,ignore
/// fn open(&self, uri: &Uri, mode: OpenMode, token: &CancellationToken) -> VfsResult<Box<dyn FileHandle>> {
///     let password = mandatum::request_on_loop(|| prompt_password())?;
///     self.connect(uri, &password)
/// }
/// ```
pub fn request_on_loop<R, F>(f: F) -> VfsResult<R>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    let current = CURRENT_JOB.with(|cell| {
        cell.borrow()
            .as_ref()
            .map(|context| (context.shared.clone(), context.job.clone()))
    });

    let Some((shared, job)) = current else {
        return Err(VfsError::BadParameters(
            "request_on_loop called outside a job".into(),
        ));
    };

    let (sender, receiver) = mpsc::sync_channel(1);
    let request = Box::new(move || {
        let _ = sender.send(f());
    });

    let result = NotifyResult::new(
        job.handle(),
        OpKind::BackendRequest,
        Payload::Request { request },
    );

    match shared.notifier.synchronous(&shared.callbacks, &job, result) {
        Reply::Ack => receiver
            .try_recv()
            .map_err(|_| VfsError::Internal("request produced no answer".into())),
        Reply::Xfer(_) | Reply::Cancelled => Err(VfsError::Cancelled),
    }
}
