use super::state::JobState;
use super::{Handle, Op, OpKind};
use crate::backend::FileHandle;
use crate::cancel::CancellationToken;

use parking_lot::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicBool, Ordering};

/// The live unit of work bound to a [`Handle`].
///
/// A `Job` is registered once and reused for every continuation on the same
/// handle (open → read → read → close). Its mutable part sits behind the
/// job lock, which is always acquired after the handle registry lock and is
/// never held across a backend call.
pub(crate) struct Job {
    handle: Handle,
    priority: i32,

    /// Set by cancellation, cleared when a new operation is installed.
    cancelled: AtomicBool,

    inner: Mutex<JobInner>,
}

/// State guarded by the job lock.
pub(crate) struct JobInner {
    /// The operation to run next. Taken by the worker at pickup.
    pub(crate) op: Option<Op>,

    /// Kind of the current (or last executed) operation.
    pub(crate) kind: OpKind,

    pub(crate) state: JobState,

    /// The open backend resource, absent while a worker is using it.
    pub(crate) resource: Option<Box<dyn FileHandle>>,

    /// Open or create failed; nobody will close this job.
    pub(crate) failed: bool,

    /// Token handed to the backend for the current operation.
    pub(crate) token: CancellationToken,
}

impl Job {
    pub(crate) fn new(handle: Handle, priority: i32, op: Op) -> Self {
        let kind = op.kind();

        Self {
            handle,
            priority,
            cancelled: AtomicBool::new(false),
            inner: Mutex::new(JobInner {
                op: Some(op),
                kind,
                state: JobState::Created,
                resource: None,
                failed: false,
                token: CancellationToken::new(),
            }),
        }
    }

    pub(crate) fn handle(&self) -> Handle {
        self.handle
    }

    pub(crate) fn priority(&self) -> i32 {
        self.priority
    }

    /// Acquires the job lock.
    pub(crate) fn lock(&self) -> MutexGuard<'_, JobInner> {
        self.inner.lock()
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Raises the cancelled flag. Only called with the callback registry
    /// lock held, so registration and cancellation are totally ordered.
    pub(crate) fn mark_cancelled(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Installs the next operation and marks the job scheduled.
    ///
    /// Clears the cancelled flag and hands out a fresh token: a cancel aimed
    /// at the previous operation must not leak into this one.
    pub(crate) fn set(&self, inner: &mut JobInner, op: Op) {
        self.cancelled.store(false, Ordering::Release);

        inner.kind = op.kind();
        inner.op = Some(op);
        inner.token = CancellationToken::new();
        inner.state = JobState::Scheduled;
    }
}

/// What happens to a job once its worker finished an operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Completion {
    /// Keep it registered and wait for a continuation.
    Keep,

    /// Remove it from the registry and drop it.
    Remove,

    /// An open raced with cancellation: release the resource with a close
    /// nobody is told about.
    CloseSilently,
}

/// Decides the fate of a job after its operation ran.
pub(crate) fn completion(
    kind: OpKind,
    cancelled: bool,
    failed: bool,
    has_resource: bool,
) -> Completion {
    match kind {
        OpKind::Open | OpKind::Create => {
            if cancelled && has_resource {
                Completion::CloseSilently
            } else if cancelled || failed {
                Completion::Remove
            } else {
                Completion::Keep
            }
        }
        OpKind::Read | OpKind::Write | OpKind::ReadWriteDone => Completion::Keep,
        OpKind::Seek | OpKind::FileControl => Completion::Keep,
        OpKind::OpenAsChannel
        | OpKind::CreateAsChannel
        | OpKind::CreateSymbolicLink
        | OpKind::Close
        | OpKind::GetFileInfo
        | OpKind::SetFileInfo
        | OpKind::FindDirectory
        | OpKind::LoadDirectory
        | OpKind::Xfer
        | OpKind::BackendRequest => Completion::Remove,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_outcomes() {
        assert_eq!(
            completion(OpKind::Open, false, false, true),
            Completion::Keep
        );
        assert_eq!(
            completion(OpKind::Open, false, true, false),
            Completion::Remove
        );
        assert_eq!(
            completion(OpKind::Create, true, false, false),
            Completion::Remove
        );
        assert_eq!(
            completion(OpKind::Create, true, false, true),
            Completion::CloseSilently
        );
    }

    #[test]
    fn continuations_stay_alive() {
        for kind in [OpKind::ReadWriteDone, OpKind::Seek, OpKind::FileControl] {
            assert_eq!(completion(kind, true, false, true), Completion::Keep);
        }
    }

    #[test]
    fn one_shot_operations_are_removed() {
        for kind in [
            OpKind::Close,
            OpKind::GetFileInfo,
            OpKind::SetFileInfo,
            OpKind::FindDirectory,
            OpKind::LoadDirectory,
            OpKind::Xfer,
            OpKind::CreateSymbolicLink,
            OpKind::OpenAsChannel,
        ] {
            assert_eq!(completion(kind, false, false, false), Completion::Remove);
        }
    }

    #[test]
    fn set_clears_cancellation() {
        let job = Job::new(
            Handle::from_raw(1),
            0,
            Op::Close { callback: None },
        );

        job.mark_cancelled();
        let old_token = job.lock().token.clone();
        old_token.cancel();

        let mut inner = job.lock();
        job.set(&mut inner, Op::Close { callback: None });

        assert!(!job.is_cancelled());
        assert!(!inner.token.is_cancelled());
        assert_eq!(inner.state, JobState::Scheduled);
    }
}
