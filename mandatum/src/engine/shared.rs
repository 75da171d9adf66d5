use super::context;
use crate::backend::{Backend, FileHandle};
use crate::cancel::CancellationToken;
use crate::job::{Completion, Execution, Handle, Job, JobInner, JobState, Op, OpKind, completion};
use crate::notify::Notifier;
use crate::pool::{JobRunner, WorkerPool};
use crate::registry::{CallbackRegistry, HandleRegistry, JobMap};

use log::{debug, error, trace, warn};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

/// State shared by every [`Engine`](super::Engine) clone, its event loop
/// and its workers.
pub(crate) struct Shared {
    pub(crate) backend: Arc<dyn Backend>,
    pub(crate) handles: HandleRegistry,
    pub(crate) callbacks: CallbackRegistry,
    pub(crate) pool: WorkerPool,
    pub(crate) notifier: Notifier,

    /// Set once by the first shutdown.
    pub(crate) shut_down: AtomicBool,
}

/// What a worker takes out of a job at pickup.
struct Pickup {
    job: Arc<Job>,
    op: Op,
    resource: Option<Box<dyn FileHandle>>,
    token: CancellationToken,
    cancelled: bool,
}

impl Shared {
    pub(crate) fn new(backend: Arc<dyn Backend>, notifier: Notifier, pool: WorkerPool) -> Self {
        Self {
            backend,
            handles: HandleRegistry::new(),
            callbacks: CallbackRegistry::new(),
            pool,
            notifier,
            shut_down: AtomicBool::new(false),
        }
    }

    /// Moves a scheduled job to `Running` and takes what its operation needs.
    ///
    /// Returns `None` if the job was removed by a cancel while it waited.
    fn pick_up(&self, handle: Handle) -> Option<Pickup> {
        let handles = self.handles.lock();

        let Some(job) = handles.lookup(handle) else {
            trace!("job {handle} vanished before pickup");
            return None;
        };

        let mut inner = job.lock();

        if inner.state != JobState::Scheduled {
            warn!("job {handle} picked up in state {:?}", inner.state);
            return None;
        }

        let Some(op) = inner.op.take() else {
            warn!("job {handle} scheduled without an operation");
            return None;
        };

        inner.state = JobState::Running;
        let resource = inner.resource.take();
        let token = inner.token.clone();
        let cancelled = job.is_cancelled();

        drop(inner);
        drop(handles);

        Some(Pickup {
            job,
            op,
            resource,
            token,
            cancelled,
        })
    }

    /// Puts the resource back and decides the job's fate under the job lock.
    fn complete(
        &self,
        job: &Job,
        resource: Option<Box<dyn FileHandle>>,
        kind: OpKind,
        failed: bool,
    ) {
        let handle = job.handle();
        let mut handles = self.handles.lock();
        let mut inner = job.lock();

        inner.resource = resource;
        inner.kind = kind;
        inner.failed = failed;

        let outcome = completion(kind, job.is_cancelled(), failed, inner.resource.is_some());
        trace!("job {handle} finished {kind}: {outcome:?}");

        let orphan = match outcome {
            Completion::Keep => {
                inner.state = JobState::Continuable;
                None
            }
            Completion::Remove => {
                inner.state = JobState::Terminal;
                let leftover = inner.resource.take();
                handles.remove(handle);

                if leftover.is_some() {
                    warn!("job {handle} removed with an open resource");
                }
                leftover
            }
            Completion::CloseSilently => {
                debug!("job {handle} cancelled after its {kind} succeeded, closing");
                self.close_silently(&mut handles, job, &mut inner)
            }
        };

        drop(inner);
        drop(handles);

        if let Some(resource) = orphan {
            close_orphan(handle, resource);
        }
    }

    /// Drops a job whose operation panicked.
    fn discard(&self, job: &Job) {
        let mut handles = self.handles.lock();
        let mut inner = job.lock();

        inner.state = JobState::Terminal;
        inner.failed = true;
        let leftover = inner.resource.take();
        drop(inner);

        handles.remove(job.handle());
        drop(handles);

        if let Some(resource) = leftover {
            close_orphan(job.handle(), resource);
        }
    }

    /// Schedules a close nobody is told about, or removes the job if the pool
    /// refuses it. Called with the registry and job locks held.
    ///
    /// A refused job hands its resource back; the caller closes it with
    /// [`close_orphan`] once both locks are released.
    #[must_use]
    pub(crate) fn close_silently(
        &self,
        handles: &mut JobMap,
        job: &Job,
        inner: &mut JobInner,
    ) -> Option<Box<dyn FileHandle>> {
        let handle = job.handle();
        job.set(inner, Op::Close { callback: None });

        if let Err(e) = self.pool.submit(handle, job.priority()) {
            warn!("cannot schedule close of job {handle}: {e}");
            inner.state = JobState::Terminal;
            let resource = inner.resource.take();
            handles.remove(handle);

            return resource;
        }

        None
    }
}

/// Closes the resource of a job that can no longer schedule its own close.
/// Must be called without the registry or job lock held.
pub(crate) fn close_orphan(handle: Handle, resource: Box<dyn FileHandle>) {
    trace!("closing resource of job {handle} inline");

    if let Err(e) = resource.close(&CancellationToken::new()) {
        debug!("closing resource of job {handle}: {e}");
    }
}

impl JobRunner for Shared {
    fn run(self: Arc<Self>, handle: Handle) {
        let Some(pickup) = self.pick_up(handle) else {
            return;
        };

        let Pickup {
            job,
            op,
            resource,
            token,
            cancelled,
        } = pickup;

        let mut execution = Execution::new(&self, &job, token, resource, op.kind());

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            context::enter_job(self.clone(), job.clone(), || execution.run(op, cancelled))
        }));

        let Execution {
            resource,
            kind,
            failed,
            ..
        } = execution;

        match outcome {
            Ok(()) => self.complete(&job, resource, kind, failed),
            Err(_) => {
                error!("job {handle} panicked during {kind}");

                if let Some(resource) = resource {
                    let closed =
                        panic::catch_unwind(AssertUnwindSafe(|| close_orphan(handle, resource)));
                    if closed.is_err() {
                        error!("job {handle} panicked again while closing");
                    }
                }

                self.discard(&job);
            }
        }
    }
}
