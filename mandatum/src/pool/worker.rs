use super::JobRunner;
use super::queue::PendingQueue;

use log::trace;
use std::sync::{Arc, Weak};

/// A pool thread.
///
/// The loop is:
/// 1. Wait for the highest-priority pending job the limit allows
/// 2. Hand it to the runner
/// 3. Report completion so the next job can start
///
/// It ends when the queue tells it to (shutdown or a lowered limit), or
/// when the engine that owns the runner is gone.
pub(crate) struct Worker {
    id: usize,
    queue: Arc<PendingQueue>,
    runner: Weak<dyn JobRunner>,
}

impl Worker {
    pub(crate) fn new(id: usize, queue: Arc<PendingQueue>, runner: Weak<dyn JobRunner>) -> Self {
        Self { id, queue, runner }
    }

    pub(crate) fn run(&self) {
        trace!("worker {} started", self.id);

        while let Some(next) = self.queue.next() {
            let runner = self.runner.upgrade();

            if let Some(runner) = runner {
                trace!(
                    "worker {} picked job {} (priority {})",
                    self.id, next.handle, next.priority
                );
                runner.run(next.handle);
            }

            self.queue.finish();
        }

        trace!("worker {} exiting", self.id);
    }
}
