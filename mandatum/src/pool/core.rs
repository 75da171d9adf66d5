use super::JobRunner;
use super::queue::{PendingJob, PendingQueue, QueueState};
use super::worker::Worker;
use crate::error::{VfsError, VfsResult};
use crate::job::Handle;

use log::{debug, warn};
use parking_lot::Mutex;
use std::io;
use std::sync::Weak;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Bounded, priority-ordered thread pool.
///
/// The `WorkerPool` is responsible for:
/// - keeping the pending queue ordered by priority then age,
/// - spawning worker threads on demand, up to the job limit,
/// - refusing work once shut down,
/// - joining its threads.
pub(crate) struct WorkerPool {
    queue: Arc<PendingQueue>,

    /// Weak so the pool does not keep the engine alive.
    runner: Weak<dyn JobRunner>,

    /// Floor for the job limit; this many threads are started eagerly.
    min_threads: usize,

    thread_name: String,

    /// Join handles of every thread spawned so far.
    workers: Mutex<Vec<JoinHandle<()>>>,

    /// Source of worker ids.
    spawned: AtomicUsize,
}

impl WorkerPool {
    /// Creates a pool running at most `max_threads` jobs at once and starts
    /// `min_threads` idle workers.
    pub(crate) fn new(
        max_threads: usize,
        min_threads: usize,
        thread_name: String,
        runner: Weak<dyn JobRunner>,
    ) -> Self {
        let pool = Self {
            queue: Arc::new(PendingQueue::new(max_threads.max(min_threads))),
            runner,
            min_threads,
            thread_name,
            workers: Mutex::new(Vec::new()),
            spawned: AtomicUsize::new(0),
        };

        {
            let mut state = pool.queue.lock();
            for _ in 0..min_threads {
                if let Err(e) = pool.spawn_worker(&mut state) {
                    warn!("cannot start worker thread: {e}");
                    break;
                }
            }
        }

        pool
    }

    /// Queues the job behind `handle`.
    ///
    /// # Errors
    ///
    /// - [`VfsError::Rejected`] after [`shutdown`](Self::shutdown)
    /// - [`VfsError::Internal`] if no thread exists and none can be spawned
    pub(crate) fn submit(&self, handle: Handle, priority: i32) -> VfsResult<()> {
        let mut state = self.queue.lock();

        if state.shutdown {
            return Err(VfsError::Rejected);
        }

        state.pending.push(PendingJob { priority, handle });

        if let Err(e) = self.grow(&mut state) {
            if state.threads == 0 {
                state.pending.retain(|p| p.handle != handle);
                return Err(VfsError::Internal(format!("cannot start worker thread: {e}")));
            }

            warn!("cannot start extra worker thread: {e}");
        }

        drop(state);
        self.queue.notify_one();

        Ok(())
    }

    /// Changes the maximum number of concurrently running jobs.
    ///
    /// Lowering the limit never interrupts running jobs; surplus threads
    /// exit once idle.
    pub(crate) fn set_limit(&self, limit: usize) -> VfsResult<()> {
        if limit < self.min_threads {
            return Err(VfsError::BadParameters(format!(
                "job limit {limit} is below the minimum of {}",
                self.min_threads
            )));
        }

        let mut state = self.queue.lock();
        debug!("job limit {} -> {limit}", state.limit);
        state.limit = limit;

        if let Err(e) = self.grow(&mut state) {
            warn!("cannot start extra worker thread: {e}");
        }

        drop(state);
        self.queue.notify_all();

        Ok(())
    }

    pub(crate) fn limit(&self) -> usize {
        self.queue.lock().limit
    }

    /// Jobs running plus jobs waiting to run.
    pub(crate) fn active_jobs(&self) -> usize {
        let state = self.queue.lock();
        state.running + state.pending.len()
    }

    /// Stops accepting jobs. Pending jobs still run.
    pub(crate) fn shutdown(&self) {
        self.queue.lock().shutdown = true;
        self.queue.notify_all();
    }

    /// Waits for every worker thread to exit. Call after
    /// [`shutdown`](Self::shutdown).
    pub(crate) fn join(&self) {
        let handles: Vec<_> = self.workers.lock().drain(..).collect();
        let current = thread::current().id();

        for handle in handles {
            if handle.thread().id() == current {
                continue;
            }

            let _ = handle.join();
        }
    }

    /// Spawns threads until every pending job has one, within the limit.
    fn grow(&self, state: &mut QueueState) -> io::Result<()> {
        while state.threads < state.limit && state.pending.len() > state.idle() {
            self.spawn_worker(state)?;
        }

        Ok(())
    }

    fn spawn_worker(&self, state: &mut QueueState) -> io::Result<()> {
        let id = self.spawned.fetch_add(1, Ordering::Relaxed);
        let worker = Worker::new(id, self.queue.clone(), self.runner.clone());

        let handle = thread::Builder::new()
            .name(format!("{}-{id}", self.thread_name))
            .spawn(move || worker.run())?;

        state.threads += 1;
        self.workers.lock().push(handle);

        debug!("spawned worker {id} ({} threads)", state.threads);

        Ok(())
    }
}
