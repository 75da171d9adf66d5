use crate::job::Handle;

use parking_lot::{Condvar, Mutex, MutexGuard};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// An entry of the pending queue.
#[derive(Clone, Copy, Debug)]
pub(crate) struct PendingJob {
    pub(crate) priority: i32,
    pub(crate) handle: Handle,
}

impl Eq for PendingJob {}

impl PartialEq for PendingJob {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Ord for PendingJob {
    /// Higher priority first, then lower handle (older job) first.
    ///
    /// `BinaryHeap` pops the greatest entry, so the handle comparison is
    /// **reversed**.
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.handle.cmp(&self.handle))
    }
}

impl PartialOrd for PendingJob {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Pool bookkeeping guarded by the queue lock.
pub(crate) struct QueueState {
    pub(crate) pending: BinaryHeap<PendingJob>,

    /// Jobs currently executing.
    pub(crate) running: usize,

    /// Maximum number of jobs executing at once.
    pub(crate) limit: usize,

    /// Live worker threads.
    pub(crate) threads: usize,

    pub(crate) shutdown: bool,
}

impl QueueState {
    /// Threads that are alive but not executing a job.
    pub(crate) fn idle(&self) -> usize {
        self.threads - self.running
    }
}

/// Pending queue shared by the pool and its workers.
///
/// Workers sleep on the condition variable until a job is pushed, a running
/// job finishes, the limit changes, or shutdown begins.
pub(crate) struct PendingQueue {
    state: Mutex<QueueState>,
    condvar: Condvar,
}

impl PendingQueue {
    pub(crate) fn new(limit: usize) -> Self {
        Self {
            state: Mutex::new(QueueState {
                pending: BinaryHeap::new(),
                running: 0,
                limit,
                threads: 0,
                shutdown: false,
            }),
            condvar: Condvar::new(),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock()
    }

    pub(crate) fn notify_one(&self) {
        self.condvar.notify_one();
    }

    pub(crate) fn notify_all(&self) {
        self.condvar.notify_all();
    }

    /// Blocks until a job may start and returns it.
    ///
    /// Returns `None` when the calling worker should exit: the pool is shut
    /// down and drained, or the limit was lowered below the thread count.
    pub(crate) fn next(&self) -> Option<PendingJob> {
        let mut state = self.state.lock();

        loop {
            if state.running < state.limit {
                if let Some(job) = state.pending.pop() {
                    state.running += 1;
                    return Some(job);
                }
            }

            if (state.shutdown && state.pending.is_empty()) || state.threads > state.limit {
                state.threads -= 1;
                self.condvar.notify_all();
                return None;
            }

            self.condvar.wait(&mut state);
        }
    }

    /// Records the end of a job started through [`next`](Self::next).
    pub(crate) fn finish(&self) {
        let mut state = self.state.lock();
        state.running -= 1;
        drop(state);

        self.condvar.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending(priority: i32, id: u64) -> PendingJob {
        PendingJob {
            priority,
            handle: Handle::from_raw(id),
        }
    }

    #[test]
    fn higher_priority_pops_first() {
        let mut heap = BinaryHeap::new();
        heap.push(pending(-5, 1));
        heap.push(pending(5, 2));
        heap.push(pending(0, 3));

        let order: Vec<i32> = std::iter::from_fn(|| heap.pop()).map(|p| p.priority).collect();
        assert_eq!(order, vec![5, 0, -5]);
    }

    #[test]
    fn fifo_within_priority_band() {
        let mut heap = BinaryHeap::new();
        for id in [4, 2, 9, 1] {
            heap.push(pending(3, id));
        }

        let order: Vec<u64> = std::iter::from_fn(|| heap.pop())
            .map(|p| p.handle.as_u64())
            .collect();
        assert_eq!(order, vec![1, 2, 4, 9]);
    }
}
