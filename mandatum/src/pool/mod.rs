//! Bounded worker-thread pool.
//!
//! Jobs wait in a priority-ordered pending queue and are executed by OS
//! threads, at most `limit` at a time. A job already running is never
//! preempted; priorities only order the pending queue.

mod core;
mod queue;
mod worker;

pub(crate) use core::WorkerPool;

use crate::job::Handle;

use std::sync::Arc;

/// Something that knows how to execute the job behind a handle.
///
/// Implemented by the engine's shared state, which the pool only holds
/// weakly.
pub(crate) trait JobRunner: Send + Sync {
    /// Executes one scheduled operation. Called on a worker thread.
    fn run(self: Arc<Self>, handle: Handle);
}
