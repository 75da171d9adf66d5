use super::{Engine, Shared};
use crate::backend::Backend;
use crate::notify::{EventLoop, Notifier};
use crate::pool::{JobRunner, WorkerPool};

use std::sync::{Arc, Weak};

/// Builder for configuring and creating an engine.
///
/// `EngineBuilder` sets the worker pool parameters before the engine and
/// its event loop are created.
///
/// # Examples
///
/// ```rust,ignore
/// let (engine, event_loop) = EngineBuilder::new()
///     .max_threads(4)
///     .thread_name("vfs")
///     .build(Arc::new(MemoryBackend::new()));
/// ```
pub struct EngineBuilder {
    /// Initial job limit.
    max_threads: usize,

    /// Threads started eagerly; the job limit can never go below it.
    min_threads: usize,

    /// Prefix of worker thread names.
    thread_name: String,
}

impl EngineBuilder {
    /// Creates a builder with at most 10 running jobs and 2 threads started
    /// up front.
    pub fn new() -> Self {
        Self {
            max_threads: 10,
            min_threads: 2,
            thread_name: "mandatum-worker".to_string(),
        }
    }

    /// Sets how many jobs may run at once.
    ///
    /// A value below [`min_threads`](Self::min_threads) is raised to it.
    ///
    /// # Panics
    ///
    /// Panics if `n == 0`.
    pub fn max_threads(mut self, n: usize) -> Self {
        assert!(n > 0, "max_threads must be > 0");

        self.max_threads = n;
        self
    }

    /// Sets how many worker threads start immediately.
    pub fn min_threads(mut self, n: usize) -> Self {
        self.min_threads = n;
        self
    }

    pub fn thread_name(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name = prefix.into();
        self
    }

    /// Builds the engine and the event loop that delivers its callbacks.
    ///
    /// The loop must be driven from the thread that should run the
    /// callbacks. Dropping it shuts the engine down.
    pub fn build(self, backend: Arc<dyn Backend>) -> (Engine, EventLoop) {
        let (notifier, receiver) = Notifier::new();

        let shared = Arc::new_cyclic(|weak: &Weak<Shared>| {
            let runner: Weak<dyn JobRunner> = weak.clone();
            let pool = WorkerPool::new(self.max_threads, self.min_threads, self.thread_name, runner);

            Shared::new(backend, notifier, pool)
        });

        let engine = Engine::new(shared);
        let event_loop = EventLoop::new(engine.clone(), receiver);

        (engine, event_loop)
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
