use super::result::NotifyResult;
use crate::engine::Engine;
use crate::registry::CallbackStatus;

use log::{debug, trace};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

/// Longest single wait inside [`EventLoop::run_until`].
const RUN_UNTIL_SLICE: Duration = Duration::from_millis(10);

/// The issuing side of the engine.
///
/// Every user callback runs on the thread that drives this loop, one
/// notification at a time, in the order workers produced them. The loop only
/// ever waits for notifications; it never waits on a worker.
///
/// Dropping the loop shuts the engine down.
///
/// # Examples
///
/// ```rust,ignore
/// let (engine, event_loop) = EngineBuilder::new().build(backend);
/// let done = Arc::new(AtomicBool::new(false));
///
/// let flag = done.clone();
/// engine.get_file_info(uris, FileInfoOptions::default(), PRIORITY_DEFAULT, move |_, results| {
///     println!("{} answers", results.len());
///     flag.store(true, Ordering::SeqCst);
/// })?;
///
/// event_loop.run_until(Duration::from_secs(5), || done.load(Ordering::SeqCst));
/// ```
pub struct EventLoop {
    engine: Engine,
    receiver: Receiver<NotifyResult>,
}

impl EventLoop {
    pub(crate) fn new(engine: Engine, receiver: Receiver<NotifyResult>) -> Self {
        Self { engine, receiver }
    }

    /// The engine whose notifications this loop dispatches.
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Dispatches every notification already queued, without blocking.
    ///
    /// Returns how many were dispatched.
    pub fn dispatch_pending(&self) -> usize {
        let mut count = 0;

        while let Ok(result) = self.receiver.try_recv() {
            self.dispatch(result);
            count += 1;
        }

        count
    }

    /// Dispatches one notification.
    ///
    /// With `may_block` the call waits until one arrives. Returns `false` if
    /// nothing was dispatched.
    pub fn iterate(&self, may_block: bool) -> bool {
        let next = if may_block {
            self.receiver.recv().ok()
        } else {
            self.receiver.try_recv().ok()
        };

        match next {
            Some(result) => {
                self.dispatch(result);
                true
            }
            None => false,
        }
    }

    /// Waits up to `timeout` for one notification and dispatches it.
    ///
    /// Returns `false` if nothing arrived in time.
    pub fn dispatch_timeout(&self, timeout: Duration) -> bool {
        match self.receiver.recv_timeout(timeout) {
            Ok(result) => {
                self.dispatch(result);
                true
            }
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => false,
        }
    }

    /// Dispatches notifications until `done` returns `true` or `timeout`
    /// elapses. Returns the last value of `done`.
    pub fn run_until(&self, timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;

        loop {
            self.dispatch_pending();

            if done() {
                return true;
            }

            let now = Instant::now();
            if now >= deadline {
                return false;
            }

            self.dispatch_timeout(RUN_UNTIL_SLICE.min(deadline - now));
        }
    }

    /// Routes one notification: to its callback, to the cancellation path,
    /// or nowhere.
    fn dispatch(&self, result: NotifyResult) {
        let handle = result.handle;
        let synchronous = result.is_synchronous();

        match self.engine.shared.callbacks.take(result.callback_id) {
            CallbackStatus::Valid { cancelled: false } => {
                trace!("dispatching {} callback of job {handle}", result.kind);
                result.deliver();
            }
            CallbackStatus::Valid { cancelled: true } => {
                debug!("job {handle} cancelled, skipping {} callback", result.kind);
                result.abandon();

                if !synchronous {
                    self.engine.finish_cancelled(handle);
                }
            }
            CallbackStatus::Invalid => {
                debug!("stale {} callback of job {handle}", result.kind);
                result.abandon();
            }
        }
    }
}

impl Drop for EventLoop {
    /// Shuts the engine down, dispatching what is still in flight.
    fn drop(&mut self) {
        let engine = self.engine.clone();
        let _ = engine.shutdown(self);
    }
}
