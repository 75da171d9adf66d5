use crate::error::{VfsError, VfsResult};

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cooperative cancellation flag shared between a job and its backend call.
///
/// Every operation gets a fresh token. [`Engine::cancel`](crate::Engine::cancel)
/// trips it; backends are expected to poll it between units of work.
/// A backend call already blocked inside a single syscall is not interrupted.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Creates a token in the non-cancelled state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Returns `true` once [`cancel`](Self::cancel) has been called.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Returns `Err(VfsError::Cancelled)` if cancellation was requested.
    ///
    /// Convenient as a checkpoint inside backend loops:
    ///
    /// ```rust,ignore
    /// for chunk in chunks {
    ///     token.check()?;
    ///     copy(chunk)?;
    /// }
    /// ```
    pub fn check(&self) -> VfsResult<()> {
        if self.is_cancelled() {
            Err(VfsError::Cancelled)
        } else {
            Ok(())
        }
    }
}
