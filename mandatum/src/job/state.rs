/// Lifecycle of a [`Job`](super::Job).
///
/// ```text
/// Created -> Scheduled -> Running -> Terminal
///                ^            |
///                +-- Continuable
/// ```
///
/// The `cancelled` flag lives next to the state and can be raised in any
/// state but `Terminal`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum JobState {
    /// Registered but not yet handed to the pool.
    Created,

    /// Waiting in the pending queue.
    Scheduled,

    /// A worker owns the job and is executing its operation.
    ///
    /// At most one worker may observe this state at a time.
    Running,

    /// The operation finished; the job keeps its resource and waits for a
    /// continuation (read, write, seek, close, file control).
    Continuable,

    /// The job is done and is being removed from the registry.
    Terminal,
}

impl JobState {
    /// A job is busy while it is queued or executing.
    pub(crate) fn is_busy(self) -> bool {
        matches!(self, JobState::Scheduled | JobState::Running)
    }
}
