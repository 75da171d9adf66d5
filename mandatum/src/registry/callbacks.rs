use crate::job::{Handle, Job};

use parking_lot::Mutex;
use std::collections::HashMap;

/// Identifier of one in-flight notification.
pub(crate) type CallbackId = u64;

struct CallbackEntry {
    handle: Handle,
    cancelled: bool,
}

/// Answer of [`CallbackRegistry::take`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum CallbackStatus {
    /// Unknown id: the registry was torn down.
    Invalid,

    /// The notification may fire, unless its job was cancelled meanwhile.
    Valid { cancelled: bool },
}

/// Tracks notifications between "queued by a worker" and "dispatched by the
/// issuing loop".
pub(crate) struct CallbackRegistry {
    map: Mutex<CallbackMap>,
}

struct CallbackMap {
    entries: Option<HashMap<CallbackId, CallbackEntry>>,
    last_id: CallbackId,
    shutting_down: bool,
}

impl CallbackRegistry {
    pub(crate) fn new() -> Self {
        Self {
            map: Mutex::new(CallbackMap {
                entries: None,
                last_id: 0,
                shutting_down: false,
            }),
        }
    }

    /// Registers a notification for `job`.
    ///
    /// Returns `None` if the job is already cancelled (the notification must
    /// be dropped) or the registry is shut down.
    pub(crate) fn add(&self, job: &Job) -> Option<CallbackId> {
        let mut map = self.map.lock();

        if map.shutting_down || job.is_cancelled() {
            return None;
        }

        map.last_id += 1;
        let id = map.last_id;

        map.entries.get_or_insert_with(HashMap::new).insert(
            id,
            CallbackEntry {
                handle: job.handle(),
                cancelled: false,
            },
        );

        Some(id)
    }

    /// Removes an entry and reports whether it may still fire.
    pub(crate) fn take(&self, id: CallbackId) -> CallbackStatus {
        let mut map = self.map.lock();

        match map.entries.as_mut().and_then(|entries| entries.remove(&id)) {
            Some(entry) => CallbackStatus::Valid {
                cancelled: entry.cancelled,
            },
            None => CallbackStatus::Invalid,
        }
    }

    /// Marks `job` cancelled and flags every pending notification of
    /// `handle`. Returns how many notifications were flagged.
    ///
    /// The walk happens even without a job: a result may still be queued
    /// after its job already finished.
    pub(crate) fn cancel_job_and_callbacks(&self, handle: Handle, job: Option<&Job>) -> usize {
        let mut map = self.map.lock();

        if let Some(job) = job {
            job.mark_cancelled();
        }

        let Some(entries) = map.entries.as_mut() else {
            return 0;
        };

        let mut marked = 0;
        for entry in entries.values_mut().filter(|e| e.handle == handle) {
            entry.cancelled = true;
            marked += 1;
        }

        marked
    }

    /// Number of notifications still in flight.
    pub(crate) fn len(&self) -> usize {
        self.map.lock().entries.as_ref().map_or(0, HashMap::len)
    }

    /// Drops every entry; later lookups answer [`CallbackStatus::Invalid`].
    pub(crate) fn shutdown(&self) {
        let mut map = self.map.lock();

        map.shutting_down = true;
        map.entries = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::Op;

    fn job(id: u64) -> Job {
        Job::new(Handle::from_raw(id), 0, Op::Close { callback: None })
    }

    #[test]
    fn cancel_marks_only_matching_entries() {
        let registry = CallbackRegistry::new();
        let first = job(1);
        let second = job(2);

        let a = registry.add(&first).unwrap();
        let b = registry.add(&second).unwrap();
        assert_eq!(registry.len(), 2);

        assert_eq!(registry.cancel_job_and_callbacks(first.handle(), Some(&first)), 1);
        assert!(registry.add(&first).is_none());

        assert_eq!(registry.take(a), CallbackStatus::Valid { cancelled: true });
        assert_eq!(registry.take(b), CallbackStatus::Valid { cancelled: false });
        assert_eq!(registry.take(b), CallbackStatus::Invalid);
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn shutdown_invalidates_everything() {
        let registry = CallbackRegistry::new();
        let id = registry.add(&job(1)).unwrap();

        registry.shutdown();
        assert_eq!(registry.len(), 0);

        assert_eq!(registry.take(id), CallbackStatus::Invalid);
        assert!(registry.add(&job(2)).is_none());
    }
}
