use crate::cancel::CancellationToken;
use crate::error::{VfsError, VfsResult};

use parking_lot::{Condvar, Mutex};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Backend entry points [`MemoryBackend`](super::MemoryBackend) can pause,
/// break or record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BackendCall {
    Open,
    Create,
    CreateSymbolicLink,
    GetFileInfo,
    SetFileInfo,
    OpenDirectory,
    ReadDirectory,
    FindDirectory,
    Xfer,
    Read,
    Write,
    Seek,
    FileControl,
    Close,
}

/// One finished backend call.
///
/// `start` and `end` come from a single counter shared by every call, so
/// two records overlap in time exactly when their ranges intersect.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallRecord {
    pub call: BackendCall,
    pub path: String,
    pub thread: Option<String>,
    pub start: u64,
    pub end: u64,
}

impl CallRecord {
    pub fn overlaps(&self, other: &CallRecord) -> bool {
        self.start < other.end && other.start < self.end
    }
}

#[derive(Default)]
struct Gates {
    paused: HashSet<BackendCall>,

    /// Calls currently parked behind a paused gate.
    waiting: HashMap<BackendCall, usize>,
}

/// Instrumentation shared by the backend and its open handles.
#[derive(Default)]
pub(crate) struct Probe {
    sequence: AtomicU64,
    records: Mutex<Vec<CallRecord>>,
    gates: Mutex<Gates>,
    gate_changed: Condvar,
    latency: Mutex<Duration>,
    panics: Mutex<HashSet<BackendCall>>,
}

/// Open call; records itself when dropped.
pub(crate) struct CallScope<'a> {
    probe: &'a Probe,
    call: BackendCall,
    path: String,
    start: u64,
}

impl Drop for CallScope<'_> {
    fn drop(&mut self) {
        let end = self.probe.sequence.fetch_add(1, Ordering::SeqCst);

        self.probe.records.lock().push(CallRecord {
            call: self.call,
            path: std::mem::take(&mut self.path),
            thread: thread::current().name().map(str::to_string),
            start: self.start,
            end,
        });
    }
}

impl Probe {
    /// Marks the start of a backend call.
    ///
    /// Waits while `call` is paused, giving up with
    /// [`VfsError::Cancelled`] if the token trips meanwhile.
    ///
    /// # Panics
    ///
    /// Panics if a panic was requested for `call`.
    pub(crate) fn enter(
        &self,
        call: BackendCall,
        path: &str,
        token: &CancellationToken,
    ) -> VfsResult<CallScope<'_>> {
        let inject = self.panics.lock().remove(&call);
        if inject {
            panic!("injected panic in {call:?} of {path}");
        }

        let start = self.sequence.fetch_add(1, Ordering::SeqCst);

        self.wait_gate(call, token)?;

        let latency = *self.latency.lock();
        if !latency.is_zero() {
            thread::sleep(latency);
        }

        Ok(CallScope {
            probe: self,
            call,
            path: path.to_string(),
            start,
        })
    }

    fn wait_gate(&self, call: BackendCall, token: &CancellationToken) -> VfsResult<()> {
        let mut gates = self.gates.lock();

        if !gates.paused.contains(&call) {
            return Ok(());
        }

        *gates.waiting.entry(call).or_insert(0) += 1;
        self.gate_changed.notify_all();

        let result = loop {
            if !gates.paused.contains(&call) {
                break Ok(());
            }

            if token.is_cancelled() {
                break Err(VfsError::Cancelled);
            }

            self.gate_changed
                .wait_for(&mut gates, Duration::from_millis(1));
        };

        if let Some(count) = gates.waiting.get_mut(&call) {
            *count -= 1;
        }
        self.gate_changed.notify_all();

        result
    }

    pub(crate) fn pause(&self, call: BackendCall) {
        self.gates.lock().paused.insert(call);
    }

    pub(crate) fn resume(&self, call: BackendCall) {
        self.gates.lock().paused.remove(&call);
        self.gate_changed.notify_all();
    }

    /// Waits until at least one `call` is parked behind its gate.
    pub(crate) fn wait_until_blocked(&self, call: BackendCall, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut gates = self.gates.lock();

        loop {
            if gates.waiting.get(&call).is_some_and(|n| *n > 0) {
                return true;
            }

            if self.gate_changed.wait_until(&mut gates, deadline).timed_out() {
                return gates.waiting.get(&call).is_some_and(|n| *n > 0);
            }
        }
    }

    pub(crate) fn blocked(&self, call: BackendCall) -> usize {
        self.gates.lock().waiting.get(&call).copied().unwrap_or(0)
    }

    pub(crate) fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    pub(crate) fn panic_on(&self, call: BackendCall) {
        self.panics.lock().insert(call);
    }

    pub(crate) fn records(&self) -> Vec<CallRecord> {
        self.records.lock().clone()
    }
}
