use crate::error::{VfsError, VfsResult};
use crate::job::{Handle, Job};

use log::debug;
use parking_lot::{Mutex, MutexGuard};
use std::collections::HashMap;
use std::sync::Arc;

/// Owner of the handle → job mapping.
pub(crate) struct HandleRegistry {
    map: Mutex<JobMap>,
}

/// The registry contents. Only reachable through [`HandleRegistry::lock`].
pub(crate) struct JobMap {
    /// `None` before the first job and after teardown.
    jobs: Option<HashMap<Handle, Arc<Job>>>,

    /// Last handle value handed out.
    last_id: u64,

    shutting_down: bool,
}

impl HandleRegistry {
    pub(crate) fn new() -> Self {
        Self {
            map: Mutex::new(JobMap {
                jobs: None,
                last_id: 0,
                shutting_down: false,
            }),
        }
    }

    /// Acquires the registry lock.
    pub(crate) fn lock(&self) -> MutexGuard<'_, JobMap> {
        self.map.lock()
    }
}

impl JobMap {
    /// Registers a new job under the next handle.
    ///
    /// # Errors
    ///
    /// Returns [`VfsError::Rejected`] once shutdown has begun.
    pub(crate) fn create(&mut self, build: impl FnOnce(Handle) -> Job) -> VfsResult<Arc<Job>> {
        if self.shutting_down {
            return Err(VfsError::Rejected);
        }

        self.last_id += 1;
        let handle = Handle::from_raw(self.last_id);
        let job = Arc::new(build(handle));

        self.jobs
            .get_or_insert_with(HashMap::new)
            .insert(handle, job.clone());

        Ok(job)
    }

    pub(crate) fn lookup(&self, handle: Handle) -> Option<Arc<Job>> {
        self.jobs.as_ref()?.get(&handle).cloned()
    }

    /// Unregisters a job.
    ///
    /// During shutdown the removal that empties the map also releases it.
    pub(crate) fn remove(&mut self, handle: Handle) -> Option<Arc<Job>> {
        let job = self.jobs.as_mut()?.remove(&handle);

        if self.shutting_down && self.is_empty() && self.jobs.take().is_some() {
            debug!("handle registry released by job {handle}");
        }

        job
    }

    /// Refuses new jobs from now on.
    pub(crate) fn begin_shutdown(&mut self) {
        self.shutting_down = true;

        if self.is_empty() {
            self.jobs = None;
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.jobs.as_ref().is_none_or(HashMap::is_empty)
    }

    pub(crate) fn len(&self) -> usize {
        self.jobs.as_ref().map_or(0, HashMap::len)
    }

    /// Removes every remaining job and releases the map.
    pub(crate) fn drain(&mut self) -> Vec<Arc<Job>> {
        self.jobs
            .take()
            .map(|jobs| jobs.into_values().collect())
            .unwrap_or_default()
    }
}
