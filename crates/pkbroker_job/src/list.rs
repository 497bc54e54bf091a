//! Owner of every job in flight.

use crate::backend::Backend;
use crate::config::EngineConfig;
use crate::dispatch::DispatchBridge;
use crate::error::{JobError, Result};
use crate::job::{Job, JobId};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Arena of jobs keyed by [`JobId`]. Lives on the dispatch thread.
pub struct JobList {
    jobs: HashMap<JobId, Job>,
    next_id: u64,
    bridge: DispatchBridge,
    config: Arc<EngineConfig>,
}

impl JobList {
    pub fn new(bridge: DispatchBridge, config: Arc<EngineConfig>) -> Self {
        Self {
            jobs: HashMap::new(),
            next_id: 1,
            bridge,
            config,
        }
    }

    pub fn create(&mut self) -> JobId {
        let id = JobId::new(self.next_id);
        self.next_id += 1;
        let job = Job::new(id, self.bridge.clone(), Arc::clone(&self.config));
        debug!("[Job {}] created as {}", id, job.view().tid());
        self.jobs.insert(id, job);
        id
    }

    pub fn get(&self, id: JobId) -> Option<&Job> {
        self.jobs.get(&id)
    }

    /// Drop the list's handle. A worker still running keeps the job state
    /// alive until it exits.
    pub fn remove(&mut self, id: JobId) -> Option<Job> {
        self.jobs.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn ids(&self) -> Vec<JobId> {
        let mut ids: Vec<JobId> = self.jobs.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Start the job's role on `backend`.
    ///
    /// Picks the backend entry point for the role and runs it on a worker
    /// thread, or in place if the backend says the role needs no thread. A
    /// backend without an entry point fails the job with `not-supported`.
    pub fn run(&self, id: JobId, backend: Arc<dyn Backend>) -> Result<()> {
        let job = self.get(id).ok_or(JobError::UnknownJob(id))?;
        let role = job.view().role();
        job.set_backend(Arc::clone(&backend));
        job.set_started(true);

        match backend.entry_point(role) {
            None => {
                warn!("[Job {}] backend {} does not implement {}", id, backend.name(), role);
                job.run_sync(|job, _| job.not_implemented_yet(role.as_str()))
            }
            Some(entry) if backend.runs_in_thread(role) => {
                job.thread_create(move |job, params| entry(job, params))
            }
            Some(entry) => job.run_sync(|job, params| entry(job, params)),
        }
    }

    /// Remove jobs that finished and whose worker has exited. Returns how
    /// many were removed.
    pub fn reap_finished(&mut self) -> usize {
        let before = self.jobs.len();
        self.jobs.retain(|id, job| {
            let view = job.view();
            if view.is_finished() && !view.is_worker_running() {
                debug!("[Job {}] reaped after {} ms", id, view.runtime());
                false
            } else {
                true
            }
        });
        let reaped = before - self.jobs.len();
        if reaped > 0 {
            info!("Reaped {} finished jobs, {} remaining", reaped, self.jobs.len());
        }
        reaped
    }
}
