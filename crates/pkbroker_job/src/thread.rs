//! Worker thread launcher.
//!
//! One named OS thread per job, never joined by the caller. The thread runs
//! the backend start hook, the entry point, `finished()` (whether or not the
//! entry point already did), the stop hook, and finally drops its priority
//! if the job runs in the background.

use crate::emit::BackendJob;
use crate::error::{JobError, Result};
use crate::job::{Job, JobId, JobShared, Parameters};
use pkbroker_protocol::ErrorKind;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

impl Job {
    /// Run `func` on a dedicated worker thread.
    ///
    /// Fails if this job already had a worker since the last
    /// [`reset`](Job::reset), while a worker from before the reset is still
    /// running, or when called off the dispatch thread.
    pub fn thread_create<F>(&self, func: F) -> Result<()>
    where
        F: FnOnce(&BackendJob, &Parameters) + Send + 'static,
    {
        let shared = self.shared();
        let id = shared.id;
        if !shared.bridge.is_dispatch_thread() {
            warn!("[Job {}] thread_create called off the dispatch thread", id);
            return Err(JobError::NotDispatchThread(id));
        }

        let mut state = shared.lock_state();
        if state.thread.is_some() {
            warn!("[Job {}] already has a worker thread", id);
            return Err(JobError::ThreadAlreadyRunning(id));
        }
        if state.worker_running() {
            warn!("[Job {}] worker from before the reset is still running", id);
            return Err(JobError::ThreadAlreadyRunning(id));
        }
        state.detached = None;

        let worker = Arc::clone(shared);
        let run = state.run;
        let handle = std::thread::Builder::new()
            .name(format!("pk-job-{}", id))
            .spawn(move || run_worker(worker, run, func))
            .map_err(|source| {
                error!("[Job {}] failed to spawn worker: {}", id, source);
                JobError::Spawn { job: id, source }
            })?;
        state.thread = Some(handle);
        info!("[Job {}] worker thread started for {}", id, state.role);
        Ok(())
    }

    /// Run `func` in place on the dispatch thread.
    ///
    /// For roles that do no blocking work. Unlike
    /// [`thread_create`](Job::thread_create) nothing is called after
    /// `func`; it has to finish the job itself. Refused while a worker
    /// thread of this job is still running.
    pub fn run_sync<F>(&self, func: F) -> Result<()>
    where
        F: FnOnce(&BackendJob, &Parameters),
    {
        let shared = self.shared();
        if !shared.bridge.is_dispatch_thread() {
            warn!("[Job {}] run_sync called off the dispatch thread", shared.id);
            return Err(JobError::NotDispatchThread(shared.id));
        }
        if shared.lock_state().worker_running() {
            warn!("[Job {}] run_sync refused, a worker thread is still running", shared.id);
            return Err(JobError::ThreadAlreadyRunning(shared.id));
        }
        let parameters = self.view().parameters();
        let job = self.emitter();
        debug!("[Job {}] running {} in place", shared.id, self.view().role());
        func(&job, &parameters);
        Ok(())
    }
}

fn run_worker<F>(shared: Arc<JobShared>, run: u64, func: F)
where
    F: FnOnce(&BackendJob, &Parameters),
{
    let id = shared.id;
    let (backend, parameters) = {
        let state = shared.lock_state();
        (state.backend.clone(), state.settings.parameters.clone())
    };
    let job = BackendJob::new(Arc::clone(&shared), run);

    if let Some(backend) = &backend {
        backend.job_start(&job);
    }

    // func is consumed by the call, its captures drop when it returns
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| func(&job, &parameters)));
    if let Err(payload) = outcome {
        let reason = panic_message(payload.as_ref());
        error!("[Job {}] backend worker panicked: {}", id, reason);
        job.error_code(
            ErrorKind::InternalError,
            format!("backend worker panicked: {}", reason),
        );
    }

    job.finished();

    if let Some(backend) = &backend {
        backend.job_stop(&job);
    }

    if shared.use_background() {
        lower_priority(id, shared.config.background_nice);
    }
    debug!("[Job {}] worker thread exiting", id);
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(target_os = "linux")]
fn lower_priority(id: JobId, nice: i32) {
    // SAFETY: plain syscall on integer arguments. On Linux `who == 0` with
    // PRIO_PROCESS addresses the calling thread only.
    let rc = unsafe { libc::setpriority(libc::PRIO_PROCESS, 0, nice) };
    if rc == 0 {
        debug!("[Job {}] worker priority lowered to nice {}", id, nice);
    } else {
        warn!(
            "[Job {}] failed to lower worker priority: {}",
            id,
            std::io::Error::last_os_error()
        );
    }
}

#[cfg(not(target_os = "linux"))]
fn lower_priority(id: JobId, _nice: i32) {
    debug!("[Job {}] per-thread priority not supported on this platform", id);
}
