//! Errors the upstream caller can branch on.
//!
//! Backend misuse (bad package ids, regressing percentages, duplicate
//! finishes) never shows up here: it is logged and discarded at the
//! emission boundary.

use crate::job::JobId;

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("job {0} already has a worker thread")]
    ThreadAlreadyRunning(JobId),

    #[error("job {0}: worker threads can only be created from the dispatch thread")]
    NotDispatchThread(JobId),

    #[error("job {job}: failed to spawn worker thread: {source}")]
    Spawn {
        job: JobId,
        #[source]
        source: std::io::Error,
    },

    #[error("no job with id {0}")]
    UnknownJob(JobId),
}

pub type Result<T> = std::result::Result<T, JobError>;
