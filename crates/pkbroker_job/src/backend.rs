//! The seam between the engine and a package-manager backend.

use crate::emit::BackendJob;
use crate::job::Parameters;
use pkbroker_protocol::Role;
use std::sync::Arc;

/// A role implementation. Receives the emission handle and the raw role
/// parameters; reports everything through the handle.
pub type EntryPoint = Arc<dyn Fn(&BackendJob, &Parameters) + Send + Sync>;

/// A package-manager backend.
///
/// Entry points must not create worker threads for the job they were given;
/// the engine already runs them on one.
pub trait Backend: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    /// Roles this backend implements.
    fn roles(&self) -> Vec<Role>;

    /// The implementation for `role`, or `None` if unsupported.
    fn entry_point(&self, role: Role) -> Option<EntryPoint>;

    /// Whether `role` needs its own worker thread. Roles that answer from
    /// memory can run in place on the dispatch thread.
    fn runs_in_thread(&self, _role: Role) -> bool {
        true
    }

    /// Called on the worker thread before the entry point.
    fn job_start(&self, _job: &BackendJob) {}

    /// Called on the worker thread after the job finished.
    fn job_stop(&self, _job: &BackendJob) {}
}
