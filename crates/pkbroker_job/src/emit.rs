//! Emission entry points.
//!
//! Every call follows the same template: refuse once an error has been
//! recorded (finishing is always allowed), validate, drop exact repeats,
//! apply side effects, record, then post through the dispatch bridge.
//! Misuse is logged and discarded; nothing here returns an error.
//!
//! Payload-only kinds (details, item progress and the like) check their
//! handler slot first and return before validating anything when nobody
//! listens.

use crate::cancel::CancellationToken;
use crate::event::{EventKind, JobEvent};
use crate::job::{JobId, JobShared, JobState, JobView};
use pkbroker_protocol::{
    Category, Details, DistroUpgrade, DistroUpgradeKind, ErrorCode, ErrorKind, EulaRequired,
    Exit, Files, Info, ItemProgress, MediaChangeRequired, MediaType, Package, PackageId,
    RepoDetail, RepoSignatureRequired, RequireRestart, Restart, Role, Status, UpdateDetail,
    PERCENTAGE_UNKNOWN,
};
use std::cell::Cell;
use std::sync::{Arc, MutexGuard};
use tracing::{debug, info, warn};

/// The capability to report events for one job.
///
/// Handed to exactly one thread at a time: it is `Send` but neither `Sync`
/// nor `Clone`, so two threads can never emit for the same job at once.
/// A handle is bound to the run it was created for; once the job is reset
/// its calls are discarded.
pub struct BackendJob {
    shared: Arc<JobShared>,
    run: u64,
    stale_reported: Cell<bool>,
}

impl BackendJob {
    pub(crate) fn new(shared: Arc<JobShared>, run: u64) -> Self {
        Self {
            shared,
            run,
            stale_reported: Cell::new(false),
        }
    }

    /// Lock the job state, or `None` if the job was reset since this
    /// handle was created.
    fn lock_current(&self) -> Option<MutexGuard<'_, JobState>> {
        let state = self.shared.lock_state();
        if state.run == self.run {
            return Some(state);
        }
        if !self.stale_reported.replace(true) {
            warn!(
                "[Job {}] job was reset, discarding events from the previous run",
                self.shared.id
            );
        }
        None
    }

    pub fn id(&self) -> JobId {
        self.shared.id
    }

    /// Read access to the job's settings and state.
    pub fn view(&self) -> JobView {
        JobView::from_shared(Arc::clone(&self.shared))
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.cancel.is_cancelled()
    }

    pub fn cancellable(&self) -> CancellationToken {
        self.shared.cancel.clone()
    }

    fn rejected_after_error(&self, state: &JobState, kind: EventKind) -> bool {
        if state.set_error {
            warn!("[Job {}] already set error, cannot process {}", self.shared.id, kind);
            return true;
        }
        false
    }

    fn rejected_invalid(&self, event: &JobEvent) -> bool {
        match validate(event) {
            Ok(()) => false,
            Err(reason) => {
                warn!("[Job {}] {} rejected: {}", self.shared.id, event.kind(), reason);
                true
            }
        }
    }

    /// Template for kinds that carry no job state.
    fn emit_payload(&self, event: JobEvent) {
        let kind = event.kind();
        if !self.shared.vfunc_enabled(kind) {
            return;
        }
        {
            let Some(mut state) = self.lock_current() else {
                return;
            };
            if self.rejected_after_error(&state, kind) || self.rejected_invalid(&event) {
                return;
            }
            if state.is_repeat(&event) {
                debug!("[Job {}] skipping repeated {}", self.shared.id, kind);
                return;
            }
            state.remember(&event);
        }
        self.shared.post(event);
    }

    pub fn set_status(&self, status: Status) {
        let id = self.shared.id;
        let emit_running = {
            let Some(mut state) = self.lock_current() else {
                return;
            };
            if state.status == status {
                return;
            }
            if state.set_error && status != Status::Finished {
                warn!("[Job {}] already set error, cannot set status {}", id, status);
                return;
            }
            if status == Status::Wait {
                warn!("[Job {}] backends cannot set status {}", id, status);
                return;
            }
            if state.status == Status::Finished {
                warn!("[Job {}] already finished, cannot set status {}", id, status);
                return;
            }
            if status == Status::Setup && state.status != Status::Wait {
                warn!("[Job {}] cannot enter {} from {}", id, status, state.status);
                return;
            }
            let emit_running = state.status == Status::Setup
                && !matches!(status, Status::Running | Status::Setup);
            state.status = status;
            emit_running
        };

        if emit_running {
            self.shared.post(JobEvent::StatusChanged(Status::Running));
        }
        self.shared.post(JobEvent::StatusChanged(status));
    }

    /// Overall progress, 0 to 100 or [`PERCENTAGE_UNKNOWN`].
    pub fn set_percentage(&self, percentage: u32) {
        let id = self.shared.id;
        {
            let Some(mut state) = self.lock_current() else {
                return;
            };
            if self.rejected_after_error(&state, EventKind::Percentage) {
                return;
            }
            if state.percentage == percentage {
                return;
            }
            if percentage > PERCENTAGE_UNKNOWN {
                warn!("[Job {}] percentage value {} is invalid", id, percentage);
                return;
            }
            if state.percentage < 100 && percentage < state.percentage {
                warn!(
                    "[Job {}] percentage value is going down to {} from {}",
                    id, percentage, state.percentage
                );
                return;
            }
            state.percentage = percentage;
        }
        self.shared.post(JobEvent::Percentage(percentage));
    }

    /// Transfer speed in bytes per second.
    pub fn set_speed(&self, speed: u64) {
        {
            let Some(mut state) = self.lock_current() else {
                return;
            };
            if self.rejected_after_error(&state, EventKind::Speed) || state.speed == speed {
                return;
            }
            state.speed = speed;
        }
        self.shared.post(JobEvent::Speed(speed));
    }

    pub fn set_download_size_remaining(&self, bytes: u64) {
        {
            let Some(mut state) = self.lock_current() else {
                return;
            };
            if self.rejected_after_error(&state, EventKind::DownloadSizeRemaining)
                || state.download_size_remaining == bytes
            {
                return;
            }
            state.download_size_remaining = bytes;
        }
        self.shared.post(JobEvent::DownloadSizeRemaining(bytes));
    }

    /// Progress of one package; `percentage` is 0 to 100 or
    /// [`PERCENTAGE_UNKNOWN`].
    pub fn item_progress(&self, package_id: &str, status: Status, percentage: u32) {
        self.emit_payload(JobEvent::ItemProgress(ItemProgress {
            package_id: package_id.to_string(),
            status,
            percentage,
        }));
    }

    /// Report a package. Transitional infos (installing, removing, ...)
    /// move the job status to the matching phase first.
    pub fn package(&self, info: Info, package_id: &str, summary: &str) {
        let event = JobEvent::Package(Package {
            info,
            package_id: package_id.to_string(),
            summary: summary.to_string(),
        });
        {
            let Some(state) = self.lock_current() else {
                return;
            };
            if self.rejected_after_error(&state, EventKind::Package) || self.rejected_invalid(&event) {
                return;
            }
            if state.is_repeat(&event) {
                debug!("[Job {}] skipping repeated package {}", self.shared.id, package_id);
                return;
            }
        }

        if let Some(status) = info.implied_status() {
            self.set_status(status);
        }

        {
            let Some(mut state) = self.lock_current() else {
                return;
            };
            state.has_sent_package = true;
            state.remember(&event);
        }
        self.shared.post(event);
    }

    pub fn details(&self, details: Details) {
        self.emit_payload(JobEvent::Details(details));
    }

    /// File list for a package, or for the whole transaction when
    /// `package_id` is `None`.
    pub fn files(&self, package_id: Option<&str>, files: Vec<String>) {
        let event = JobEvent::Files(Files {
            package_id: package_id.map(str::to_string),
            files,
        });
        {
            let Some(mut state) = self.lock_current() else {
                return;
            };
            if self.rejected_after_error(&state, EventKind::Files) || self.rejected_invalid(&event) {
                return;
            }
            if state.is_repeat(&event) {
                return;
            }
            state.download_files += 1;
            state.remember(&event);
        }
        self.shared.post(event);
    }

    pub fn update_detail(&self, detail: UpdateDetail) {
        self.emit_payload(JobEvent::UpdateDetail(detail));
    }

    pub fn require_restart(&self, restart: Restart, package_id: &str) {
        self.emit_payload(JobEvent::RequireRestart(RequireRestart {
            restart,
            package_id: package_id.to_string(),
        }));
    }

    pub fn distro_upgrade(&self, state: DistroUpgradeKind, name: &str, summary: &str) {
        self.emit_payload(JobEvent::DistroUpgrade(DistroUpgrade {
            state,
            name: name.to_string(),
            summary: summary.to_string(),
        }));
    }

    /// Ask the client to trust a repository key. At most once per job.
    pub fn repo_signature_required(&self, request: RepoSignatureRequired) {
        let event = JobEvent::RepoSignatureRequired(request);
        {
            let Some(mut state) = self.lock_current() else {
                return;
            };
            if self.rejected_after_error(&state, EventKind::RepoSignatureRequired) {
                return;
            }
            if state.set_signature {
                warn!("[Job {}] already asked for a signature, cannot process", self.shared.id);
                return;
            }
            if self.rejected_invalid(&event) {
                return;
            }
            state.set_signature = true;
            state.remember(&event);
        }
        self.shared.post(event);
    }

    /// Ask the client to accept a license agreement. At most once per job.
    pub fn eula_required(&self, request: EulaRequired) {
        let event = JobEvent::EulaRequired(request);
        {
            let Some(mut state) = self.lock_current() else {
                return;
            };
            if self.rejected_after_error(&state, EventKind::EulaRequired) {
                return;
            }
            if state.set_eula {
                warn!("[Job {}] already asked for an eula, cannot process", self.shared.id);
                return;
            }
            if self.rejected_invalid(&event) {
                return;
            }
            state.set_eula = true;
            state.remember(&event);
        }
        self.shared.post(event);
    }

    pub fn media_change_required(&self, media_type: MediaType, media_id: &str, media_text: &str) {
        self.emit_payload(JobEvent::MediaChangeRequired(MediaChangeRequired {
            media_type,
            media_id: media_id.to_string(),
            media_text: media_text.to_string(),
        }));
    }

    pub fn repo_detail(&self, repo_id: &str, description: &str, enabled: bool) {
        self.emit_payload(JobEvent::RepoDetail(RepoDetail {
            repo_id: repo_id.to_string(),
            description: description.to_string(),
            enabled,
        }));
    }

    pub fn category(&self, category: Category) {
        self.emit_payload(JobEvent::Category(category));
    }

    /// Record a domain error and classify the exit.
    ///
    /// Only one error is accepted per job, except that an error following
    /// `LockRequired` replaces it and reopens a job that already finished.
    pub fn error_code(&self, code: ErrorKind, details: impl Into<String>) {
        let details = details.into();
        let id = self.shared.id;
        let exit = {
            let Some(mut state) = self.lock_current() else {
                return;
            };
            if state.set_error {
                if state.last_error != ErrorKind::LockRequired {
                    warn!(
                        "[Job {}] more than one error emitted, ignoring {}: {}",
                        id, code, details
                    );
                    return;
                }
                debug!("[Job {}] {} supersedes {}", id, code, state.last_error);
                state.exit = Exit::Unknown;
                state.finished = false;
            }
            state.set_error = true;
            state.last_error = code;

            // an exit chosen through set_exit_code stays
            if state.exit == Exit::Unknown {
                state.exit = self
                    .shared
                    .config
                    .exit_policy
                    .classify(code)
                    .unwrap_or(Exit::Failed);
            }
            state.exit
        };

        info!("[Job {}] error {} ({}): {}", id, code, exit, details);
        self.shared.post(JobEvent::ErrorCode(ErrorCode { code, details }));
    }

    pub fn set_allow_cancel(&self, allow_cancel: bool) {
        {
            let Some(mut state) = self.lock_current() else {
                return;
            };
            if state.set_error && !allow_cancel {
                warn!("[Job {}] already set error, cannot process allow-cancel", self.shared.id);
                return;
            }
            if state.allow_cancel == allow_cancel {
                return;
            }
            state.allow_cancel = allow_cancel;
        }
        self.shared.post(JobEvent::AllowCancel(allow_cancel));
    }

    /// The backend holds (or released) the package database lock.
    pub fn set_locked(&self, locked: bool) {
        {
            let Some(mut state) = self.lock_current() else {
                return;
            };
            if state.locked == locked {
                return;
            }
            state.locked = locked;
        }
        self.shared.post(JobEvent::LockedChanged(locked));
    }

    /// Choose the exit explicitly. Only the first choice sticks.
    pub fn set_exit_code(&self, exit: Exit) {
        let Some(mut state) = self.lock_current() else {
            return;
        };
        if state.exit != Exit::Unknown {
            warn!(
                "[Job {}] already set exit status: old={}, new={}",
                self.shared.id, state.exit, exit
            );
            return;
        }
        state.exit = exit;
    }

    /// Fail the job with `NotSupported` and finish it.
    pub fn not_implemented_yet(&self, method: &str) {
        self.error_code(
            ErrorKind::NotSupported,
            format!("the method '{}' is not implemented yet", method),
        );
        self.finished();
    }

    /// Finish the job. Safe to call more than once; only the first call
    /// does anything.
    pub fn finished(&self) {
        let id = self.shared.id;
        {
            let Some(mut state) = self.lock_current() else {
                return;
            };
            if state.finished {
                warn!("[Job {}] already finished", id);
                return;
            }
            if state.role == Role::DownloadPackages && state.download_files == 0 && !state.set_error {
                warn!("[Job {}] {} finished without any files event", id, state.role);
            }
            if !state.set_error && state.status == Status::Setup {
                warn!("[Job {}] finished without reporting a status beyond {}", id, state.status);
            }
            state.finished = true;
        }

        self.set_allow_cancel(true);
        self.set_status(Status::Finished);

        let (exit, runtime) = {
            let Some(mut state) = self.lock_current() else {
                return;
            };
            if state.exit == Exit::Unknown {
                state.exit = Exit::Success;
            }
            (state.exit, state.timer.elapsed().as_millis())
        };
        info!("[Job {}] finished with exit {} after {} ms", id, exit, runtime);
        self.shared.post(JobEvent::Finished(exit));
    }
}

fn package_id_of(event: &JobEvent) -> Option<&str> {
    match event {
        JobEvent::Package(p) => Some(&p.package_id),
        JobEvent::ItemProgress(p) => Some(&p.package_id),
        JobEvent::Details(d) => Some(&d.package_id),
        JobEvent::Files(f) => f.package_id.as_deref(),
        JobEvent::UpdateDetail(u) => Some(&u.package_id),
        JobEvent::RequireRestart(r) => Some(&r.package_id),
        JobEvent::RepoSignatureRequired(r) => Some(&r.package_id),
        JobEvent::EulaRequired(e) => Some(&e.package_id),
        _ => None,
    }
}

fn validate(event: &JobEvent) -> Result<(), String> {
    if let Some(package_id) = package_id_of(event) {
        PackageId::parse(package_id).map_err(|e| e.to_string())?;
    }
    if let JobEvent::ItemProgress(progress) = event {
        if progress.percentage > 100 && progress.percentage != PERCENTAGE_UNKNOWN {
            return Err(format!("invalid item percentage {}", progress.percentage));
        }
    }
    Ok(())
}
