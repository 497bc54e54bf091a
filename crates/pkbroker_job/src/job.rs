//! Per-transaction job state.
//!
//! A job is shared between three parties through one `Arc<JobShared>`:
//!
//! - [`Job`], the handle owned by the job list on the dispatch thread
//! - [`BackendJob`](crate::emit::BackendJob), the emission capability given
//!   to the one thread allowed to report events
//! - [`JobView`], the read-only view handed to handlers
//!
//! Lock order is state, then registry. Neither lock is held while a
//! handler runs.

use crate::backend::Backend;
use crate::cancel::CancellationToken;
use crate::config::EngineConfig;
use crate::dispatch::DispatchBridge;
use crate::emit::BackendJob;
use crate::event::{EventKind, JobEvent};
use crate::registry::{CallbackRegistry, Handler};
use pkbroker_protocol::defaults::CACHE_AGE_UNSET;
use pkbroker_protocol::{ErrorKind, Exit, Hint, Role, Status, TransactionFlags, PERCENTAGE_UNKNOWN};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Raw role arguments as supplied by the client.
pub type Parameters = serde_json::Value;

/// Handle of a job inside its [`JobList`](crate::list::JobList).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(u64);

impl JobId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Proxy settings forwarded to the backend.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProxySettings {
    pub http: Option<String>,
    pub https: Option<String>,
    pub ftp: Option<String>,
    pub socks: Option<String>,
    pub no_proxy: Option<String>,
    pub pac: Option<String>,
}

/// Client supplied settings. Survive [`Job::reset`].
#[derive(Debug, Clone)]
pub(crate) struct JobSettings {
    pub(crate) parameters: Parameters,
    pub(crate) transaction_flags: TransactionFlags,
    pub(crate) proxy: ProxySettings,
    pub(crate) locale: Option<String>,
    pub(crate) cache_age: u32,
    pub(crate) uid: Option<u32>,
    pub(crate) cmdline: Option<String>,
    pub(crate) frontend_socket: Option<String>,
    pub(crate) background: Hint,
    pub(crate) interactive: Hint,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            parameters: Parameters::Null,
            transaction_flags: TransactionFlags::empty(),
            proxy: ProxySettings::default(),
            locale: None,
            cache_age: CACHE_AGE_UNSET,
            uid: None,
            cmdline: None,
            frontend_socket: None,
            background: Hint::Unset,
            interactive: Hint::Unset,
        }
    }
}

pub(crate) struct JobState {
    pub(crate) role: Role,
    pub(crate) status: Status,
    pub(crate) percentage: u32,
    pub(crate) speed: u64,
    pub(crate) download_size_remaining: u64,
    pub(crate) allow_cancel: bool,
    pub(crate) locked: bool,
    pub(crate) exit: Exit,
    pub(crate) last_error: ErrorKind,
    pub(crate) set_error: bool,
    pub(crate) finished: bool,
    pub(crate) started: bool,
    pub(crate) has_sent_package: bool,
    pub(crate) set_signature: bool,
    pub(crate) set_eula: bool,
    /// Number of `files` events delivered.
    pub(crate) download_files: u32,
    pub(crate) timer: Instant,
    pub(crate) thread: Option<JoinHandle<()>>,
    /// Worker from before the last reset that had not exited yet.
    pub(crate) detached: Option<JoinHandle<()>>,
    /// Bumped by every reset. Emission handles from an earlier run are stale.
    pub(crate) run: u64,
    pub(crate) backend: Option<Arc<dyn Backend>>,
    /// Last payload accepted per kind, for deduplication.
    pub(crate) last: [Option<JobEvent>; EventKind::COUNT],
    pub(crate) settings: JobSettings,
}

impl JobState {
    fn new(settings: JobSettings, backend: Option<Arc<dyn Backend>>, run: u64) -> Self {
        Self {
            role: Role::Unknown,
            status: Status::Unknown,
            percentage: PERCENTAGE_UNKNOWN,
            speed: 0,
            download_size_remaining: 0,
            allow_cancel: true,
            locked: false,
            exit: Exit::Unknown,
            last_error: ErrorKind::Unknown,
            set_error: false,
            finished: false,
            started: false,
            has_sent_package: false,
            set_signature: false,
            set_eula: false,
            download_files: 0,
            timer: Instant::now(),
            thread: None,
            detached: None,
            run,
            backend,
            last: std::array::from_fn(|_| None),
            settings,
        }
    }

    /// True if `event` equals the last accepted payload of its kind.
    pub(crate) fn is_repeat(&self, event: &JobEvent) -> bool {
        self.last[event.kind().index()].as_ref() == Some(event)
    }

    pub(crate) fn remember(&mut self, event: &JobEvent) {
        self.last[event.kind().index()] = Some(event.clone());
    }

    pub(crate) fn worker_running(&self) -> bool {
        [&self.thread, &self.detached]
            .into_iter()
            .any(|h| h.as_ref().is_some_and(|h| !h.is_finished()))
    }
}

pub(crate) struct JobShared {
    pub(crate) id: JobId,
    pub(crate) tid: String,
    state: Mutex<JobState>,
    registry: Mutex<CallbackRegistry>,
    pub(crate) cancel: CancellationToken,
    pub(crate) bridge: DispatchBridge,
    pub(crate) config: Arc<EngineConfig>,
}

impl JobShared {
    pub(crate) fn lock_state(&self) -> MutexGuard<'_, JobState> {
        // a panicking handler must not wedge the job
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn lock_registry(&self) -> MutexGuard<'_, CallbackRegistry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn vfunc_enabled(&self, kind: EventKind) -> bool {
        self.lock_registry().is_enabled(kind)
    }

    /// Queue `event` for the dispatch thread, or drop it if nobody listens.
    pub(crate) fn post(self: &Arc<Self>, event: JobEvent) {
        let kind = event.kind();
        if !self.vfunc_enabled(kind) {
            return;
        }
        debug!("[Job {}] posting {}", self.id, kind);
        self.bridge.post(crate::dispatch::PostedTask {
            job: Arc::clone(self),
            event,
        });
    }

    pub(crate) fn use_background(&self) -> bool {
        self.config.use_background_priority && self.lock_state().settings.background.is_true()
    }
}

/// Generate a transaction id of the form `/{n}_{8 hex chars}`.
fn generate_tid(id: JobId) -> String {
    let random = uuid::Uuid::new_v4().simple().to_string();
    format!("/{}_{}", id, &random[..8])
}

/// The upstream handle for one transaction.
///
/// Lives on the dispatch thread. Worker threads never see it; they get a
/// [`BackendJob`] instead.
pub struct Job {
    view: JobView,
}

impl Job {
    pub fn new(id: JobId, bridge: DispatchBridge, config: Arc<EngineConfig>) -> Self {
        let shared = JobShared {
            id,
            tid: generate_tid(id),
            state: Mutex::new(JobState::new(JobSettings::default(), None, 0)),
            registry: Mutex::new(CallbackRegistry::new()),
            cancel: CancellationToken::new(),
            bridge,
            config,
        };
        Self {
            view: JobView::from_shared(Arc::new(shared)),
        }
    }

    pub(crate) fn shared(&self) -> &Arc<JobShared> {
        &self.view.shared
    }

    pub fn view(&self) -> &JobView {
        &self.view
    }

    pub fn id(&self) -> JobId {
        self.view.id()
    }

    /// An emission handle for code running on the dispatch thread.
    pub(crate) fn emitter(&self) -> BackendJob {
        let run = self.shared().lock_state().run;
        BackendJob::new(Arc::clone(self.shared()), run)
    }

    /// Bind the role and move the job to WAIT.
    ///
    /// Rebinding a different role is tolerated with a warning.
    pub fn set_role(&self, role: Role) {
        let shared = self.shared();
        {
            let mut state = shared.lock_state();
            if state.role != Role::Unknown && state.role != role {
                warn!(
                    "[Job {}] cannot set role to {}, already {}",
                    shared.id, role, state.role
                );
            }
            state.timer = Instant::now();
            state.role = role;
            state.status = Status::Wait;
        }
        debug!("[Job {}] role set to {}", shared.id, role);
        shared.post(JobEvent::StatusChanged(Status::Wait));
    }

    /// Clear run state and handlers so the job can be queued again.
    ///
    /// Client settings (parameters, flags, proxies, locale, hints) and the
    /// bound backend are kept. A worker that is still running keeps the job
    /// from starting another one until it exits, and nothing it emits from
    /// now on reaches the new run.
    pub fn reset(&self) {
        let shared = self.shared();
        {
            let mut state = shared.lock_state();
            let settings = std::mem::take(&mut state.settings);
            let backend = state.backend.take();
            let outstanding = state
                .thread
                .take()
                .filter(|h| !h.is_finished())
                .or_else(|| state.detached.take().filter(|h| !h.is_finished()));
            if outstanding.is_some() {
                warn!("[Job {}] reset while the worker is still running", shared.id);
            }
            let run = state.run + 1;
            *state = JobState::new(settings, backend, run);
            state.detached = outstanding;
        }
        shared.lock_registry().clear();
        shared.cancel.reset();
        info!("[Job {}] reset", shared.id);
    }

    pub fn set_vfunc<F>(&self, kind: EventKind, handler: F)
    where
        F: Fn(&JobView, &JobEvent) + Send + Sync + 'static,
    {
        self.set_handler(kind, Arc::new(handler));
    }

    pub fn set_handler(&self, kind: EventKind, handler: Handler) {
        self.shared().lock_registry().set(kind, handler);
    }

    pub fn remove_vfunc(&self, kind: EventKind) {
        self.shared().lock_registry().remove(kind);
    }

    pub fn get_vfunc_enabled(&self, kind: EventKind) -> bool {
        self.shared().vfunc_enabled(kind)
    }

    pub fn set_backend(&self, backend: Arc<dyn Backend>) {
        self.shared().lock_state().backend = Some(backend);
    }

    /// Request cooperative cancellation of the worker.
    pub fn cancel(&self) {
        info!("[Job {}] cancellation requested", self.id());
        self.shared().cancel.cancel();
    }

    pub fn cancellable(&self) -> CancellationToken {
        self.shared().cancel.clone()
    }

    pub fn set_started(&self, started: bool) {
        self.shared().lock_state().started = started;
    }

    pub fn set_parameters(&self, parameters: Parameters) {
        self.shared().lock_state().settings.parameters = parameters;
    }

    pub fn set_transaction_flags(&self, flags: TransactionFlags) {
        self.shared().lock_state().settings.transaction_flags = flags;
    }

    pub fn set_proxy(&self, proxy: ProxySettings) {
        self.shared().lock_state().settings.proxy = proxy;
    }

    pub fn set_locale(&self, locale: impl Into<String>) {
        self.shared().lock_state().settings.locale = Some(locale.into());
    }

    pub fn set_cache_age(&self, cache_age: u32) {
        self.shared().lock_state().settings.cache_age = cache_age;
    }

    pub fn set_uid(&self, uid: u32) {
        self.shared().lock_state().settings.uid = Some(uid);
    }

    pub fn set_cmdline(&self, cmdline: impl Into<String>) {
        self.shared().lock_state().settings.cmdline = Some(cmdline.into());
    }

    pub fn set_frontend_socket(&self, socket: impl Into<String>) {
        self.shared().lock_state().settings.frontend_socket = Some(socket.into());
    }

    pub fn set_background(&self, background: Hint) {
        self.shared().lock_state().settings.background = background;
    }

    pub fn set_interactive(&self, interactive: Hint) {
        self.shared().lock_state().settings.interactive = interactive;
    }
}

/// Read-only view of a job, cheap to clone.
#[derive(Clone)]
pub struct JobView {
    shared: Arc<JobShared>,
}

impl JobView {
    pub(crate) fn from_shared(shared: Arc<JobShared>) -> Self {
        Self { shared }
    }

    fn with_state<T>(&self, f: impl FnOnce(&JobState) -> T) -> T {
        f(&self.shared.lock_state())
    }

    pub fn id(&self) -> JobId {
        self.shared.id
    }

    /// Transaction id, `/{n}_{random}`.
    pub fn tid(&self) -> &str {
        &self.shared.tid
    }

    pub fn role(&self) -> Role {
        self.with_state(|s| s.role)
    }

    pub fn status(&self) -> Status {
        self.with_state(|s| s.status)
    }

    pub fn percentage(&self) -> u32 {
        self.with_state(|s| s.percentage)
    }

    pub fn speed(&self) -> u64 {
        self.with_state(|s| s.speed)
    }

    pub fn download_size_remaining(&self) -> u64 {
        self.with_state(|s| s.download_size_remaining)
    }

    pub fn allow_cancel(&self) -> bool {
        self.with_state(|s| s.allow_cancel)
    }

    pub fn locked(&self) -> bool {
        self.with_state(|s| s.locked)
    }

    pub fn exit(&self) -> Exit {
        self.with_state(|s| s.exit)
    }

    /// The error recorded by `error_code`, if any.
    pub fn error(&self) -> Option<ErrorKind> {
        self.with_state(|s| s.set_error.then_some(s.last_error))
    }

    pub fn is_finished(&self) -> bool {
        self.with_state(|s| s.finished)
    }

    pub fn started(&self) -> bool {
        self.with_state(|s| s.started)
    }

    pub fn has_sent_package(&self) -> bool {
        self.with_state(|s| s.has_sent_package)
    }

    pub fn download_files(&self) -> u32 {
        self.with_state(|s| s.download_files)
    }

    /// Milliseconds since the role was last set.
    pub fn runtime(&self) -> u64 {
        self.with_state(|s| s.timer.elapsed().as_millis() as u64)
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.cancel.is_cancelled()
    }

    /// True while a worker thread for this job has not exited.
    pub fn is_worker_running(&self) -> bool {
        self.with_state(JobState::worker_running)
    }

    /// True once a worker thread was created and not cleared by a reset.
    pub fn has_thread(&self) -> bool {
        self.with_state(|s| s.thread.is_some())
    }

    pub fn backend_name(&self) -> Option<String> {
        self.with_state(|s| s.backend.as_ref().map(|b| b.name().to_string()))
    }

    pub fn parameters(&self) -> Parameters {
        self.with_state(|s| s.settings.parameters.clone())
    }

    pub fn transaction_flags(&self) -> TransactionFlags {
        self.with_state(|s| s.settings.transaction_flags)
    }

    pub fn proxy(&self) -> ProxySettings {
        self.with_state(|s| s.settings.proxy.clone())
    }

    pub fn locale(&self) -> Option<String> {
        self.with_state(|s| s.settings.locale.clone())
    }

    /// Maximum acceptable cache age in seconds, `CACHE_AGE_UNSET` if none.
    pub fn cache_age(&self) -> u32 {
        self.with_state(|s| s.settings.cache_age)
    }

    pub fn uid(&self) -> Option<u32> {
        self.with_state(|s| s.settings.uid)
    }

    pub fn cmdline(&self) -> Option<String> {
        self.with_state(|s| s.settings.cmdline.clone())
    }

    pub fn frontend_socket(&self) -> Option<String> {
        self.with_state(|s| s.settings.frontend_socket.clone())
    }

    pub fn background(&self) -> Hint {
        self.with_state(|s| s.settings.background)
    }

    pub fn interactive(&self) -> Hint {
        self.with_state(|s| s.settings.interactive)
    }

    /// Background hint set and allowed by the engine config.
    pub fn use_background(&self) -> bool {
        self.shared.use_background()
    }
}

impl fmt::Debug for JobView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobView")
            .field("id", &self.shared.id)
            .field("tid", &self.shared.tid)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{LogCapture, TestJob};

    #[test]
    fn test_new_job_defaults() {
        let t = TestJob::new();
        let view = t.job.view();
        assert_eq!(view.role(), Role::Unknown);
        assert_eq!(view.status(), Status::Unknown);
        assert_eq!(view.percentage(), PERCENTAGE_UNKNOWN);
        assert!(view.allow_cancel());
        assert_eq!(view.exit(), Exit::Unknown);
        assert_eq!(view.error(), None);
        assert_eq!(view.cache_age(), CACHE_AGE_UNSET);
        assert!(!view.has_thread());
    }

    #[test]
    fn test_tid_format() {
        let t = TestJob::new();
        let tid = t.job.view().tid();
        let (count, random) = tid.trim_start_matches('/').split_once('_').unwrap();
        assert!(tid.starts_with('/'));
        assert_eq!(count, t.job.id().to_string());
        assert_eq!(random.len(), 8);
        assert!(random.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_set_role_emits_wait() {
        let mut t = TestJob::new();
        t.listen(&[EventKind::StatusChanged]);

        t.job.set_role(Role::SearchName);
        t.dispatcher.dispatch_pending();

        assert_eq!(t.job.view().role(), Role::SearchName);
        assert_eq!(t.job.view().status(), Status::Wait);
        assert_eq!(t.events(), vec![JobEvent::StatusChanged(Status::Wait)]);
    }

    #[test]
    fn test_set_role_twice_keeps_latest_role() {
        let t = TestJob::new();
        t.job.set_role(Role::SearchName);
        t.job.set_role(Role::InstallPackages);
        assert_eq!(t.job.view().role(), Role::InstallPackages);
        assert_eq!(t.job.view().status(), Status::Wait);
    }

    #[test]
    fn test_runtime_restarts_on_set_role() {
        let t = TestJob::new();
        std::thread::sleep(std::time::Duration::from_millis(20));
        assert!(t.job.view().runtime() >= 20);
        t.job.set_role(Role::Resolve);
        assert!(t.job.view().runtime() < 20);
    }

    #[test]
    fn test_reset_keeps_settings() {
        let t = TestJob::new();
        t.listen(&[EventKind::Percentage]);
        t.job.set_role(Role::InstallPackages);
        t.job.set_parameters(serde_json::json!({"args": ["bash;5.1;x86_64;main"]}));
        t.job.set_transaction_flags(TransactionFlags::ONLY_TRUSTED);
        t.job.set_locale("de_DE.UTF-8");
        t.job.set_cache_age(3600);
        t.job.set_background(Hint::True);
        t.job.set_proxy(ProxySettings {
            http: Some("http://proxy:3128".to_string()),
            ..ProxySettings::default()
        });
        let emitter = t.job.emitter();
        emitter.set_percentage(30);
        emitter.error_code(ErrorKind::NoNetwork, "offline");
        emitter.finished();
        t.job.cancel();

        t.job.reset();

        let view = t.job.view();
        assert_eq!(view.role(), Role::Unknown);
        assert_eq!(view.status(), Status::Unknown);
        assert_eq!(view.percentage(), PERCENTAGE_UNKNOWN);
        assert_eq!(view.exit(), Exit::Unknown);
        assert_eq!(view.error(), None);
        assert!(!view.is_finished());
        assert!(!view.is_cancelled());
        assert!(!t.job.get_vfunc_enabled(EventKind::Percentage));

        assert_eq!(view.parameters()["args"][0], "bash;5.1;x86_64;main");
        assert_eq!(view.transaction_flags(), TransactionFlags::ONLY_TRUSTED);
        assert_eq!(view.locale().as_deref(), Some("de_DE.UTF-8"));
        assert_eq!(view.cache_age(), 3600);
        assert_eq!(view.background(), Hint::True);
        assert_eq!(view.proxy().http.as_deref(), Some("http://proxy:3128"));
    }

    #[test]
    fn test_emitter_from_before_reset_is_discarded() {
        let mut t = TestJob::new();
        let logs = LogCapture::new();
        let _guard = logs.install();
        let old = t.job.emitter();

        t.job.reset();
        t.listen(&[EventKind::Percentage, EventKind::Finished]);
        old.set_percentage(40);
        old.finished();
        t.job.emitter().set_percentage(10);
        t.dispatcher.dispatch_pending();

        assert_eq!(t.events(), vec![JobEvent::Percentage(10)]);
        assert!(!t.job.view().is_finished());
        assert!(logs.contains("discarding events from the previous run"));
    }

    #[test]
    fn test_use_background_respects_config() {
        let t = TestJob::new();
        assert!(!t.job.view().use_background());
        t.job.set_background(Hint::True);
        assert!(t.job.view().use_background());

        let config = EngineConfig {
            use_background_priority: false,
            ..EngineConfig::default()
        };
        let t = TestJob::with_config(config);
        t.job.set_background(Hint::True);
        assert!(!t.job.view().use_background());
    }
}
