//! An in-memory backend for demos and tests.
//!
//! Role parameters are read from `{"args": [...]}`: search terms, package
//! names or package ids depending on the role. Download jobs also honour
//! `{"directory": "..."}`.

use crate::backend::{Backend, EntryPoint};
use crate::emit::BackendJob;
use crate::job::Parameters;
use pkbroker_protocol::{
    Details, ErrorKind, Exit, Group, Info, PackageId, Restart, Role, Status, UpdateDetail,
    UpdateState,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

const DEFAULT_DOWNLOAD_DIR: &str = "/var/cache/pkbroker/downloads";
const DEFAULT_STEP_DELAY: Duration = Duration::from_millis(50);
const INSTALL_STEPS: u32 = 4;

struct CatalogEntry {
    id: &'static str,
    info: Info,
    summary: &'static str,
    group: Group,
    license: &'static str,
    url: &'static str,
    size: u64,
    files: &'static [&'static str],
}

const CATALOG: &[CatalogEntry] = &[
    CatalogEntry {
        id: "bash;5.1.16;x86_64;installed",
        info: Info::Installed,
        summary: "The GNU Bourne Again shell",
        group: Group::System,
        license: "GPL-3.0-or-later",
        url: "https://www.gnu.org/software/bash",
        size: 7_738_000,
        files: &["/usr/bin/bash", "/usr/bin/sh", "/etc/skel/.bashrc"],
    },
    CatalogEntry {
        id: "glibc;2.38;x86_64;installed",
        info: Info::Installed,
        summary: "The GNU libc libraries",
        group: Group::System,
        license: "LGPL-2.1-or-later",
        url: "https://www.gnu.org/software/libc",
        size: 6_280_000,
        files: &["/usr/lib64/libc.so.6", "/usr/lib64/ld-linux-x86-64.so.2"],
    },
    CatalogEntry {
        id: "kernel;6.8.1;x86_64;installed",
        info: Info::Installed,
        summary: "The Linux kernel",
        group: Group::System,
        license: "GPL-2.0-only",
        url: "https://www.kernel.org",
        size: 64_000_000,
        files: &["/boot/vmlinuz-6.8.1"],
    },
    CatalogEntry {
        id: "powertop;2.15;x86_64;main",
        info: Info::Available,
        summary: "Power consumption monitor",
        group: Group::AdminTools,
        license: "GPL-2.0-only",
        url: "https://github.com/fenrus75/powertop",
        size: 612_000,
        files: &["/usr/sbin/powertop"],
    },
    CatalogEntry {
        id: "htop;3.3.0;x86_64;main",
        info: Info::Available,
        summary: "Interactive process viewer",
        group: Group::AdminTools,
        license: "GPL-2.0-only",
        url: "https://htop.dev",
        size: 420_000,
        files: &["/usr/bin/htop"],
    },
    CatalogEntry {
        id: "vim-enhanced;9.1;x86_64;main",
        info: Info::Available,
        summary: "A version of the VIM editor which includes recent enhancements",
        group: Group::Programming,
        license: "Vim",
        url: "https://www.vim.org",
        size: 4_100_000,
        files: &["/usr/bin/vim"],
    },
];

const UPDATES: &[(&str, Info, &str, &str)] = &[
    (
        "kernel;6.9.2;x86_64;updates",
        Info::Security,
        "The Linux kernel",
        "Fixes CVE-2024-1086.",
    ),
    (
        "bash;5.2.26;x86_64;updates",
        Info::Bugfix,
        "The GNU Bourne Again shell",
        "Fixes a crash in the history expansion.",
    ),
];

const REPOS: &[(&str, &str, bool)] = &[
    ("main", "Main packages", true),
    ("updates", "Updates", true),
    ("testing", "Packages under test", false),
];

/// Packages that must never be removed.
const SYSTEM_PACKAGES: &[&str] = &["glibc", "kernel"];

pub struct DummyBackend {
    step_delay: Duration,
}

impl Default for DummyBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DummyBackend {
    pub fn new() -> Self {
        Self {
            step_delay: DEFAULT_STEP_DELAY,
        }
    }

    /// Delay between progress steps of long-running roles.
    pub fn with_step_delay(mut self, step_delay: Duration) -> Self {
        self.step_delay = step_delay;
        self
    }
}

impl Backend for DummyBackend {
    fn name(&self) -> &str {
        "dummy"
    }

    fn description(&self) -> &str {
        "In-memory backend with a fixed package catalog"
    }

    fn roles(&self) -> Vec<Role> {
        vec![
            Role::SearchName,
            Role::SearchDetails,
            Role::SearchFile,
            Role::SearchGroup,
            Role::Resolve,
            Role::GetDetails,
            Role::GetFiles,
            Role::GetUpdates,
            Role::GetUpdateDetail,
            Role::GetRepoList,
            Role::InstallPackages,
            Role::RemovePackages,
            Role::DownloadPackages,
            Role::RefreshCache,
        ]
    }

    fn entry_point(&self, role: Role) -> Option<EntryPoint> {
        let delay = self.step_delay;
        let entry: EntryPoint = match role {
            Role::SearchName | Role::SearchDetails | Role::SearchFile | Role::SearchGroup => {
                Arc::new(move |job: &BackendJob, params: &Parameters| search(job, params, role))
            }
            Role::Resolve => Arc::new(resolve),
            Role::GetDetails => Arc::new(get_details),
            Role::GetFiles => Arc::new(get_files),
            Role::GetUpdates => Arc::new(get_updates),
            Role::GetUpdateDetail => Arc::new(get_update_detail),
            Role::GetRepoList => Arc::new(get_repo_list),
            Role::InstallPackages => {
                Arc::new(move |job: &BackendJob, params: &Parameters| {
                    install_packages(job, params, delay)
                })
            }
            Role::RemovePackages => Arc::new(remove_packages),
            Role::DownloadPackages => Arc::new(download_packages),
            Role::RefreshCache => {
                Arc::new(move |job: &BackendJob, _: &Parameters| refresh_cache(job, delay))
            }
            _ => return None,
        };
        Some(entry)
    }

    fn runs_in_thread(&self, role: Role) -> bool {
        role != Role::GetRepoList
    }

    fn job_start(&self, job: &BackendJob) {
        let view = job.view();
        debug!(
            "[Job {}] dummy backend starting {} (locale {:?}, flags {})",
            view.id(),
            view.role(),
            view.locale(),
            view.transaction_flags()
        );
    }

    fn job_stop(&self, job: &BackendJob) {
        // release the database lock even when the role bailed out early
        job.set_locked(false);
    }
}

fn args(params: &Parameters) -> Vec<String> {
    params
        .get("args")
        .and_then(|v| v.as_array())
        .map(|values| {
            values
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

fn find(package_id: &str) -> Option<&'static CatalogEntry> {
    CATALOG.iter().find(|entry| entry.id == package_id)
}

fn name_of(package_id: &str) -> String {
    PackageId::parse(package_id)
        .map(|id| id.name().to_string())
        .unwrap_or_else(|_| package_id.to_string())
}

fn search(job: &BackendJob, params: &Parameters, role: Role) {
    let terms: Vec<String> = args(params).iter().map(|t| t.to_lowercase()).collect();
    job.set_status(Status::Query);
    job.set_percentage(0);

    for entry in CATALOG {
        let name = name_of(entry.id);
        let matched = terms.iter().any(|term| match role {
            Role::SearchName => name.contains(term.as_str()),
            Role::SearchDetails => {
                name.contains(term.as_str()) || entry.summary.to_lowercase().contains(term.as_str())
            }
            Role::SearchFile => entry.files.iter().any(|f| f.contains(term.as_str())),
            Role::SearchGroup => entry.group.as_str() == term,
            _ => false,
        });
        if matched {
            job.package(entry.info, entry.id, entry.summary);
        }
    }
    job.set_percentage(100);
}

fn resolve(job: &BackendJob, params: &Parameters) {
    job.set_status(Status::Query);
    for name in args(params) {
        let mut found = false;
        for entry in CATALOG.iter().filter(|e| name_of(e.id) == name) {
            job.package(entry.info, entry.id, entry.summary);
            found = true;
        }
        if !found {
            job.error_code(
                ErrorKind::PackageNotFound,
                format!("package '{}' could not be found", name),
            );
            return;
        }
    }
}

fn get_details(job: &BackendJob, params: &Parameters) {
    job.set_status(Status::Info);
    for package_id in args(params) {
        let Some(entry) = find(&package_id) else {
            job.error_code(
                ErrorKind::PackageNotFound,
                format!("package '{}' could not be found", package_id),
            );
            return;
        };
        job.details(Details {
            package_id: entry.id.to_string(),
            summary: entry.summary.to_string(),
            license: entry.license.to_string(),
            group: entry.group,
            description: entry.summary.to_string(),
            url: entry.url.to_string(),
            size: entry.size,
        });
    }
}

fn get_files(job: &BackendJob, params: &Parameters) {
    job.set_status(Status::Info);
    for package_id in args(params) {
        let Some(entry) = find(&package_id) else {
            job.error_code(
                ErrorKind::PackageNotFound,
                format!("package '{}' could not be found", package_id),
            );
            return;
        };
        let files = entry.files.iter().map(|f| f.to_string()).collect();
        job.files(Some(entry.id), files);
    }
}

fn get_updates(job: &BackendJob, _params: &Parameters) {
    job.set_status(Status::Query);
    for (package_id, info, summary, _) in UPDATES {
        job.package(*info, package_id, summary);
    }
}

fn get_update_detail(job: &BackendJob, params: &Parameters) {
    job.set_status(Status::Info);
    for package_id in args(params) {
        let Some((id, info, _, text)) = UPDATES.iter().find(|u| u.0 == package_id) else {
            job.error_code(
                ErrorKind::UpdateNotFound,
                format!("no update available for '{}'", package_id),
            );
            return;
        };
        let restart = if *info == Info::Security && name_of(id) == "kernel" {
            Restart::System
        } else {
            Restart::None
        };
        job.update_detail(UpdateDetail {
            package_id: id.to_string(),
            restart,
            update_text: text.to_string(),
            state: UpdateState::Stable,
            ..UpdateDetail::default()
        });
    }
}

fn get_repo_list(job: &BackendJob, _params: &Parameters) {
    job.set_status(Status::Query);
    for (repo_id, description, enabled) in REPOS {
        job.repo_detail(repo_id, description, *enabled);
    }
    // runs in place, nobody else finishes it
    job.finished();
}

fn install_packages(job: &BackendJob, params: &Parameters, delay: Duration) {
    let package_ids = args(params);
    job.set_allow_cancel(true);
    job.set_status(Status::DepResolve);

    let mut entries = Vec::with_capacity(package_ids.len());
    for package_id in &package_ids {
        match find(package_id) {
            Some(entry) if entry.info == Info::Installed => {
                job.error_code(
                    ErrorKind::PackageAlreadyInstalled,
                    format!("{} is already installed", package_id),
                );
                return;
            }
            Some(entry) => entries.push(entry),
            None => {
                job.error_code(
                    ErrorKind::PackageNotFound,
                    format!("package '{}' could not be found", package_id),
                );
                return;
            }
        }
    }

    job.set_locked(true);
    let total = (entries.len() as u32 * INSTALL_STEPS).max(1);
    let mut done = 0;
    for entry in &entries {
        job.package(Info::Installing, entry.id, entry.summary);
        for step in 1..=INSTALL_STEPS {
            if job.is_cancelled() {
                info!("[Job {}] install cancelled at {} of {} steps", job.id(), done, total);
                job.set_exit_code(Exit::Cancelled);
                return;
            }
            std::thread::sleep(delay);
            done += 1;
            job.item_progress(entry.id, Status::Install, step * 100 / INSTALL_STEPS);
            job.set_percentage(done * 100 / total);
        }
    }

    // past the point of no return
    job.set_allow_cancel(false);
    for entry in &entries {
        job.package(Info::Installed, entry.id, entry.summary);
    }
    job.set_percentage(100);
}

fn remove_packages(job: &BackendJob, params: &Parameters) {
    let package_ids = args(params);
    job.set_status(Status::DepResolve);

    for package_id in &package_ids {
        let name = name_of(package_id);
        if SYSTEM_PACKAGES.contains(&name.as_str()) {
            job.error_code(
                ErrorKind::CannotRemoveSystemPackage,
                format!("{} is a system package and cannot be removed", name),
            );
            return;
        }
        if find(package_id).map_or(true, |e| e.info != Info::Installed) {
            job.error_code(
                ErrorKind::PackageNotInstalled,
                format!("{} is not installed", package_id),
            );
            return;
        }
    }

    job.set_locked(true);
    for package_id in &package_ids {
        if let Some(entry) = find(package_id) {
            job.package(Info::Removing, entry.id, entry.summary);
        }
    }
    job.set_percentage(100);
}

fn download_packages(job: &BackendJob, params: &Parameters) {
    let package_ids = args(params);
    let directory = params
        .get("directory")
        .and_then(|v| v.as_str())
        .unwrap_or(DEFAULT_DOWNLOAD_DIR)
        .to_string();
    job.set_status(Status::Download);

    let mut entries = Vec::with_capacity(package_ids.len());
    for package_id in &package_ids {
        match find(package_id) {
            Some(entry) => entries.push(entry),
            None => {
                job.error_code(
                    ErrorKind::PackageNotFound,
                    format!("package '{}' could not be found", package_id),
                );
                return;
            }
        }
    }

    let mut remaining: u64 = entries.iter().map(|e| e.size).sum();
    job.set_download_size_remaining(remaining);
    for (idx, entry) in entries.iter().enumerate() {
        job.package(Info::Downloading, entry.id, entry.summary);
        let path = format!("{}/{}.pkg", directory, entry.id.replace(';', "-"));
        job.files(Some(entry.id), vec![path]);
        remaining -= entry.size;
        job.set_download_size_remaining(remaining);
        job.set_percentage(((idx + 1) * 100 / entries.len()) as u32);
    }
}

fn refresh_cache(job: &BackendJob, delay: Duration) {
    job.set_status(Status::RefreshCache);
    job.set_allow_cancel(true);
    for (idx, (repo_id, _, enabled)) in REPOS.iter().enumerate() {
        if job.is_cancelled() {
            job.set_exit_code(Exit::Cancelled);
            return;
        }
        if *enabled {
            debug!("[Job {}] refreshing {}", job.id(), repo_id);
            std::thread::sleep(delay);
        }
        job.set_percentage(((idx + 1) * 100 / REPOS.len()) as u32);
    }
}
