//! Event kinds and the events handlers receive.

use pkbroker_protocol::{
    Category, Details, DistroUpgrade, ErrorCode, EulaRequired, Exit, Files, ItemProgress,
    MediaChangeRequired, Package, RepoDetail, RepoSignatureRequired, RequireRestart, Status,
    UpdateDetail,
};
use serde::Serialize;
use std::fmt;

/// The closed set of things a job can report. Each kind has one handler
/// slot in the job's callback registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    AllowCancel,
    Details,
    ErrorCode,
    DistroUpgrade,
    Finished,
    Package,
    ItemProgress,
    Files,
    Percentage,
    Speed,
    DownloadSizeRemaining,
    RepoDetail,
    RepoSignatureRequired,
    EulaRequired,
    MediaChangeRequired,
    RequireRestart,
    StatusChanged,
    LockedChanged,
    UpdateDetail,
    Category,
}

impl EventKind {
    pub const COUNT: usize = 20;

    pub const ALL: [EventKind; EventKind::COUNT] = [
        EventKind::AllowCancel,
        EventKind::Details,
        EventKind::ErrorCode,
        EventKind::DistroUpgrade,
        EventKind::Finished,
        EventKind::Package,
        EventKind::ItemProgress,
        EventKind::Files,
        EventKind::Percentage,
        EventKind::Speed,
        EventKind::DownloadSizeRemaining,
        EventKind::RepoDetail,
        EventKind::RepoSignatureRequired,
        EventKind::EulaRequired,
        EventKind::MediaChangeRequired,
        EventKind::RequireRestart,
        EventKind::StatusChanged,
        EventKind::LockedChanged,
        EventKind::UpdateDetail,
        EventKind::Category,
    ];

    /// Slot index in the callback registry.
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::AllowCancel => "allow-cancel",
            EventKind::Details => "details",
            EventKind::ErrorCode => "error-code",
            EventKind::DistroUpgrade => "distro-upgrade",
            EventKind::Finished => "finished",
            EventKind::Package => "package",
            EventKind::ItemProgress => "item-progress",
            EventKind::Files => "files",
            EventKind::Percentage => "percentage",
            EventKind::Speed => "speed",
            EventKind::DownloadSizeRemaining => "download-size-remaining",
            EventKind::RepoDetail => "repo-detail",
            EventKind::RepoSignatureRequired => "repo-signature-required",
            EventKind::EulaRequired => "eula-required",
            EventKind::MediaChangeRequired => "media-change-required",
            EventKind::RequireRestart => "require-restart",
            EventKind::StatusChanged => "status-changed",
            EventKind::LockedChanged => "locked-changed",
            EventKind::UpdateDetail => "update-detail",
            EventKind::Category => "category",
        }
    }

    /// Kinds that carry no job state. Their entry points bail out before
    /// validating anything when nobody listens.
    pub fn is_payload_only(&self) -> bool {
        matches!(
            self,
            EventKind::Details
                | EventKind::ItemProgress
                | EventKind::UpdateDetail
                | EventKind::RequireRestart
                | EventKind::DistroUpgrade
                | EventKind::RepoDetail
                | EventKind::Category
                | EventKind::MediaChangeRequired
        )
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One reported occurrence, as delivered to a handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum JobEvent {
    AllowCancel(bool),
    Details(Details),
    ErrorCode(ErrorCode),
    DistroUpgrade(DistroUpgrade),
    Finished(Exit),
    Package(Package),
    ItemProgress(ItemProgress),
    Files(Files),
    Percentage(u32),
    /// Bytes per second.
    Speed(u64),
    /// Bytes.
    DownloadSizeRemaining(u64),
    RepoDetail(RepoDetail),
    RepoSignatureRequired(RepoSignatureRequired),
    EulaRequired(EulaRequired),
    MediaChangeRequired(MediaChangeRequired),
    RequireRestart(RequireRestart),
    StatusChanged(Status),
    LockedChanged(bool),
    UpdateDetail(UpdateDetail),
    Category(Category),
}

impl JobEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            JobEvent::AllowCancel(_) => EventKind::AllowCancel,
            JobEvent::Details(_) => EventKind::Details,
            JobEvent::ErrorCode(_) => EventKind::ErrorCode,
            JobEvent::DistroUpgrade(_) => EventKind::DistroUpgrade,
            JobEvent::Finished(_) => EventKind::Finished,
            JobEvent::Package(_) => EventKind::Package,
            JobEvent::ItemProgress(_) => EventKind::ItemProgress,
            JobEvent::Files(_) => EventKind::Files,
            JobEvent::Percentage(_) => EventKind::Percentage,
            JobEvent::Speed(_) => EventKind::Speed,
            JobEvent::DownloadSizeRemaining(_) => EventKind::DownloadSizeRemaining,
            JobEvent::RepoDetail(_) => EventKind::RepoDetail,
            JobEvent::RepoSignatureRequired(_) => EventKind::RepoSignatureRequired,
            JobEvent::EulaRequired(_) => EventKind::EulaRequired,
            JobEvent::MediaChangeRequired(_) => EventKind::MediaChangeRequired,
            JobEvent::RequireRestart(_) => EventKind::RequireRestart,
            JobEvent::StatusChanged(_) => EventKind::StatusChanged,
            JobEvent::LockedChanged(_) => EventKind::LockedChanged,
            JobEvent::UpdateDetail(_) => EventKind::UpdateDetail,
            JobEvent::Category(_) => EventKind::Category,
        }
    }
}
