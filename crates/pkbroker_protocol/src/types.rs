//! Canonical enums shared by the engine, backends and front ends.
//!
//! Every enum has a stable kebab-case string form used for logging, config
//! files and serialized events. `Unknown` is the default wherever the
//! daemon needs a "not set yet" value.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Declares a string-backed enum with `as_str`, `Display`, `FromStr`,
/// serde renames and an `ALL` table.
macro_rules! define_string_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident ($label:literal) {
            $( $(#[$vmeta:meta])* $variant:ident => $text:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
        pub enum $name {
            $( $(#[$vmeta])* #[serde(rename = $text)] $variant ),+
        }

        impl $name {
            /// Every variant, in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $( $name::$variant => $text ),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $( $text => Ok($name::$variant), )+
                    _ => Err(format!("Invalid {}: '{}'", $label, s)),
                }
            }
        }
    };
}

define_string_enum! {
    /// What a transaction was asked to do. Bound once per job.
    pub enum Role ("role") {
        #[default]
        Unknown => "unknown",
        Cancel => "cancel",
        DependsOn => "depends-on",
        GetDetails => "get-details",
        GetFiles => "get-files",
        GetPackages => "get-packages",
        GetRepoList => "get-repo-list",
        RequiredBy => "required-by",
        GetUpdateDetail => "get-update-detail",
        GetUpdates => "get-updates",
        InstallFiles => "install-files",
        InstallPackages => "install-packages",
        InstallSignature => "install-signature",
        RefreshCache => "refresh-cache",
        RemovePackages => "remove-packages",
        RepoEnable => "repo-enable",
        RepoSetData => "repo-set-data",
        Resolve => "resolve",
        SearchDetails => "search-details",
        SearchFile => "search-file",
        SearchGroup => "search-group",
        SearchName => "search-name",
        UpdatePackages => "update-packages",
        WhatProvides => "what-provides",
        AcceptEula => "accept-eula",
        DownloadPackages => "download-packages",
        GetDistroUpgrades => "get-distro-upgrades",
        GetCategories => "get-categories",
        GetOldTransactions => "get-old-transactions",
        RepairSystem => "repair-system",
        GetDetailsLocal => "get-details-local",
        GetFilesLocal => "get-files-local",
        RepoRemove => "repo-remove",
        UpgradeSystem => "upgrade-system",
    }
}

define_string_enum! {
    /// The phase a job is currently in.
    pub enum Status ("status") {
        #[default]
        Unknown => "unknown",
        Wait => "wait",
        Setup => "setup",
        Running => "running",
        Query => "query",
        Info => "info",
        Remove => "remove",
        RefreshCache => "refresh-cache",
        Download => "download",
        Install => "install",
        Update => "update",
        Cleanup => "cleanup",
        Obsolete => "obsolete",
        DepResolve => "dep-resolve",
        SigCheck => "sig-check",
        TestCommit => "test-commit",
        Commit => "commit",
        Request => "request",
        Finished => "finished",
        Cancel => "cancel",
        DownloadRepository => "download-repository",
        DownloadPackagelist => "download-packagelist",
        DownloadFilelist => "download-filelist",
        DownloadChangelog => "download-changelog",
        DownloadGroup => "download-group",
        DownloadUpdateinfo => "download-updateinfo",
        Repackaging => "repackaging",
        LoadingCache => "loading-cache",
        ScanApplications => "scan-applications",
        GeneratePackageList => "generate-package-list",
        WaitingForLock => "waiting-for-lock",
        WaitingForAuth => "waiting-for-auth",
        ScanProcessList => "scan-process-list",
        CheckExecutableFiles => "check-executable-files",
        CheckLibraries => "check-libraries",
        CopyFiles => "copy-files",
        RunHook => "run-hook",
    }
}

impl Status {
    /// Statuses that are entered before real work starts.
    pub fn is_preamble(&self) -> bool {
        matches!(self, Status::Unknown | Status::Wait | Status::Setup)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Finished)
    }
}

define_string_enum! {
    /// Terminal classification of a finished job.
    pub enum Exit ("exit") {
        #[default]
        Unknown => "unknown",
        Success => "success",
        Failed => "failed",
        Cancelled => "cancelled",
        KeyRequired => "key-required",
        EulaRequired => "eula-required",
        Killed => "killed",
        MediaChangeRequired => "media-change-required",
        NeedUntrusted => "need-untrusted",
        CancelledPriority => "cancelled-priority",
        SkipTransaction => "skip-transaction",
        RepairRequired => "repair-required",
    }
}

impl Exit {
    pub fn is_success(&self) -> bool {
        matches!(self, Exit::Success)
    }
}

define_string_enum! {
    /// Domain error reported by a backend through `error_code`.
    pub enum ErrorKind ("error kind") {
        #[default]
        Unknown => "unknown",
        Oom => "oom",
        NoNetwork => "no-network",
        NotSupported => "not-supported",
        InternalError => "internal-error",
        GpgFailure => "gpg-failure",
        PackageIdInvalid => "package-id-invalid",
        PackageNotInstalled => "package-not-installed",
        PackageNotFound => "package-not-found",
        PackageAlreadyInstalled => "package-already-installed",
        PackageDownloadFailed => "package-download-failed",
        GroupNotFound => "group-not-found",
        GroupListInvalid => "group-list-invalid",
        DepResolutionFailed => "dep-resolution-failed",
        FilterInvalid => "filter-invalid",
        CreateThreadFailed => "create-thread-failed",
        TransactionError => "transaction-error",
        TransactionCancelled => "transaction-cancelled",
        NoCache => "no-cache",
        RepoNotFound => "repo-not-found",
        CannotRemoveSystemPackage => "cannot-remove-system-package",
        ProcessKill => "process-kill",
        FailedInitialization => "failed-initialization",
        FailedFinalise => "failed-finalise",
        FailedConfigParsing => "failed-config-parsing",
        CannotCancel => "cannot-cancel",
        CannotGetLock => "cannot-get-lock",
        NoPackagesToUpdate => "no-packages-to-update",
        CannotWriteRepoConfig => "cannot-write-repo-config",
        LocalInstallFailed => "local-install-failed",
        BadGpgSignature => "bad-gpg-signature",
        MissingGpgSignature => "missing-gpg-signature",
        CannotInstallSourcePackage => "cannot-install-source-package",
        RepoConfigurationError => "repo-configuration-error",
        NoLicenseAgreement => "no-license-agreement",
        FileConflicts => "file-conflicts",
        PackageConflicts => "package-conflicts",
        RepoNotAvailable => "repo-not-available",
        InvalidPackageFile => "invalid-package-file",
        PackageInstallBlocked => "package-install-blocked",
        PackageCorrupt => "package-corrupt",
        AllPackagesAlreadyInstalled => "all-packages-already-installed",
        FileNotFound => "file-not-found",
        NoMoreMirrorsToTry => "no-more-mirrors-to-try",
        NoDistroUpgradeData => "no-distro-upgrade-data",
        IncompatibleArchitecture => "incompatible-architecture",
        NoSpaceOnDevice => "no-space-on-device",
        MediaChangeRequired => "media-change-required",
        NotAuthorized => "not-authorized",
        UpdateNotFound => "update-not-found",
        CannotInstallRepoUnsigned => "cannot-install-repo-unsigned",
        CannotUpdateRepoUnsigned => "cannot-update-repo-unsigned",
        CannotGetFilelist => "cannot-get-filelist",
        CannotGetRequires => "cannot-get-requires",
        CannotDisableRepository => "cannot-disable-repository",
        RestrictedDownload => "restricted-download",
        PackageFailedToConfigure => "package-failed-to-configure",
        PackageFailedToBuild => "package-failed-to-build",
        PackageFailedToInstall => "package-failed-to-install",
        PackageFailedToRemove => "package-failed-to-remove",
        UpdateFailedDueToRunningProcess => "update-failed-due-to-running-process",
        PackageDatabaseChanged => "package-database-changed",
        ProvideTypeNotSupported => "provide-type-not-supported",
        InstallRootInvalid => "install-root-invalid",
        CannotFetchSources => "cannot-fetch-sources",
        CancelledPriority => "cancelled-priority",
        UnfinishedTransaction => "unfinished-transaction",
        LockRequired => "lock-required",
        RepoAlreadySet => "repo-already-set",
    }
}

define_string_enum! {
    /// Per-package state carried by a package event.
    pub enum Info ("info") {
        #[default]
        Unknown => "unknown",
        Installed => "installed",
        Available => "available",
        Low => "low",
        Enhancement => "enhancement",
        Normal => "normal",
        Bugfix => "bugfix",
        Important => "important",
        Security => "security",
        Blocked => "blocked",
        Downloading => "downloading",
        Updating => "updating",
        Installing => "installing",
        Removing => "removing",
        Cleanup => "cleanup",
        Obsoleting => "obsoleting",
        CollectionInstalled => "collection-installed",
        CollectionAvailable => "collection-available",
        Finished => "finished",
        Reinstalling => "reinstalling",
        Downgrading => "downgrading",
        Preparing => "preparing",
        Decompressing => "decompressing",
        Untrusted => "untrusted",
        Trusted => "trusted",
        Unavailable => "unavailable",
        Critical => "critical",
    }
}

impl Info {
    /// The job status implied by a package in this state, if any.
    ///
    /// A package event with one of these infos switches the job status
    /// first, so the status and package streams agree on the phase.
    pub fn implied_status(&self) -> Option<Status> {
        match self {
            Info::Downloading => Some(Status::Download),
            Info::Updating => Some(Status::Update),
            Info::Installing => Some(Status::Install),
            Info::Removing => Some(Status::Remove),
            Info::Cleanup => Some(Status::Cleanup),
            Info::Obsoleting => Some(Status::Obsolete),
            _ => None,
        }
    }
}

define_string_enum! {
    /// What has to be restarted after a package change.
    pub enum Restart ("restart") {
        #[default]
        Unknown => "unknown",
        None => "none",
        Application => "application",
        Session => "session",
        System => "system",
        SecuritySession => "security-session",
        SecuritySystem => "security-system",
    }
}

define_string_enum! {
    /// Package group, as reported in details.
    pub enum Group ("group") {
        #[default]
        Unknown => "unknown",
        Accessibility => "accessibility",
        Accessories => "accessories",
        AdminTools => "admin-tools",
        Communication => "communication",
        DesktopGnome => "desktop-gnome",
        DesktopKde => "desktop-kde",
        DesktopOther => "desktop-other",
        DesktopXfce => "desktop-xfce",
        Education => "education",
        Fonts => "fonts",
        Games => "games",
        Graphics => "graphics",
        Internet => "internet",
        Legacy => "legacy",
        Localization => "localization",
        Maps => "maps",
        Multimedia => "multimedia",
        Network => "network",
        Office => "office",
        Other => "other",
        PowerManagement => "power-management",
        Programming => "programming",
        Publishing => "publishing",
        Repos => "repos",
        Security => "security",
        Servers => "servers",
        System => "system",
        Virtualization => "virtualization",
        Science => "science",
        Documentation => "documentation",
        Electronics => "electronics",
        Collections => "collections",
        Vendor => "vendor",
        Newest => "newest",
    }
}

define_string_enum! {
    pub enum UpdateState ("update state") {
        #[default]
        Unknown => "unknown",
        Stable => "stable",
        Unstable => "unstable",
        Testing => "testing",
    }
}

define_string_enum! {
    pub enum DistroUpgradeKind ("distro upgrade kind") {
        #[default]
        Unknown => "unknown",
        Stable => "stable",
        Unstable => "unstable",
    }
}

define_string_enum! {
    pub enum SigType ("signature type") {
        #[default]
        Unknown => "unknown",
        Gpg => "gpg",
    }
}

define_string_enum! {
    pub enum MediaType ("media type") {
        #[default]
        Unknown => "unknown",
        Cd => "cd",
        Dvd => "dvd",
        Disc => "disc",
    }
}

define_string_enum! {
    /// Tri-state hint supplied by the client (background, interactive).
    pub enum Hint ("hint") {
        False => "false",
        True => "true",
        #[default]
        Unset => "unset",
    }
}

impl Hint {
    pub fn is_true(&self) -> bool {
        matches!(self, Hint::True)
    }
}

impl From<bool> for Hint {
    fn from(value: bool) -> Self {
        if value {
            Hint::True
        } else {
            Hint::False
        }
    }
}
