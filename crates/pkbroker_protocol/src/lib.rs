//! Shared vocabulary for the package-management broker.
//!
//! Roles, statuses, exit and error classifications, package ids and the
//! payloads that backends report through a job. Nothing here knows about
//! threads or dispatch; see `pkbroker_job` for that.

pub mod defaults;
pub mod flags;
pub mod package_id;
pub mod payloads;
pub mod types;

pub use defaults::PERCENTAGE_UNKNOWN;
pub use flags::TransactionFlags;
pub use package_id::{PackageId, PackageIdError};
pub use payloads::{
    Category, Details, DistroUpgrade, ErrorCode, EulaRequired, Files, ItemProgress,
    MediaChangeRequired, Package, RepoDetail, RepoSignatureRequired, RequireRestart,
    UpdateDetail,
};
pub use types::{
    DistroUpgradeKind, ErrorKind, Exit, Group, Hint, Info, MediaType, Restart, Role, SigType,
    Status, UpdateState,
};
