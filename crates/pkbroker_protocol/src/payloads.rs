//! Payloads carried by job events.
//!
//! Package ids are kept as strings here; the engine validates them with
//! [`crate::PackageId::check`] at the emission boundary.

use serde::{Deserialize, Serialize};

use crate::types::{
    DistroUpgradeKind, ErrorKind, Group, Info, MediaType, Restart, SigType, Status, UpdateState,
};

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Package {
    pub info: Info,
    pub package_id: String,
    pub summary: String,
}

/// Progress of a single package inside a larger transaction.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ItemProgress {
    pub package_id: String,
    pub status: Status,
    pub percentage: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Details {
    pub package_id: String,
    pub summary: String,
    pub license: String,
    pub group: Group,
    pub description: String,
    pub url: String,
    /// Installed size in bytes.
    pub size: u64,
}

/// File list for one package, or for the whole transaction when
/// `package_id` is `None` (download jobs report delivered files this way).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Files {
    pub package_id: Option<String>,
    pub files: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UpdateDetail {
    pub package_id: String,
    pub updates: Vec<String>,
    pub obsoletes: Vec<String>,
    pub vendor_urls: Vec<String>,
    pub bugzilla_urls: Vec<String>,
    pub cve_urls: Vec<String>,
    pub restart: Restart,
    pub update_text: String,
    pub changelog: String,
    pub state: UpdateState,
    /// ISO 8601, as supplied by the backend.
    pub issued: String,
    pub updated: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RequireRestart {
    pub restart: Restart,
    pub package_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DistroUpgrade {
    pub state: DistroUpgradeKind,
    pub name: String,
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RepoSignatureRequired {
    pub package_id: String,
    pub repository_name: String,
    pub key_url: String,
    pub key_userid: String,
    pub key_id: String,
    pub key_fingerprint: String,
    pub key_timestamp: String,
    pub sig_type: SigType,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EulaRequired {
    pub eula_id: String,
    pub package_id: String,
    pub vendor_name: String,
    pub license_agreement: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MediaChangeRequired {
    pub media_type: MediaType,
    pub media_id: String,
    pub media_text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RepoDetail {
    pub repo_id: String,
    pub description: String,
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Category {
    pub parent_id: Option<String>,
    pub cat_id: String,
    pub name: String,
    pub summary: String,
    pub icon: String,
}

/// A backend-reported domain error.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ErrorCode {
    pub code: ErrorKind,
    pub details: String,
}
