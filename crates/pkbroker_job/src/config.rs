//! Engine configuration
//!
//! Read from a TOML file such as:
//!
//! ```toml
//! use_background_priority = true
//! background_nice = 19
//!
//! [exit_policy]
//! need_untrusted = ["gpg-failure", "bad-gpg-signature"]
//! cancelled_priority = ["cancelled-priority"]
//! repair_required = ["unfinished-transaction"]
//! ```
//!
//! Every field is optional.

use pkbroker_protocol::defaults::DEFAULT_BACKGROUND_NICE;
use pkbroker_protocol::{ErrorKind, Exit};
use serde::Deserialize;
use std::path::Path;

/// Error type for config operations
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Config not found at: {0}")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Lower the scheduling priority of worker threads for jobs that carry
    /// the background hint.
    #[serde(default = "default_use_background_priority")]
    pub use_background_priority: bool,

    /// Nice value applied to background workers.
    #[serde(default = "default_background_nice")]
    pub background_nice: i32,

    #[serde(default)]
    pub exit_policy: ExitPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            use_background_priority: default_use_background_priority(),
            background_nice: default_background_nice(),
            exit_policy: ExitPolicy::default(),
        }
    }
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}

/// Error kinds that force a distinguished exit instead of `failed`.
///
/// The split is backend and distribution specific, so it lives in config
/// rather than in the engine.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ExitPolicy {
    /// Errors a client may retry without the only-trusted flag.
    #[serde(default = "default_need_untrusted")]
    pub need_untrusted: Vec<ErrorKind>,

    #[serde(default = "default_cancelled_priority")]
    pub cancelled_priority: Vec<ErrorKind>,

    /// Errors that mean the package database needs a repair pass.
    #[serde(default = "default_repair_required")]
    pub repair_required: Vec<ErrorKind>,
}

impl Default for ExitPolicy {
    fn default() -> Self {
        Self {
            need_untrusted: default_need_untrusted(),
            cancelled_priority: default_cancelled_priority(),
            repair_required: default_repair_required(),
        }
    }
}

impl ExitPolicy {
    /// The forced exit for `kind`, or `None` when the generic rules apply.
    pub fn classify(&self, kind: ErrorKind) -> Option<Exit> {
        if self.need_untrusted.contains(&kind) {
            Some(Exit::NeedUntrusted)
        } else if self.cancelled_priority.contains(&kind) {
            Some(Exit::CancelledPriority)
        } else if self.repair_required.contains(&kind) {
            Some(Exit::RepairRequired)
        } else {
            None
        }
    }
}

fn default_use_background_priority() -> bool { true }
fn default_background_nice() -> i32 { DEFAULT_BACKGROUND_NICE }

fn default_need_untrusted() -> Vec<ErrorKind> {
    vec![
        ErrorKind::GpgFailure,
        ErrorKind::BadGpgSignature,
        ErrorKind::MissingGpgSignature,
        ErrorKind::CannotInstallRepoUnsigned,
        ErrorKind::CannotUpdateRepoUnsigned,
    ]
}

fn default_cancelled_priority() -> Vec<ErrorKind> {
    vec![ErrorKind::CancelledPriority]
}

fn default_repair_required() -> Vec<ErrorKind> {
    vec![ErrorKind::UnfinishedTransaction]
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert!(config.use_background_priority);
        assert_eq!(config.background_nice, 19);
        assert_eq!(
            config.exit_policy.classify(ErrorKind::BadGpgSignature),
            Some(Exit::NeedUntrusted)
        );
        assert_eq!(
            config.exit_policy.classify(ErrorKind::CancelledPriority),
            Some(Exit::CancelledPriority)
        );
        assert_eq!(
            config.exit_policy.classify(ErrorKind::UnfinishedTransaction),
            Some(Exit::RepairRequired)
        );
        assert_eq!(config.exit_policy.classify(ErrorKind::PackageNotFound), None);
    }

    #[test]
    fn test_load_empty_file() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("engine.toml");
        std::fs::write(&config_path, "").unwrap();

        let config = EngineConfig::load(&config_path).unwrap();
        assert!(config.use_background_priority);
        assert_eq!(config.exit_policy, ExitPolicy::default());
    }

    #[test]
    fn test_load_partial_policy() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("engine.toml");
        std::fs::write(
            &config_path,
            r#"
            use_background_priority = false

            [exit_policy]
            need_untrusted = ["gpg-failure"]
            "#,
        )
        .unwrap();

        let config = EngineConfig::load(&config_path).unwrap();
        assert!(!config.use_background_priority);
        assert_eq!(config.background_nice, 19);
        assert_eq!(config.exit_policy.need_untrusted, vec![ErrorKind::GpgFailure]);
        assert_eq!(config.exit_policy.classify(ErrorKind::BadGpgSignature), None);
        // untouched lists keep their defaults
        assert_eq!(
            config.exit_policy.classify(ErrorKind::UnfinishedTransaction),
            Some(Exit::RepairRequired)
        );
    }

    #[test]
    fn test_unknown_error_kind_is_rejected() {
        let err = EngineConfig::from_toml_str(
            r#"
            [exit_policy]
            repair_required = ["database-on-fire"]
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Toml(_)));
    }

    #[test]
    fn test_nonexistent_file() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("nonexistent.toml");

        let err = EngineConfig::load(&config_path).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }
}
