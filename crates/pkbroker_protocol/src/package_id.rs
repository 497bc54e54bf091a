//! Package identifiers: `name;version;arch;data`.
//!
//! Backends pass package ids as plain strings. The engine checks them with
//! [`PackageId::check`] before anything reaches a handler.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Section delimiter inside a package id.
pub const PACKAGE_ID_DELIMITER: char = ';';

const PACKAGE_ID_SECTIONS: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PackageIdError {
    #[error("package id '{id}' has {found} sections, expected 4")]
    WrongSectionCount { id: String, found: usize },

    #[error("package id '{0}' has an empty name")]
    EmptyName(String),
}

/// A parsed package id. Version, arch and data may be empty; the name may not.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PackageId {
    name: String,
    version: String,
    arch: String,
    data: String,
}

impl PackageId {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        arch: impl Into<String>,
        data: impl Into<String>,
    ) -> Result<Self, PackageIdError> {
        let id = Self {
            name: name.into(),
            version: version.into(),
            arch: arch.into(),
            data: data.into(),
        };
        // a delimiter inside any field would change the section count
        Self::parse(&id.to_string())
    }

    pub fn parse(value: &str) -> Result<Self, PackageIdError> {
        let sections: Vec<&str> = value.split(PACKAGE_ID_DELIMITER).collect();
        if sections.len() != PACKAGE_ID_SECTIONS {
            return Err(PackageIdError::WrongSectionCount {
                id: value.to_string(),
                found: sections.len(),
            });
        }
        if sections[0].is_empty() {
            return Err(PackageIdError::EmptyName(value.to_string()));
        }
        Ok(Self {
            name: sections[0].to_string(),
            version: sections[1].to_string(),
            arch: sections[2].to_string(),
            data: sections[3].to_string(),
        })
    }

    /// True if `value` is a well formed package id.
    pub fn check(value: &str) -> bool {
        Self::parse(value).is_ok()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn arch(&self) -> &str {
        &self.arch
    }

    /// Repository or installed-state marker, backend specific.
    pub fn data(&self) -> &str {
        &self.data
    }
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{d}{}{d}{}{d}{}",
            self.name,
            self.version,
            self.arch,
            self.data,
            d = PACKAGE_ID_DELIMITER
        )
    }
}

impl FromStr for PackageId {
    type Err = PackageIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for PackageId {
    type Error = PackageIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PackageId> for String {
    fn from(id: PackageId) -> Self {
        id.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_id() {
        let id = PackageId::parse("bash;5.1;x86_64;main").unwrap();
        assert_eq!(id.name(), "bash");
        assert_eq!(id.version(), "5.1");
        assert_eq!(id.arch(), "x86_64");
        assert_eq!(id.data(), "main");
        assert_eq!(id.to_string(), "bash;5.1;x86_64;main");
    }

    #[test]
    fn test_empty_sections_other_than_name_are_allowed() {
        assert!(PackageId::check("powertop;;;"));
    }

    #[test]
    fn test_missing_name_rejected() {
        assert_eq!(
            PackageId::parse(";0.0.1;i386;fedora"),
            Err(PackageIdError::EmptyName(";0.0.1;i386;fedora".to_string()))
        );
    }

    #[test]
    fn test_wrong_section_count_rejected() {
        assert!(!PackageId::check("bash"));
        assert!(!PackageId::check("bash;5.1;x86_64"));
        assert!(!PackageId::check("bash;5.1;x86_64;main;extra"));
        assert!(!PackageId::check(""));
    }

    #[test]
    fn test_serde_uses_string_form() {
        let id = PackageId::new("foo", "1.0", "x86", "repo").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"foo;1.0;x86;repo\"");
        let bad: Result<PackageId, _> = serde_json::from_str("\"foo;1.0\"");
        assert!(bad.is_err());
    }
}
