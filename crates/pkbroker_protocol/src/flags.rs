//! Transaction flags supplied by the client with each request.

use bitflags::bitflags;
use std::fmt;
use std::str::FromStr;

bitflags! {
    /// Modifiers for a transaction. An empty set means "do it for real".
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TransactionFlags: u64 {
        const ONLY_TRUSTED = 1 << 1;
        const SIMULATE = 1 << 2;
        const ONLY_DOWNLOAD = 1 << 3;
        const ALLOW_REINSTALL = 1 << 4;
        const JUST_REINSTALL = 1 << 5;
        const ALLOW_DOWNGRADE = 1 << 6;
    }
}

const FLAG_NAMES: &[(TransactionFlags, &str)] = &[
    (TransactionFlags::ONLY_TRUSTED, "only-trusted"),
    (TransactionFlags::SIMULATE, "simulate"),
    (TransactionFlags::ONLY_DOWNLOAD, "only-download"),
    (TransactionFlags::ALLOW_REINSTALL, "allow-reinstall"),
    (TransactionFlags::JUST_REINSTALL, "just-reinstall"),
    (TransactionFlags::ALLOW_DOWNGRADE, "allow-downgrade"),
];

impl TransactionFlags {
    fn flag_name(flag: TransactionFlags) -> Option<&'static str> {
        FLAG_NAMES
            .iter()
            .find(|(f, _)| *f == flag)
            .map(|(_, name)| *name)
    }

    /// Kebab-case names of the set flags, in bit order.
    pub fn names(&self) -> Vec<&'static str> {
        self.iter().filter_map(Self::flag_name).collect()
    }
}

impl fmt::Display for TransactionFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "none");
        }
        write!(f, "{}", self.names().join(","))
    }
}

impl FromStr for TransactionFlags {
    type Err = String;

    /// Parses a comma separated list such as `only-trusted,simulate`.
    /// `none` and the empty string give an empty set.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut flags = TransactionFlags::empty();
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            if part == "none" {
                continue;
            }
            let flag = FLAG_NAMES
                .iter()
                .find(|(_, name)| *name == part)
                .map(|(f, _)| *f)
                .ok_or_else(|| format!("Invalid transaction flag: '{}'", part))?;
            flags |= flag;
        }
        Ok(flags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flag_list() {
        let flags: TransactionFlags = "only-trusted, simulate".parse().unwrap();
        assert!(flags.contains(TransactionFlags::ONLY_TRUSTED));
        assert!(flags.contains(TransactionFlags::SIMULATE));
        assert!(!flags.contains(TransactionFlags::ONLY_DOWNLOAD));
        assert_eq!(flags.to_string(), "only-trusted,simulate");
    }

    #[test]
    fn test_none_is_empty() {
        assert_eq!("none".parse::<TransactionFlags>(), Ok(TransactionFlags::empty()));
        assert_eq!("".parse::<TransactionFlags>(), Ok(TransactionFlags::empty()));
        assert_eq!(TransactionFlags::empty().to_string(), "none");
    }

    #[test]
    fn test_unknown_flag_rejected() {
        assert!("only-trusted,yolo".parse::<TransactionFlags>().is_err());
    }
}
