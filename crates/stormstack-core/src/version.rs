//! Module version arithmetic.
//!
//! Versions follow `major.minor[.patch]`. A resolved version satisfies a
//! requirement when the majors match exactly and the resolved minor is at
//! least the required minor; patch levels never participate.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A module version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModuleVersion {
    /// Breaking-change counter.
    pub major: u32,
    /// Feature counter.
    pub minor: u32,
    /// Fix counter. Defaults to 0 when omitted in the textual form.
    pub patch: u32,
}

impl ModuleVersion {
    /// Create a version.
    #[must_use]
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Whether this (resolved) version satisfies `required`.
    #[must_use]
    pub const fn satisfies(&self, required: &Self) -> bool {
        self.major == required.major && self.minor >= required.minor
    }
}

impl fmt::Display for ModuleVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Error produced when parsing a version string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseVersionError(String);

impl fmt::Display for ParseVersionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid module version '{}'", self.0)
    }
}

impl std::error::Error for ParseVersionError {}

impl FromStr for ModuleVersion {
    type Err = ParseVersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('.');
        let major = parts
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or_else(|| ParseVersionError(s.to_string()))?;
        let minor = parts
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or_else(|| ParseVersionError(s.to_string()))?;
        let patch = match parts.next() {
            Some(p) => p.parse().map_err(|_| ParseVersionError(s.to_string()))?,
            None => 0,
        };
        if parts.next().is_some() {
            return Err(ParseVersionError(s.to_string()));
        }
        Ok(Self {
            major,
            minor,
            patch,
        })
    }
}
