//! Firmware semantic versions.
//!
//! Every feature gate in the driver (attestation, encrypted-command opcode,
//! per-product minimums) is decided by comparing [`SemVer`] values.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Firmware version (major, minor, patch).
///
/// Ordering is lexicographic over the three components, which the derived
/// `Ord` provides because of the field order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SemVer {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl SemVer {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// True if `self >= other`.
    pub fn at_least(&self, other: SemVer) -> bool {
        *self >= other
    }
}

impl fmt::Display for SemVer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}.{}.{}", self.major, self.minor, self.patch)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VersionParseError {
    #[error("expected three dot-separated components, got {0:?}")]
    WrongShape(String),
    #[error("invalid version component {component:?} in {input:?}")]
    InvalidComponent { input: String, component: String },
}

impl FromStr for SemVer {
    type Err = VersionParseError;

    /// Accepts `4.2.1` as well as the USB serial-number form `v4.2.1`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let body = trimmed.strip_prefix('v').unwrap_or(trimmed);
        let parts: Vec<&str> = body.split('.').collect();
        if parts.len() != 3 {
            return Err(VersionParseError::WrongShape(s.to_string()));
        }

        let parse = |component: &str| {
            component
                .parse::<u32>()
                .map_err(|_| VersionParseError::InvalidComponent {
                    input: s.to_string(),
                    component: component.to_string(),
                })
        };

        Ok(Self {
            major: parse(parts[0])?,
            minor: parse(parts[1])?,
            patch: parse(parts[2])?,
        })
    }
}
