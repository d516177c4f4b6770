//! Image platform (`os/arch`) parsing and matching.

use crate::error::{ImgqError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;


/// An operating system and CPU architecture pair, e.g. `linux/amd64`.
///
/// Equality ignores ASCII case on both fields.
///
/// # Examples
///
/// ```
/// use libimgq::platform::Platform;
///
/// let platform: Platform = "linux/arm64".parse().unwrap();
/// assert_eq!(platform, Platform::new("Linux", "ARM64"));
/// assert_eq!(platform.to_string(), "linux/arm64");
/// ```
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
pub struct Platform {
    pub operating_system: String,
    pub architecture: String,
}

impl Platform {
    /// Creates a platform from its parts.
    pub fn new(operating_system: impl Into<String>, architecture: impl Into<String>) -> Self {
        Self {
            operating_system: operating_system.into(),
            architecture: architecture.into(),
        }
    }

    /// Returns true if `os` and `arch` name this platform, ignoring case.
    pub fn matches(&self, os: &str, arch: &str) -> bool {
        self.operating_system.eq_ignore_ascii_case(os)
            && self.architecture.eq_ignore_ascii_case(arch)
    }
}

impl PartialEq for Platform {
    fn eq(&self, other: &Self) -> bool {
        self.matches(&other.operating_system, &other.architecture)
    }
}

impl FromStr for Platform {
    type Err = ImgqError;

    /// Parses `os/arch`. A trailing `/variant` (as in `linux/arm/v7`) is
    /// accepted and ignored.
    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.trim().split('/');
        match (parts.next(), parts.next()) {
            (Some(os), Some(arch)) if !os.is_empty() && !arch.is_empty() => {
                Ok(Self::new(os, arch))
            }
            _ => Err(ImgqError::configuration(format!(
                "Invalid platform '{}': expected format os/arch",
                s
            ))),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.operating_system, self.architecture)
    }
}

/// Returns true if `os`/`arch` satisfies at least one of `required`.
///
/// An empty requirement set accepts every platform.
pub fn is_supported(required: &[Platform], os: &str, arch: &str) -> bool {
    required.is_empty() || required.iter().any(|p| p.matches(os, arch))
}
