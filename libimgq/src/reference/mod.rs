//! OCI Image Reference parsing and manipulation.
//!
//! This module provides a wrapper around the `oci_spec::distribution::Reference`
//! type to integrate with imgq's error handling, and the [`Repository`]
//! coordinate a query runs against.

use crate::error::{ImgqError, Result};
use oci_spec::distribution::Reference as OciReference;
use std::fmt;
use std::str::FromStr;


/// Registry host Docker Hub references resolve to.
pub const DOCKER_HUB_REGISTRY: &str = "docker.io";

/// Represents an OCI image reference, wrapping `oci_spec::distribution::Reference`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference(OciReference);

impl FromStr for Reference {
    type Err = ImgqError;

    fn from_str(s: &str) -> Result<Self> {
        let oci_reference = OciReference::from_str(s).map_err(|e| ImgqError::Validation {
            message: format!("Invalid image reference: {}", e),
            source: Some(Box::new(e)),
        })?;
        Ok(Reference(oci_reference))
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Reference {
    /// Returns the registry part of the reference.
    pub fn registry(&self) -> &str {
        self.0.registry()
    }

    /// Returns the repository part of the reference.
    pub fn repository(&self) -> &str {
        self.0.repository()
    }

    /// Returns the tag part of the reference, if present.
    pub fn tag(&self) -> Option<&str> {
        self.0.tag()
    }

    /// Returns the digest part of the reference, if present.
    pub fn digest(&self) -> Option<&str> {
        self.0.digest()
    }
}

/// A repository coordinate: registry host plus repository path.
///
/// Any tag or digest present on the parsed string is dropped; a query always
/// enumerates the repository's tags itself.
///
/// # Examples
///
/// ```
/// use libimgq::reference::Repository;
///
/// let repo: Repository = "ghcr.io/acme/api".parse().unwrap();
/// assert_eq!(repo.registry(), "ghcr.io");
/// assert_eq!(repo.name(), "acme/api");
/// assert_eq!(repo.tag_url("v1"), "ghcr.io/acme/api:v1");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Repository {
    registry: String,
    name: String,
}

impl FromStr for Repository {
    type Err = ImgqError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(ImgqError::validation("Repository name cannot be empty"));
        }

        let reference = Reference::from_str(trimmed)?;
        Ok(Self::new(reference.registry(), reference.repository()))
    }
}

impl fmt::Display for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.registry, self.name)
    }
}

impl Repository {
    /// Creates a coordinate from an already split registry host and path.
    pub fn new(registry: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            registry: registry.into(),
            name: name.into(),
        }
    }

    /// Returns the registry host (e.g. `ghcr.io`, `localhost:5000`).
    pub fn registry(&self) -> &str {
        &self.registry
    }

    /// Returns the repository path within the registry (e.g. `library/alpine`).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the fully qualified tag reference `<registry>/<name>:<tag>`.
    pub fn tag_url(&self, tag: &str) -> String {
        format!("{}/{}:{}", self.registry, self.name, tag)
    }

    /// Returns the fully qualified digest reference `<registry>/<name>@<digest>`.
    pub fn digest_url(&self, digest: &str) -> String {
        format!("{}/{}@{}", self.registry, self.name, digest)
    }
}
