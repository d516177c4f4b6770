//! OCI Content Digest validation and verification.
//!
//! This module provides a wrapper around the `oci_spec::image::Digest` type
//! to integrate with imgq's error handling, plus content verification used
//! when downloading config blobs.

use crate::error::{ImgqError, Result};
use oci_spec::image::Digest as OciDigest;
use sha2::{Digest as Sha2Digest, Sha256};
use std::fmt;
use std::str::FromStr;


/// Represents a content digest, wrapping the `oci_spec::image::Digest` type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Digest(OciDigest);

impl FromStr for Digest {
    type Err = ImgqError;

    fn from_str(s: &str) -> Result<Self> {
        let oci_digest = OciDigest::from_str(s).map_err(|e| ImgqError::Validation {
            message: format!("Invalid digest format: {}", e),
            source: Some(Box::new(e)),
        })?;
        Ok(Digest(oci_digest))
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Digest {
    /// Returns the algorithm part of the digest (e.g. `sha256`).
    pub fn algorithm(&self) -> String {
        self.0.algorithm().to_string()
    }

    /// Returns the hex-encoded hash part of the digest.
    pub fn hex(&self) -> &str {
        self.0.digest()
    }

    /// Checks that `content` hashes to this digest.
    ///
    /// Only `sha256` digests can be verified.
    ///
    /// # Examples
    ///
    /// ```
    /// use libimgq::digest::Digest;
    ///
    /// let digest: Digest =
    ///     "sha256:2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
    ///         .parse()
    ///         .unwrap();
    /// assert!(digest.verify(b"hello").is_ok());
    /// assert!(digest.verify(b"world").is_err());
    /// ```
    pub fn verify(&self, content: &[u8]) -> Result<()> {
        if self.algorithm() != "sha256" {
            return Err(ImgqError::validation(format!(
                "Unsupported digest algorithm: {}. Only sha256 is currently supported",
                self.algorithm()
            )));
        }

        let computed = compute_sha256(content);
        if computed != self.hex() {
            return Err(ImgqError::validation(format!(
                "Digest mismatch: expected {}, computed sha256:{}",
                self, computed
            )));
        }

        Ok(())
    }
}

/// Computes the lowercase hex sha256 of `content`.
pub fn compute_sha256(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{:x}", hasher.finalize())
}

/// Returns `sha256:<hex>` for `content`.
pub fn sha256_digest_of(content: &[u8]) -> String {
    format!("sha256:{}", compute_sha256(content))
}
