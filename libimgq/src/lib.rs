//! imgq - Container Image Query Library
//!
//! imgq answers one question about a repository in an OCI-compliant
//! container registry: which images match this tag pattern, these platforms
//! and these labels, and when were they built?
//!
//! # Quick Start
//!
//! ```no_run
//! use libimgq::{ImageQuery, Imgq};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let imgq = Imgq::connect("http://localhost:5000")?;
//!
//!     let query = ImageQuery::new("localhost:5000/alpine")
//!         .tag_pattern(r"/^3\.\d+$/")
//!         .platform("linux/arm64");
//!
//!     let outcome = imgq.query(&query).await;
//!     for image in &outcome.results {
//!         println!("{} {} {}", image.tag, image.platform, image.build_timestamp);
//!     }
//!     if let Some(error) = outcome.error {
//!         eprintln!("query stopped early: {error}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Features
//!
//! - **Every manifest schema**: image indexes, OCI and Docker v2 image
//!   manifests and Docker schema 1 manifests
//! - **Concurrent resolution**: one task per tag and per matching platform
//! - **Deterministic ordering**: newest first, ties broken by image digest
//! - **Authentication**: Basic credentials and the registry bearer token flow
//!
//! # Main Types
//!
//! - [`Imgq`] - Main entry point
//! - [`ImgqBuilder`] - Builder for configuration and credentials
//! - [`ImageQuery`] - What to look for
//! - [`ImageResult`] - One resolved (tag, platform) pair
//! - [`QueryOutcome`] - Results plus the error that stopped the query, if any
//!
//! The low-level modules are public for callers that bring their own
//! [`client::RegistryClient`] and call [`run_query`] directly.

#![warn(clippy::all)]

/// Returns the libimgq crate version.
///
/// # Examples
///
/// ```
/// let version = libimgq::version();
/// assert!(!version.is_empty());
/// ```
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

mod engine;
pub use engine::{Imgq, ImgqBuilder};

pub use auth::{CredentialSet, Credentials, RegistryCredential};
pub use client::RegistryClient;
pub use config::Config;
pub use error::{ImgqError, Result};
pub use manifest::ManifestKind;
pub use platform::Platform;
pub use query::{ImageQuery, ImageResult, QueryOutcome, run_query, run_query_blocking};
pub use reference::Repository;

#[doc(hidden)]
pub mod auth;
#[doc(hidden)]
pub mod channel;
#[doc(hidden)]
pub mod client;
#[doc(hidden)]
pub mod config;
#[doc(hidden)]
pub mod digest;
#[doc(hidden)]
pub mod error;
#[doc(hidden)]
pub mod filter;
#[doc(hidden)]
pub mod format;
#[doc(hidden)]
pub mod manifest;
#[doc(hidden)]
pub mod platform;
#[doc(hidden)]
pub mod query;
#[doc(hidden)]
pub mod reference;
#[doc(hidden)]
pub mod resolver;

#[cfg(test)]
mod testing;
