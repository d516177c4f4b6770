//! Error types for imgq
//!
//! Every failure the resolution engine can report is a variant of
//! [`ImgqError`]. The variants fall into four families:
//!
//! - configuration problems detected before any network call
//!   ([`ImgqError::Configuration`])
//! - registry transport failures ([`ImgqError::Network`],
//!   [`ImgqError::Authentication`], [`ImgqError::NotFound`],
//!   [`ImgqError::RateLimit`], [`ImgqError::Server`])
//! - manifests the engine does not understand
//!   ([`ImgqError::UnsupportedManifest`])
//! - malformed documents ([`ImgqError::Decode`])

use thiserror::Error;


type BoxedSource = Box<dyn std::error::Error + Send + Sync>;

/// Main error type for imgq operations
#[derive(Error, Debug)]
pub enum ImgqError {
    /// Invalid query or configuration input (bad tag pattern, bad platform, bad config file)
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        #[source]
        source: Option<BoxedSource>,
    },

    /// Network-related errors (connection, timeout, DNS)
    #[error("Network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<BoxedSource>,
    },

    /// Authentication errors (401, 403, token issues)
    #[error("Authentication error (status: {status_code:?}): {message}")]
    Authentication {
        message: String,
        status_code: Option<u16>,
    },

    /// Resource not found errors (404)
    #[error("{resource_type} not found: {name}")]
    NotFound { resource_type: String, name: String },

    /// Rate limiting errors (429)
    #[error("Rate limit: {message}")]
    RateLimit {
        message: String,
        retry_after: Option<u64>,
    },

    /// Server errors (500, 502, 503, 504)
    #[error("Server error (status: {status_code}): {message}")]
    Server { message: String, status_code: u16 },

    /// The registry served a manifest whose media type no resolver handles
    #[error("Unsupported manifest media type: {media_type}")]
    UnsupportedManifest { media_type: String },

    /// Malformed manifest, config blob or history entry
    #[error("Decode error: {message}")]
    Decode {
        message: String,
        #[source]
        source: Option<BoxedSource>,
    },

    /// Malformed caller input (reference, digest) or content failing verification
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        #[source]
        source: Option<BoxedSource>,
    },

    /// A work unit stopped because its query was cancelled
    #[error("Operation cancelled")]
    Cancelled,
}

/// Result type alias for imgq operations
pub type Result<T> = std::result::Result<T, ImgqError>;

impl ImgqError {
    /// Creates a new configuration error.
    ///
    /// # Examples
    ///
    /// ```
    /// use libimgq::error::ImgqError;
    ///
    /// let err = ImgqError::configuration("invalid tag pattern");
    /// assert!(matches!(err, ImgqError::Configuration { .. }));
    /// ```
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new configuration error with a source error.
    pub fn configuration_with_source<S, E>(message: S, source: E) -> Self
    where
        S: Into<String>,
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Configuration {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a new network error.
    ///
    /// # Examples
    ///
    /// ```
    /// use libimgq::error::ImgqError;
    ///
    /// let err = ImgqError::network("connection refused");
    /// assert!(matches!(err, ImgqError::Network { .. }));
    /// ```
    pub fn network<S: Into<String>>(message: S) -> Self {
        Self::Network {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new network error with a source error.
    ///
    /// # Examples
    ///
    /// ```
    /// use libimgq::error::ImgqError;
    /// use std::io;
    ///
    /// let io_err = io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused");
    /// let err = ImgqError::network_with_source("failed to connect", io_err);
    /// assert!(matches!(err, ImgqError::Network { .. }));
    /// ```
    pub fn network_with_source<S, E>(message: S, source: E) -> Self
    where
        S: Into<String>,
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Network {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a new authentication error.
    ///
    /// # Examples
    ///
    /// ```
    /// use libimgq::error::ImgqError;
    ///
    /// let err = ImgqError::authentication("invalid credentials", Some(401));
    /// assert!(matches!(err, ImgqError::Authentication { .. }));
    /// ```
    pub fn authentication<S: Into<String>>(message: S, status_code: Option<u16>) -> Self {
        Self::Authentication {
            message: message.into(),
            status_code,
        }
    }

    /// Creates a new not found error.
    pub fn not_found<S: Into<String>, N: Into<String>>(resource_type: S, name: N) -> Self {
        Self::NotFound {
            resource_type: resource_type.into(),
            name: name.into(),
        }
    }

    /// Creates a new rate limit error.
    pub fn rate_limit<S: Into<String>>(message: S, retry_after: Option<u64>) -> Self {
        Self::RateLimit {
            message: message.into(),
            retry_after,
        }
    }

    /// Creates a new server error.
    pub fn server<S: Into<String>>(message: S, status_code: u16) -> Self {
        Self::Server {
            message: message.into(),
            status_code,
        }
    }

    /// Creates a new unsupported manifest error for the given media type.
    ///
    /// # Examples
    ///
    /// ```
    /// use libimgq::error::ImgqError;
    ///
    /// let err = ImgqError::unsupported_manifest("application/vnd.example+json");
    /// assert!(err.to_string().contains("application/vnd.example+json"));
    /// ```
    pub fn unsupported_manifest<S: Into<String>>(media_type: S) -> Self {
        Self::UnsupportedManifest {
            media_type: media_type.into(),
        }
    }

    /// Creates a new decode error.
    pub fn decode<S: Into<String>>(message: S) -> Self {
        Self::Decode {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new decode error with a source error.
    ///
    /// # Examples
    ///
    /// ```
    /// use libimgq::error::ImgqError;
    ///
    /// let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
    /// let err = ImgqError::decode_with_source("failed to parse manifest", json_err);
    /// assert!(matches!(err, ImgqError::Decode { .. }));
    /// ```
    pub fn decode_with_source<S, E>(message: S, source: E) -> Self
    where
        S: Into<String>,
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Decode {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a new validation error.
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new validation error with a source error.
    pub fn validation_with_source<S, E>(message: S, source: E) -> Self
    where
        S: Into<String>,
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Validation {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Returns true if the error came from talking to the registry.
    ///
    /// # Examples
    ///
    /// ```
    /// use libimgq::error::ImgqError;
    ///
    /// assert!(ImgqError::server("bad gateway", 502).is_transport());
    /// assert!(!ImgqError::decode("truncated body").is_transport());
    /// ```
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Network { .. }
                | Self::Authentication { .. }
                | Self::NotFound { .. }
                | Self::RateLimit { .. }
                | Self::Server { .. }
        )
    }
}
