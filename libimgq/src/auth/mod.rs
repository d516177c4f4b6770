//! Authentication handling for OCI registries.
//!
//! This module provides the credential types the engine shares read-only
//! across every concurrent work unit of a query, the host-keyed
//! [`CredentialSet`] a configuration surface hands in, and parsing of the
//! `WWW-Authenticate` challenges used by the bearer token flow.

use crate::error::{ImgqError, Result};
use crate::reference::DOCKER_HUB_REGISTRY;
use std::collections::HashMap;


/// Credentials for registry authentication.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Credentials {
    /// No authentication required (anonymous access)
    #[default]
    Anonymous,

    /// HTTP Basic authentication with username and password
    Basic {
        /// Username for authentication
        username: String,
        /// Password for authentication
        password: String,
    },

    /// Bearer token authentication (OAuth2-style)
    Bearer {
        /// The bearer token
        token: String,
    },
}

impl Credentials {
    /// Creates anonymous credentials.
    pub fn anonymous() -> Self {
        Self::Anonymous
    }

    /// Creates Basic authentication credentials.
    ///
    /// # Examples
    ///
    /// ```
    /// use libimgq::auth::Credentials;
    ///
    /// let creds = Credentials::basic("username", "password");
    /// assert!(creds.to_header_value().unwrap().starts_with("Basic "));
    /// ```
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::Basic {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Creates Bearer token credentials.
    pub fn bearer(token: impl Into<String>) -> Self {
        Self::Bearer {
            token: token.into(),
        }
    }

    /// Returns the Authorization header value for these credentials.
    pub fn to_header_value(&self) -> Option<String> {
        match self {
            Self::Anonymous => None,
            Self::Basic { username, password } => {
                use base64::{Engine as _, engine::general_purpose};
                let credentials = format!("{}:{}", username, password);
                let encoded = general_purpose::STANDARD.encode(credentials);
                Some(format!("Basic {}", encoded))
            }
            Self::Bearer { token } => Some(format!("Bearer {}", token)),
        }
    }
}

/// A username/password pair bound to one registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryCredential {
    /// Registry URL or host the credential belongs to
    pub registry_url: String,
    pub username: String,
    pub password: String,
}

impl RegistryCredential {
    pub fn new(
        registry_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            registry_url: registry_url.into(),
            username: username.into(),
            password: password.into(),
        }
    }

    /// Converts into Basic [`Credentials`].
    pub fn to_credentials(&self) -> Credentials {
        Credentials::basic(&self.username, &self.password)
    }
}

/// Registry credentials keyed by normalized registry host.
///
/// # Examples
///
/// ```
/// use libimgq::auth::{CredentialSet, Credentials, RegistryCredential};
///
/// let mut set = CredentialSet::new();
/// set.insert(RegistryCredential::new("https://index.docker.io/", "me", "secret"));
///
/// assert_eq!(set.lookup("docker.io"), Credentials::basic("me", "secret"));
/// assert_eq!(set.lookup("ghcr.io"), Credentials::Anonymous);
/// ```
#[derive(Debug, Clone, Default)]
pub struct CredentialSet {
    by_host: HashMap<String, RegistryCredential>,
}

impl CredentialSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a credential, replacing any existing one for the same host.
    pub fn insert(&mut self, credential: RegistryCredential) {
        let host = normalize_host(&credential.registry_url);
        self.by_host.insert(host, credential);
    }

    /// Returns the credential registered for `registry`, if any.
    pub fn get(&self, registry: &str) -> Option<&RegistryCredential> {
        self.by_host.get(&normalize_host(registry))
    }

    /// Returns the credentials to use for `registry`, anonymous if none is registered.
    pub fn lookup(&self, registry: &str) -> Credentials {
        self.get(registry)
            .map(RegistryCredential::to_credentials)
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.by_host.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_host.is_empty()
    }
}

impl FromIterator<RegistryCredential> for CredentialSet {
    fn from_iter<I: IntoIterator<Item = RegistryCredential>>(iter: I) -> Self {
        let mut set = Self::new();
        set.extend(iter);
        set
    }
}

impl Extend<RegistryCredential> for CredentialSet {
    fn extend<I: IntoIterator<Item = RegistryCredential>>(&mut self, iter: I) {
        for credential in iter {
            self.insert(credential);
        }
    }
}

impl IntoIterator for CredentialSet {
    type Item = RegistryCredential;
    type IntoIter = std::collections::hash_map::IntoValues<String, RegistryCredential>;

    fn into_iter(self) -> Self::IntoIter {
        self.by_host.into_values()
    }
}

/// Reduces a registry URL to a lowercase host key.
///
/// Strips the scheme, any path and trailing slashes, and folds the Docker Hub
/// aliases onto `docker.io`.
pub fn normalize_host(registry: &str) -> String {
    let without_scheme = registry
        .trim()
        .trim_start_matches("https://")
        .trim_start_matches("http://");
    let host = without_scheme
        .split('/')
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();

    match host.as_str() {
        "index.docker.io" | "registry-1.docker.io" | "registry.hub.docker.com" => {
            DOCKER_HUB_REGISTRY.to_string()
        }
        _ => host,
    }
}

/// Information parsed from a WWW-Authenticate header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthChallenge {
    /// The authentication scheme (e.g., "Bearer")
    pub scheme: String,

    /// The authentication realm
    pub realm: String,

    /// The service identifier
    pub service: Option<String>,

    /// The scope being requested
    pub scope: Option<String>,
}

impl AuthChallenge {
    /// Parses a WWW-Authenticate header value.
    ///
    /// Example header: `Bearer realm="https://auth.example.com/token",service="registry.example.com",scope="repository:alpine:pull"`
    ///
    /// # Examples
    ///
    /// ```
    /// use libimgq::auth::AuthChallenge;
    ///
    /// let header = r#"Bearer realm="https://auth.example.com/token",service="registry""#;
    /// let challenge = AuthChallenge::parse(header).unwrap();
    /// assert_eq!(challenge.scheme, "Bearer");
    /// ```
    pub fn parse(header: &str) -> Result<Self> {
        let header = header.trim();

        let (scheme, params) = header
            .split_once(' ')
            .ok_or_else(|| ImgqError::validation("Invalid WWW-Authenticate header format"))?;

        let mut realm = None;
        let mut service = None;
        let mut scope = None;

        for param in split_params(params) {
            if let Some((key, value)) = param.split_once('=') {
                let value = value.trim().trim_matches('"').to_string();
                match key.trim() {
                    "realm" => realm = Some(value),
                    "service" => service = Some(value),
                    "scope" => scope = Some(value),
                    _ => {}
                }
            }
        }

        let realm = realm.ok_or_else(|| {
            ImgqError::validation("WWW-Authenticate header missing required 'realm' parameter")
        })?;

        Ok(Self {
            scheme: scheme.to_string(),
            realm,
            service,
            scope,
        })
    }

    /// Returns true for the `Bearer` scheme (case-insensitive).
    pub fn is_bearer(&self) -> bool {
        self.scheme.eq_ignore_ascii_case("bearer")
    }
}

/// Splits challenge parameters on commas that are not inside quotes.
///
/// Scopes such as `repository:app:pull,push` contain commas.
fn split_params(params: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;

    for (i, c) in params.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                parts.push(params[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(params[start..].trim());

    parts.into_iter().filter(|p| !p.is_empty()).collect()
}
