//! HTTP client for OCI registry communication.
//!
//! [`RegistryClient`] is the capability the resolution engine consumes:
//! list tags, fetch manifests and blobs, resolve digests. [`Client`] is the
//! reqwest-backed implementation speaking the OCI Distribution v2 API.

use crate::auth::{AuthChallenge, Credentials};
use crate::digest::{Digest, sha256_digest_of};
use crate::error::{ImgqError, Result};
use crate::manifest::{ACCEPTED_MEDIA_TYPES, ManifestKind, sniff_media_type};
use async_trait::async_trait;
use flate2::read::GzDecoder;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, RETRY_AFTER, WWW_AUTHENTICATE};
use reqwest::{Client as ReqwestClient, Method, RequestBuilder, Response, StatusCode, Url};
use serde::Deserialize;
use std::collections::HashMap;
use std::io::Read;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, trace};


const DOCKER_CONTENT_DIGEST: &str = "Docker-Content-Digest";
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// A manifest as served by the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedManifest {
    pub media_type: String,
    pub bytes: Vec<u8>,
    pub digest: String,
}

/// Registry operations the resolution engine depends on.
///
/// `repository` is the repository path within the registry (for example
/// `library/alpine`). `reference` is a tag or a digest.
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Lists every tag in the repository.
    async fn list_tags(&self, repository: &str) -> Result<Vec<String>>;

    /// Fetches a manifest together with its media type and digest.
    async fn fetch_manifest(&self, repository: &str, reference: &str) -> Result<FetchedManifest>;

    /// Fetches a blob, verified against `digest` and decompressed if gzipped.
    async fn fetch_blob(&self, repository: &str, digest: &str) -> Result<Vec<u8>>;

    /// Resolves a reference to the content digest of its manifest.
    async fn resolve_digest(&self, repository: &str, reference: &str) -> Result<String>;
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    name: String,
    #[serde(default)]
    tags: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
}

/// Configuration for the HTTP client.
///
/// # Examples
///
/// ```
/// use libimgq::client::ClientConfig;
///
/// let config = ClientConfig::new()
///     .with_timeout(60)
///     .with_max_idle_per_host(20);
/// assert_eq!(config.timeout_seconds, 60);
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Request timeout in seconds (default: 30)
    pub timeout_seconds: u64,
    /// Maximum idle connections per host (default: 10)
    pub max_idle_per_host: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            max_idle_per_host: 10,
        }
    }
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    pub fn with_max_idle_per_host(mut self, max: usize) -> Self {
        self.max_idle_per_host = max;
        self
    }
}

/// HTTP client for one OCI registry.
///
/// Cloning is cheap; clones share the connection pool and the bearer token
/// cache.
#[derive(Debug, Clone)]
pub struct Client {
    http_client: ReqwestClient,
    registry_url: String,
    timeout_seconds: u64,
    credentials: Credentials,
    tokens: Arc<RwLock<HashMap<String, String>>>,
}

impl Client {
    /// Creates an anonymous client with default configuration.
    ///
    /// # Examples
    ///
    /// ```
    /// use libimgq::client::Client;
    ///
    /// let client = Client::new("localhost:5000").unwrap();
    /// assert_eq!(client.registry_url(), "http://localhost:5000");
    /// ```
    pub fn new(registry_url: &str) -> Result<Self> {
        Self::with_config(registry_url, ClientConfig::default())
    }

    /// Creates an anonymous client with custom configuration.
    pub fn with_config(registry_url: &str, config: ClientConfig) -> Result<Self> {
        let registry_url = Self::normalize_url(registry_url)?;

        let http_client = ReqwestClient::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .pool_max_idle_per_host(config.max_idle_per_host)
            .build()
            .map_err(|e| ImgqError::network_with_source("Failed to create HTTP client", e))?;

        Ok(Self {
            http_client,
            registry_url,
            timeout_seconds: config.timeout_seconds,
            credentials: Credentials::Anonymous,
            tokens: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    /// Sets the credentials sent to this registry and to its token service.
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn registry_url(&self) -> &str {
        &self.registry_url
    }

    /// Normalizes a registry URL.
    ///
    /// A missing scheme becomes `http://` for loopback hosts and `https://`
    /// otherwise. Docker Hub's canonical name is mapped to its API host.
    fn normalize_url(url: &str) -> Result<String> {
        let url = url.trim().trim_end_matches('/');

        if url.is_empty() {
            return Err(ImgqError::validation("Registry URL cannot be empty"));
        }

        if url.starts_with("http://") || url.starts_with("https://") {
            return Ok(url.to_string());
        }

        let host = url.split('/').next().unwrap_or(url);
        let host_name = host.split(':').next().unwrap_or(host);

        let url = match host {
            "docker.io" | "index.docker.io" => "https://registry-1.docker.io".to_string(),
            _ if host_name == "localhost" || host_name == "127.0.0.1" => format!("http://{url}"),
            _ => format!("https://{url}"),
        };

        Ok(url)
    }

    fn pull_scope(repository: &str) -> String {
        format!("repository:{repository}:pull")
    }

    /// Returns the Authorization header value for `scope`, preferring a cached
    /// bearer token over the configured credentials.
    async fn authorization(&self, scope: &str) -> Option<String> {
        if let Some(token) = self.tokens.read().await.get(scope) {
            return Some(format!("Bearer {token}"));
        }
        self.credentials.to_header_value()
    }

    fn request(
        &self,
        method: &Method,
        url: &str,
        accept: Option<&str>,
        authorization: Option<&str>,
    ) -> RequestBuilder {
        let mut request = self.http_client.request(method.clone(), url);
        if let Some(accept) = accept {
            request = request.header(ACCEPT, accept);
        }
        if let Some(authorization) = authorization {
            request = request.header(AUTHORIZATION, authorization);
        }
        request
    }

    /// Sends a request, answering one bearer challenge if the registry
    /// issues one, and translates error statuses.
    async fn send(
        &self,
        method: Method,
        url: &str,
        accept: Option<&str>,
        scope: &str,
    ) -> Result<Response> {
        trace!(%method, url, "Sending registry request");

        let authorization = self.authorization(scope).await;
        let response = self
            .request(&method, url, accept, authorization.as_deref())
            .send()
            .await
            .map_err(|e| self.translate_reqwest_error(e))?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return Self::check_response_status(response).await;
        }

        let challenge = response
            .headers()
            .get(WWW_AUTHENTICATE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| AuthChallenge::parse(v).ok())
            .filter(AuthChallenge::is_bearer);

        let Some(challenge) = challenge else {
            return Self::check_response_status(response).await;
        };

        let token = self.fetch_token(&challenge, scope).await?;
        let authorization = format!("Bearer {token}");

        let response = self
            .request(&method, url, accept, Some(&authorization))
            .send()
            .await
            .map_err(|e| self.translate_reqwest_error(e))?;

        Self::check_response_status(response).await
    }

    /// Exchanges the configured credentials for a bearer token at the
    /// challenge's realm and caches it under `scope`.
    async fn fetch_token(&self, challenge: &AuthChallenge, scope: &str) -> Result<String> {
        let mut params = Vec::new();
        if let Some(service) = &challenge.service {
            params.push(("service", service.as_str()));
        }
        params.push(("scope", challenge.scope.as_deref().unwrap_or(scope)));

        let url = Url::parse_with_params(&challenge.realm, &params).map_err(|e| {
            ImgqError::validation_with_source(
                format!("Invalid token realm '{}'", challenge.realm),
                e,
            )
        })?;

        debug!(realm = %challenge.realm, scope, "Requesting bearer token");

        let mut request = self.http_client.get(url);
        if let Credentials::Basic { .. } = &self.credentials
            && let Some(authorization) = self.credentials.to_header_value()
        {
            request = request.header(AUTHORIZATION, authorization);
        }

        let response = request
            .send()
            .await
            .map_err(|e| self.translate_reqwest_error(e))?;
        let response = Self::check_response_status(response).await?;

        let body: TokenResponse = response.json().await.map_err(|e| {
            ImgqError::authentication(format!("Failed to parse token response: {e}"), None)
        })?;

        let token = body
            .token
            .or(body.access_token)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ImgqError::authentication("Token response carried no token", None))?;

        self.tokens
            .write()
            .await
            .insert(scope.to_string(), token.clone());

        Ok(token)
    }

    /// Extracts the next page URL from the Link header.
    ///
    /// Format: `</v2/alpine/tags/list?n=100&last=3.19>; rel="next"`
    fn extract_next_link(headers: &HeaderMap) -> Option<String> {
        let link = headers.get(reqwest::header::LINK)?.to_str().ok()?;

        link.split(',')
            .map(str::trim)
            .filter(|part| part.contains("rel=\"next\"") || part.contains("rel='next'"))
            .find_map(|part| {
                let start = part.find('<')?;
                let end = part.find('>')?;
                (start < end).then(|| part[start + 1..end].to_string())
            })
    }

    fn next_page_url(&self, link: &str) -> String {
        if link.starts_with("http://") || link.starts_with("https://") {
            link.to_string()
        } else {
            format!("{}{}", self.registry_url, link)
        }
    }

    fn accept_manifests() -> String {
        ACCEPTED_MEDIA_TYPES.join(", ")
    }

    /// Determines the manifest media type from the response header, falling
    /// back to the body when the header is absent or not a manifest type.
    fn manifest_media_type(content_type: Option<&str>, bytes: &[u8]) -> Result<String> {
        if let Some(content_type) = content_type
            && ManifestKind::classify(content_type).is_supported()
        {
            return Ok(content_type.to_string());
        }

        sniff_media_type(bytes)
            .or_else(|| content_type.map(str::to_string))
            .ok_or_else(|| ImgqError::decode("Unable to determine manifest media type"))
    }

    fn header_digest(headers: &HeaderMap) -> Option<String> {
        headers
            .get(DOCKER_CONTENT_DIGEST)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    fn translate_reqwest_error(&self, error: reqwest::Error) -> ImgqError {
        let registry_url = &self.registry_url;
        if error.is_timeout() {
            ImgqError::network_with_source(
                format!(
                    "Request to {registry_url} timed out after {} seconds",
                    self.timeout_seconds
                ),
                error,
            )
        } else if error.is_connect() {
            ImgqError::network_with_source(
                format!("Failed to connect to registry at {registry_url}"),
                error,
            )
        } else {
            ImgqError::network_with_source(
                format!("Network error communicating with {registry_url}"),
                error,
            )
        }
    }

    /// Checks the HTTP response status and translates errors to ImgqError.
    async fn check_response_status(response: Response) -> Result<Response> {
        let status = response.status();

        if status.is_success() {
            return Ok(response);
        }

        let url = response.url().to_string();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        let error_body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("(unable to read response body)"));

        let error = match status {
            StatusCode::UNAUTHORIZED => ImgqError::authentication(
                format!("Authentication required for {url}: {error_body}"),
                Some(401),
            ),
            StatusCode::FORBIDDEN => ImgqError::authentication(
                format!("Access forbidden for {url}: {error_body}"),
                Some(403),
            ),
            StatusCode::NOT_FOUND => ImgqError::not_found("Resource", url),
            StatusCode::TOO_MANY_REQUESTS => {
                ImgqError::rate_limit(format!("Rate limit exceeded for {url}"), retry_after)
            }
            s if s.is_server_error() => ImgqError::server(
                format!("Server error from {url}: {error_body}"),
                s.as_u16(),
            ),
            s => ImgqError::network(format!("HTTP {} from {url}: {error_body}", s.as_u16())),
        };

        Err(error)
    }
}

#[async_trait]
impl RegistryClient for Client {
    async fn list_tags(&self, repository: &str) -> Result<Vec<String>> {
        let scope = Self::pull_scope(repository);
        let mut url = format!("{}/v2/{}/tags/list", self.registry_url, repository);
        let mut all_tags = Vec::new();

        loop {
            debug!(%url, "Listing tags");
            let response = self.send(Method::GET, &url, None, &scope).await?;
            let next = Self::extract_next_link(response.headers());

            let page: TagsResponse = response.json().await.map_err(|e| {
                ImgqError::decode_with_source("Failed to parse tags response", e)
            })?;

            if page.name != repository {
                return Err(ImgqError::validation(format!(
                    "Registry returned tags for '{}' but expected '{}'",
                    page.name, repository
                )));
            }

            all_tags.extend(page.tags.unwrap_or_default());

            match next {
                Some(link) => url = self.next_page_url(&link),
                None => break,
            }
        }

        debug!(repository, tags = all_tags.len(), "Listed tags");
        Ok(all_tags)
    }

    async fn fetch_manifest(&self, repository: &str, reference: &str) -> Result<FetchedManifest> {
        let url = format!(
            "{}/v2/{}/manifests/{}",
            self.registry_url, repository, reference
        );
        let accept = Self::accept_manifests();

        debug!(repository, reference, "Fetching manifest");
        let response = self
            .send(Method::GET, &url, Some(&accept), &Self::pull_scope(repository))
            .await?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let header_digest = Self::header_digest(response.headers());

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ImgqError::network_with_source("Failed to read manifest response", e))?
            .to_vec();

        let media_type = Self::manifest_media_type(content_type.as_deref(), &bytes)?;
        let digest = header_digest.unwrap_or_else(|| sha256_digest_of(&bytes));

        Ok(FetchedManifest {
            media_type,
            bytes,
            digest,
        })
    }

    async fn fetch_blob(&self, repository: &str, digest: &str) -> Result<Vec<u8>> {
        let expected = Digest::from_str(digest)?;
        let url = format!("{}/v2/{}/blobs/{}", self.registry_url, repository, digest);

        debug!(repository, digest, "Fetching blob");
        let response = self
            .send(Method::GET, &url, None, &Self::pull_scope(repository))
            .await?;

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ImgqError::network_with_source("Failed to read blob response", e))?;

        expected.verify(&bytes)?;

        decompress(&bytes)
    }

    async fn resolve_digest(&self, repository: &str, reference: &str) -> Result<String> {
        let url = format!(
            "{}/v2/{}/manifests/{}",
            self.registry_url, repository, reference
        );
        let accept = Self::accept_manifests();

        debug!(repository, reference, "Resolving digest");
        let response = self
            .send(Method::HEAD, &url, Some(&accept), &Self::pull_scope(repository))
            .await?;

        if let Some(digest) = Self::header_digest(response.headers()) {
            return Ok(digest);
        }

        trace!(repository, reference, "HEAD carried no digest, hashing manifest body");
        Ok(self.fetch_manifest(repository, reference).await?.digest)
    }
}

/// Gunzips `bytes` when they carry the gzip magic number.
pub fn decompress(bytes: &[u8]) -> Result<Vec<u8>> {
    if !bytes.starts_with(&GZIP_MAGIC) {
        return Ok(bytes.to_vec());
    }

    let mut decoded = Vec::new();
    GzDecoder::new(bytes)
        .read_to_end(&mut decoded)
        .map_err(|e| ImgqError::decode_with_source("Failed to decompress blob", e))?;
    Ok(decoded)
}
