//! High-level API.
//!
//! [`Imgq`] turns registry configuration into a [`RegistryClient`] per
//! repository and runs queries through [`run_query`].
//!
//! # Examples
//!
//! ```no_run
//! use libimgq::{ImageQuery, Imgq};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let imgq = Imgq::builder().build()?;
//!
//!     let query = ImageQuery::new("ghcr.io/acme/api")
//!         .tag_pattern(r"/^v\d+/")
//!         .platform("linux/amd64");
//!
//!     for image in imgq.query(&query).await.into_result()? {
//!         println!("{} {} {}", image.tag, image.platform, image.digest_url);
//!     }
//!     Ok(())
//! }
//! ```

use crate::auth::{CredentialSet, RegistryCredential};
use crate::client::{Client, ClientConfig, RegistryClient};
use crate::config::Config;
use crate::error::Result;
use crate::filter::TagFilter;
use crate::query::{ImageQuery, QueryOutcome, run_query};
use crate::reference::Repository;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;


/// Entry point for querying registries.
pub struct Imgq {
    client_config: ClientConfig,
    credentials: CredentialSet,
    registry_url: Option<String>,
    client: Option<Arc<dyn RegistryClient>>,
}

impl Imgq {
    /// Creates an instance that sends every request to `registry_url`,
    /// whatever host the queried repository names.
    ///
    /// # Examples
    ///
    /// ```
    /// use libimgq::Imgq;
    ///
    /// let imgq = Imgq::connect("http://localhost:5000").unwrap();
    /// ```
    pub fn connect(registry_url: &str) -> Result<Self> {
        Self::builder().registry_url(registry_url).build()
    }

    pub fn builder() -> ImgqBuilder {
        ImgqBuilder::new()
    }

    /// Returns the client serving `repository`.
    ///
    /// Credentials are looked up by the repository's registry host.
    fn client_for(&self, repository: &Repository) -> Result<Arc<dyn RegistryClient>> {
        if let Some(client) = &self.client {
            return Ok(Arc::clone(client));
        }

        let url = self
            .registry_url
            .as_deref()
            .unwrap_or_else(|| repository.registry());
        let credentials = self.credentials.lookup(repository.registry());

        debug!(url, repository = %repository, "Creating registry client");
        let client =
            Client::with_config(url, self.client_config.clone())?.with_credentials(credentials);
        Ok(Arc::new(client))
    }

    /// Runs `query`.
    pub async fn query(&self, query: &ImageQuery) -> QueryOutcome {
        let client = match query
            .parse_repository()
            .and_then(|repository| self.client_for(&repository))
        {
            Ok(client) => client,
            Err(error) => {
                return QueryOutcome {
                    results: Vec::new(),
                    error: Some(error),
                };
            }
        };

        run_query(client, query).await
    }

    /// Lists the tags of `repository` selected by `pattern`, in registry order.
    pub async fn list_tags(&self, repository: &str, pattern: &str) -> Result<Vec<String>> {
        let filter = TagFilter::new(pattern)?;
        let repository = Repository::from_str(repository)?;
        let client = self.client_for(&repository)?;

        let tags = client.list_tags(repository.name()).await?;
        Ok(filter.apply(&tags))
    }
}

/// Builder for [`Imgq`].
#[derive(Default)]
pub struct ImgqBuilder {
    registry_url: Option<String>,
    config: Option<Config>,
    credentials: CredentialSet,
    client: Option<Arc<dyn RegistryClient>>,
}

impl ImgqBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sends every request to `url` instead of the repository's host.
    pub fn registry_url(mut self, url: &str) -> Self {
        self.registry_url = Some(url.to_string());
        self
    }

    /// Uses the network settings and registry credentials of `config`.
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    /// Adds credentials. They take precedence over those from the config.
    pub fn with_credentials(mut self, credentials: CredentialSet) -> Self {
        self.credentials.extend(credentials);
        self
    }

    /// Adds one registry credential.
    pub fn with_credential(mut self, credential: RegistryCredential) -> Self {
        self.credentials.insert(credential);
        self
    }

    /// Serves every repository from `client`.
    pub fn with_client(mut self, client: Arc<dyn RegistryClient>) -> Self {
        self.client = Some(client);
        self
    }

    pub fn build(self) -> Result<Imgq> {
        let config = self.config.unwrap_or_default();

        let mut credentials = config.credentials()?;
        credentials.extend(self.credentials);

        Ok(Imgq {
            client_config: config.client_config(),
            credentials,
            registry_url: self.registry_url,
            client: self.client,
        })
    }
}
