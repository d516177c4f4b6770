//! Image queries.
//!
//! [`run_query`] is the engine's entry point. It lists the repository's tags,
//! keeps the ones the tag pattern selects, resolves every tag concurrently
//! and folds the outcome into a [`QueryOutcome`]:
//!
//! - on success, results are filtered by the required labels and sorted by
//!   build time (newest first), then by image digest (descending)
//! - on the first error, collection stops and the results gathered so far
//!   are returned as they arrived, unfiltered and unsorted, with the error

use crate::channel::{drain, merge_pairs};
use crate::client::RegistryClient;
use crate::error::{ImgqError, Result};
use crate::filter::{TagFilter, labels_match};
use crate::platform::Platform;
use crate::reference::Repository;
use crate::resolver::Resolver;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::str::FromStr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[cfg(test)]
mod tests;

/// What to look for in a repository.
///
/// # Examples
///
/// ```
/// use libimgq::query::ImageQuery;
///
/// let query = ImageQuery::new("ghcr.io/acme/api")
///     .tag_pattern(r"/^v\d+\.\d+$/")
///     .platform("linux/amd64")
///     .label("org.opencontainers.image.vendor", "acme");
///
/// assert_eq!(query.required_platforms.len(), 1);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageQuery {
    /// Repository coordinate, e.g. `ghcr.io/acme/api` or `alpine`.
    pub repository: String,
    /// Literal tag, or a regular expression wrapped in slashes.
    pub tag_pattern: String,
    pub required_labels: HashMap<String, String>,
    /// `os/arch` strings. Empty accepts every platform.
    pub required_platforms: BTreeSet<String>,
    /// Keep only the newest result after sorting.
    pub most_recent_only: bool,
}

impl ImageQuery {
    pub fn new(repository: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            ..Self::default()
        }
    }

    pub fn tag_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.tag_pattern = pattern.into();
        self
    }

    pub fn label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.required_labels.insert(key.into(), value.into());
        self
    }

    pub fn platform(mut self, platform: impl Into<String>) -> Self {
        self.required_platforms.insert(platform.into());
        self
    }

    pub fn most_recent_only(mut self, most_recent_only: bool) -> Self {
        self.most_recent_only = most_recent_only;
        self
    }

    /// Parses the repository coordinate.
    pub fn parse_repository(&self) -> Result<Repository> {
        Repository::from_str(&self.repository)
    }

    /// Parses the required platforms.
    ///
    /// # Errors
    ///
    /// Returns [`ImgqError::Configuration`] for an entry that is not `os/arch`.
    pub fn parse_platforms(&self) -> Result<Vec<Platform>> {
        self.required_platforms
            .iter()
            .map(|p| Platform::from_str(p))
            .collect()
    }
}

/// One resolved (tag, platform) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageResult {
    /// Repository path within the registry.
    pub repository: String,
    /// Registry host.
    pub registry: String,
    pub tag: String,
    /// Image labels, empty when the image has none.
    pub labels: HashMap<String, String>,
    /// `<registry>/<repository>:<tag>`
    pub tag_url: String,
    /// `<registry>/<repository>@<manifest digest>`
    pub digest_url: String,
    /// Config blob digest, or the image ID for schema 1 manifests.
    pub image_digest: String,
    /// `os/architecture`
    pub platform: String,
    /// Creation time, truncated to whole seconds.
    pub build_timestamp: DateTime<Utc>,
}

/// Results of a query, plus the error that stopped it early, if any.
///
/// When `error` is set, `results` holds what was collected before the error
/// in arrival order, without label filtering or sorting.
#[derive(Debug, Default)]
pub struct QueryOutcome {
    pub results: Vec<ImageResult>,
    pub error: Option<ImgqError>,
}

impl QueryOutcome {
    fn complete(results: Vec<ImageResult>) -> Self {
        Self {
            results,
            error: None,
        }
    }

    fn failed(error: ImgqError) -> Self {
        Self {
            results: Vec::new(),
            error: Some(error),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }

    /// Discards partial results on error.
    pub fn into_result(self) -> Result<Vec<ImageResult>> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.results),
        }
    }
}

struct Plan {
    repository: Repository,
    filter: TagFilter,
    platforms: Vec<Platform>,
}

fn plan(query: &ImageQuery) -> Result<Plan> {
    Ok(Plan {
        repository: query.parse_repository()?,
        filter: TagFilter::new(&query.tag_pattern)?,
        platforms: query.parse_platforms()?,
    })
}

/// Runs `query` against `client`.
///
/// The query is validated before any registry call. Work still in flight
/// when the function returns is cancelled.
pub async fn run_query(client: Arc<dyn RegistryClient>, query: &ImageQuery) -> QueryOutcome {
    let Plan {
        repository,
        filter,
        platforms,
    } = match plan(query) {
        Ok(plan) => plan,
        Err(error) => return QueryOutcome::failed(error),
    };

    let tags = match client.list_tags(repository.name()).await {
        Ok(tags) => tags,
        Err(error) => return QueryOutcome::failed(error),
    };

    let tags = filter.apply(&tags);
    if tags.is_empty() {
        debug!(repository = %repository, pattern = filter.pattern(), "No tags matched");
        return QueryOutcome::complete(Vec::new());
    }

    info!(repository = %repository, tags = tags.len(), "Resolving tags");

    let token = CancellationToken::new();
    let _cancel_on_exit = token.clone().drop_guard();
    let resolver = Arc::new(Resolver::new(client, repository, platforms, token));

    let pairs = tags.into_iter().map(|tag| resolver.spawn_tag(tag)).collect();
    let (mut results, error) = drain(merge_pairs(pairs)).await;

    if let Some(error) = error {
        warn!(collected = results.len(), %error, "Query stopped at first error");
        return QueryOutcome {
            results,
            error: Some(error),
        };
    }

    results.retain(|result| labels_match(&result.labels, &query.required_labels));
    sort_results(&mut results);

    if query.most_recent_only {
        results.truncate(1);
    }

    QueryOutcome::complete(results)
}

/// Orders results newest first, breaking ties by image digest descending.
///
/// The sort is stable.
pub fn sort_results(results: &mut [ImageResult]) {
    results.sort_by(|a, b| {
        b.build_timestamp
            .cmp(&a.build_timestamp)
            .then_with(|| b.image_digest.cmp(&a.image_digest))
    });
}

/// Runs `query` to completion on a private current-thread runtime.
///
/// Must not be called from within an async context.
pub fn run_query_blocking(client: Arc<dyn RegistryClient>, query: &ImageQuery) -> QueryOutcome {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            return QueryOutcome::failed(ImgqError::configuration_with_source(
                "Failed to start async runtime",
                e,
            ));
        }
    };

    runtime.block_on(run_query(client, query))
}
