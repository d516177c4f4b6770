//! Manifest resolvers.
//!
//! Each matching tag becomes one work unit. The unit fetches the tag's
//! manifest, classifies it and hands it to the resolver for its schema:
//!
//! - an index fans out one child unit per matching platform and relays the
//!   children's output into its own
//! - a single-platform image reads its config blob
//! - a schema 1 manifest reads its most recent history entry
//!
//! Every resolver produces [`ImageResult`]s whose timestamp is truncated to
//! whole seconds.

use crate::channel::{ChannelPair, Emitter, channel_pair, merge_pairs, relay, spawn_unit};
use crate::client::RegistryClient;
use crate::error::{ImgqError, Result};
use crate::manifest::{Descriptor, ImageConfigBlob, ImageIndex, ImageManifest, LegacyManifest, Manifest};
use crate::platform::{Platform, is_supported};
use crate::query::ImageResult;
use crate::reference::Repository;
use chrono::{DateTime, SubsecRound, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};


/// Shared, read-only state for every work unit of one query.
pub struct Resolver {
    client: Arc<dyn RegistryClient>,
    repository: Repository,
    platforms: Vec<Platform>,
    token: CancellationToken,
}

impl Resolver {
    pub fn new(
        client: Arc<dyn RegistryClient>,
        repository: Repository,
        platforms: Vec<Platform>,
        token: CancellationToken,
    ) -> Self {
        Self {
            client,
            repository,
            platforms,
            token,
        }
    }

    /// Spawns the work unit for `tag`.
    ///
    /// A single-platform or schema 1 tag emits one value or one error. An
    /// index tag emits one value per matching child, stopping at the first
    /// child error.
    pub fn spawn_tag(self: &Arc<Self>, tag: String) -> ChannelPair<ImageResult> {
        let (emitter, pair) = channel_pair();
        let resolver = Arc::clone(self);

        tokio::spawn(async move {
            let token = resolver.token.clone();
            tokio::select! {
                biased;
                _ = token.cancelled() => emitter.fail(ImgqError::Cancelled),
                _ = resolver.resolve_tag(&tag, emitter.clone()) => {}
            }
        });

        pair
    }

    async fn resolve_tag(self: &Arc<Self>, tag: &str, emitter: Emitter<ImageResult>) {
        let repository = self.repository.name();

        let fetched = match self.client.fetch_manifest(repository, tag).await {
            Ok(fetched) => fetched,
            Err(error) => return emitter.fail(error),
        };

        trace!(tag, media_type = %fetched.media_type, "Classifying manifest");

        match Manifest::decode(&fetched.media_type, &fetched.bytes) {
            Ok(Manifest::Index(index)) => self.resolve_index(tag, &index, emitter).await,
            Ok(Manifest::Image(image)) => emitter.emit(self.resolve_image(tag, &image).await),
            Ok(Manifest::LegacyV1(legacy)) => emitter.emit(self.resolve_legacy(tag, &legacy).await),
            Err(error) => emitter.fail(error),
        }
    }

    /// Returns true if an index child's platform is one the query asked for.
    ///
    /// A child without a platform is only accepted when no platform was
    /// requested.
    fn accepts(&self, descriptor: &Descriptor) -> bool {
        match descriptor.platform() {
            Some(platform) => is_supported(
                &self.platforms,
                &platform.os().to_string(),
                &platform.architecture().to_string(),
            ),
            None => self.platforms.is_empty(),
        }
    }

    async fn resolve_index(
        self: &Arc<Self>,
        tag: &str,
        index: &ImageIndex,
        emitter: Emitter<ImageResult>,
    ) {
        let children: Vec<String> = index
            .manifests()
            .iter()
            .filter(|descriptor| self.accepts(descriptor))
            .map(|descriptor| descriptor.digest().to_string())
            .collect();

        debug!(
            tag,
            children = children.len(),
            listed = index.manifests().len(),
            "Resolving index children"
        );

        let pairs = children
            .into_iter()
            .map(|digest| {
                let resolver = Arc::clone(self);
                let tag = tag.to_string();
                spawn_unit(&self.token, async move {
                    resolver.resolve_child(&tag, &digest).await
                })
            })
            .collect();

        relay(&emitter, merge_pairs(pairs)).await;
    }

    async fn resolve_child(&self, tag: &str, digest: &str) -> Result<ImageResult> {
        let fetched = self
            .client
            .fetch_manifest(self.repository.name(), digest)
            .await?;

        match Manifest::decode(&fetched.media_type, &fetched.bytes)? {
            Manifest::Image(image) => self.resolve_image(tag, &image).await,
            Manifest::Index(_) | Manifest::LegacyV1(_) => Err(ImgqError::unsupported_manifest(
                format!("{} as an index child", fetched.media_type),
            )),
        }
    }

    async fn resolve_image(&self, tag: &str, image: &ImageManifest) -> Result<ImageResult> {
        let repository = self.repository.name();
        let config_digest = image.config().digest().to_string();

        let (blob, digest) = tokio::try_join!(
            self.client.fetch_blob(repository, &config_digest),
            self.client.resolve_digest(repository, tag),
        )?;
        let config = ImageConfigBlob::from_slice(&blob)?;

        Ok(self.image_result(
            tag,
            &digest,
            config_digest,
            &config.os,
            &config.architecture,
            config.created,
            config.labels(),
        ))
    }

    async fn resolve_legacy(&self, tag: &str, legacy: &LegacyManifest) -> Result<ImageResult> {
        let layer = legacy.latest_layer()?;
        let digest = self
            .client
            .resolve_digest(self.repository.name(), tag)
            .await?;

        Ok(self.image_result(
            tag,
            &digest,
            layer.image_id().unwrap_or_default().to_string(),
            &layer.os,
            &layer.architecture,
            layer.created,
            layer.labels(),
        ))
    }

    #[allow(clippy::too_many_arguments)]
    fn image_result(
        &self,
        tag: &str,
        manifest_digest: &str,
        image_digest: String,
        os: &str,
        architecture: &str,
        created: DateTime<Utc>,
        labels: HashMap<String, String>,
    ) -> ImageResult {
        ImageResult {
            repository: self.repository.name().to_string(),
            registry: self.repository.registry().to_string(),
            tag: tag.to_string(),
            labels,
            tag_url: self.repository.tag_url(tag),
            digest_url: self.repository.digest_url(manifest_digest),
            image_digest,
            platform: format!("{os}/{architecture}"),
            build_timestamp: created.trunc_subsecs(0),
        }
    }
}
