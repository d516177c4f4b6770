//! In-memory registry used by the engine tests.

use crate::client::{FetchedManifest, RegistryClient};
use crate::digest::sha256_digest_of;
use crate::error::{ImgqError, Result};
use crate::manifest::{DOCKER_MANIFEST_V1_SIGNED, DOCKER_MANIFEST_V2, OCI_IMAGE_INDEX, OCI_IMAGE_MANIFEST};
use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

type FailureFn = Arc<dyn Fn() -> ImgqError + Send + Sync>;

/// Image metadata used to build canned manifests and config blobs.
#[derive(Debug, Clone)]
pub struct FakeImage {
    pub os: String,
    pub architecture: String,
    pub created: String,
    pub labels: Vec<(String, String)>,
}

pub fn image(os: &str, architecture: &str, created: &str) -> FakeImage {
    FakeImage {
        os: os.to_string(),
        architecture: architecture.to_string(),
        created: created.to_string(),
        labels: Vec::new(),
    }
}

impl FakeImage {
    pub fn label(mut self, key: &str, value: &str) -> Self {
        self.labels.push((key.to_string(), value.to_string()));
        self
    }

    fn labels_json(&self) -> serde_json::Value {
        self.labels
            .iter()
            .map(|(k, v)| (k.clone(), json!(v)))
            .collect::<serde_json::Map<_, _>>()
            .into()
    }
}

#[derive(Default)]
pub struct FakeRegistry {
    tags: Vec<String>,
    tags_failure: Option<FailureFn>,
    manifests: HashMap<String, (String, Vec<u8>)>,
    blobs: HashMap<String, Vec<u8>>,
    failures: HashMap<String, FailureFn>,
    digest_failures: HashMap<String, FailureFn>,
    delays: HashMap<String, Duration>,
    manifest_fetches: AtomicUsize,
}

impl FakeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_client(self) -> Arc<dyn RegistryClient> {
        Arc::new(self)
    }

    fn add_tag(&mut self, tag: &str) {
        if !self.tags.iter().any(|t| t == tag) {
            self.tags.push(tag.to_string());
        }
    }

    /// Lists `tag` without serving anything for it.
    pub fn with_tag(&mut self, tag: &str) -> &mut Self {
        self.add_tag(tag);
        self
    }

    /// Stores a config blob plus a single-platform manifest under `reference`
    /// and returns the config blob digest.
    fn store_image(&mut self, reference: &str, image: &FakeImage) -> String {
        let config = json!({
            "os": image.os,
            "architecture": image.architecture,
            "created": image.created,
            "config": { "Labels": image.labels_json() },
        });
        let config_bytes = serde_json::to_vec(&config).unwrap();
        let config_digest = sha256_digest_of(&config_bytes);

        let manifest = json!({
            "schemaVersion": 2,
            "mediaType": DOCKER_MANIFEST_V2,
            "config": {
                "mediaType": "application/vnd.docker.container.image.v1+json",
                "digest": config_digest,
                "size": config_bytes.len(),
            },
            "layers": [],
        });

        self.blobs.insert(config_digest.clone(), config_bytes);
        self.manifests.insert(
            reference.to_string(),
            (
                DOCKER_MANIFEST_V2.to_string(),
                serde_json::to_vec(&manifest).unwrap(),
            ),
        );

        config_digest
    }

    /// Serves a single-platform image for `tag`. Returns its config digest.
    pub fn with_image(&mut self, tag: &str, image: FakeImage) -> String {
        self.add_tag(tag);
        self.store_image(tag, &image)
    }

    /// Serves an index for `tag` with one child per image. Returns the child
    /// config digests in order.
    pub fn with_index(&mut self, tag: &str, children: Vec<FakeImage>) -> Vec<String> {
        self.add_tag(tag);

        let mut descriptors = Vec::new();
        let mut config_digests = Vec::new();

        for (i, child) in children.iter().enumerate() {
            let placeholder = format!("{tag}#child{i}");
            config_digests.push(self.store_image(&placeholder, child));

            let (media_type, bytes) = self.manifests.remove(&placeholder).unwrap();
            let child_digest = sha256_digest_of(&bytes);

            descriptors.push(json!({
                "mediaType": OCI_IMAGE_MANIFEST,
                "digest": child_digest,
                "size": bytes.len(),
                "platform": { "os": child.os, "architecture": child.architecture },
            }));
            self.manifests.insert(child_digest, (media_type, bytes));
        }

        let index = json!({
            "schemaVersion": 2,
            "mediaType": OCI_IMAGE_INDEX,
            "manifests": descriptors,
        });
        self.manifests.insert(
            tag.to_string(),
            (
                OCI_IMAGE_INDEX.to_string(),
                serde_json::to_vec(&index).unwrap(),
            ),
        );

        config_digests
    }

    /// Serves a schema 1 manifest for `tag`.
    pub fn with_legacy(&mut self, tag: &str, image: FakeImage, image_id: &str) {
        self.add_tag(tag);

        let layer = json!({
            "id": "layer",
            "os": image.os,
            "architecture": image.architecture,
            "created": image.created,
            "container_config": { "Image": image_id },
            "config": { "Labels": image.labels_json() },
        });
        let manifest = json!({
            "schemaVersion": 1,
            "name": "fake",
            "tag": tag,
            "history": [
                { "v1Compatibility": layer.to_string() },
                { "v1Compatibility": "{\"id\":\"older\"}" },
            ],
            "signatures": [],
        });

        self.manifests.insert(
            tag.to_string(),
            (
                DOCKER_MANIFEST_V1_SIGNED.to_string(),
                serde_json::to_vec(&manifest).unwrap(),
            ),
        );
    }

    /// Serves an OCI manifest for `tag` whose config blob is `config`
    /// verbatim. Returns the config digest.
    pub fn with_artifact(&mut self, tag: &str, config: &[u8]) -> String {
        let config_digest = sha256_digest_of(config);
        let manifest = json!({
            "schemaVersion": 2,
            "mediaType": OCI_IMAGE_MANIFEST,
            "config": {
                "mediaType": "application/vnd.cncf.helm.config.v1+json",
                "digest": config_digest,
                "size": config.len(),
            },
            "layers": [],
        });

        self.blobs.insert(config_digest.clone(), config.to_vec());
        self.with_raw_manifest(
            tag,
            OCI_IMAGE_MANIFEST,
            &serde_json::to_vec(&manifest).unwrap(),
        );

        config_digest
    }

    /// Serves arbitrary bytes for `reference`.
    pub fn with_raw_manifest(&mut self, reference: &str, media_type: &str, bytes: &[u8]) {
        self.add_tag(reference);
        self.manifests
            .insert(reference.to_string(), (media_type.to_string(), bytes.to_vec()));
    }

    /// Makes manifest and blob lookups of `key` fail.
    pub fn fail<F>(&mut self, key: &str, failure: F) -> &mut Self
    where
        F: Fn() -> ImgqError + Send + Sync + 'static,
    {
        self.failures.insert(key.to_string(), Arc::new(failure));
        self
    }

    /// Makes digest resolution of `reference` fail.
    pub fn fail_digest<F>(&mut self, reference: &str, failure: F) -> &mut Self
    where
        F: Fn() -> ImgqError + Send + Sync + 'static,
    {
        self.digest_failures
            .insert(reference.to_string(), Arc::new(failure));
        self
    }

    /// Makes tag listing fail.
    pub fn fail_tags<F>(&mut self, failure: F) -> &mut Self
    where
        F: Fn() -> ImgqError + Send + Sync + 'static,
    {
        self.tags_failure = Some(Arc::new(failure));
        self
    }

    /// Delays manifest fetches of `reference`.
    pub fn delay(&mut self, reference: &str, delay: Duration) -> &mut Self {
        self.delays.insert(reference.to_string(), delay);
        self
    }

    pub fn manifest_fetches(&self) -> usize {
        self.manifest_fetches.load(Ordering::SeqCst)
    }

    fn check_failure(&self, key: &str) -> Result<()> {
        match self.failures.get(key) {
            Some(failure) => Err(failure()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RegistryClient for FakeRegistry {
    async fn list_tags(&self, _repository: &str) -> Result<Vec<String>> {
        if let Some(failure) = &self.tags_failure {
            return Err(failure());
        }
        Ok(self.tags.clone())
    }

    async fn fetch_manifest(&self, _repository: &str, reference: &str) -> Result<FetchedManifest> {
        self.manifest_fetches.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delays.get(reference) {
            tokio::time::sleep(*delay).await;
        }
        self.check_failure(reference)?;

        let (media_type, bytes) = self
            .manifests
            .get(reference)
            .cloned()
            .ok_or_else(|| ImgqError::not_found("Manifest", reference))?;

        Ok(FetchedManifest {
            media_type,
            digest: sha256_digest_of(&bytes),
            bytes,
        })
    }

    async fn fetch_blob(&self, _repository: &str, digest: &str) -> Result<Vec<u8>> {
        self.check_failure(digest)?;
        self.blobs
            .get(digest)
            .cloned()
            .ok_or_else(|| ImgqError::not_found("Blob", digest))
    }

    async fn resolve_digest(&self, _repository: &str, reference: &str) -> Result<String> {
        if let Some(failure) = self.digest_failures.get(reference) {
            return Err(failure());
        }
        self.manifests
            .get(reference)
            .map(|(_, bytes)| sha256_digest_of(bytes))
            .ok_or_else(|| ImgqError::not_found("Manifest", reference))
    }
}
