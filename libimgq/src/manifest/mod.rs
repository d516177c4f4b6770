//! Manifest classification and typed manifest records.
//!
//! A registry may answer a tag lookup with one of three historically
//! distinct schemas. [`ManifestKind::classify`] routes a declared media type
//! to one of them, and [`Manifest::decode`] parses the body into the matching
//! concrete record, rejecting anything else up front.

use crate::error::{ImgqError, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;

pub use oci_spec::image::{Descriptor, ImageIndex, ImageManifest};


pub const OCI_IMAGE_INDEX: &str = "application/vnd.oci.image.index.v1+json";
pub const OCI_IMAGE_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";
pub const DOCKER_MANIFEST_LIST: &str = "application/vnd.docker.distribution.manifest.list.v2+json";
pub const DOCKER_MANIFEST_V2: &str = "application/vnd.docker.distribution.manifest.v2+json";
pub const DOCKER_MANIFEST_V1: &str = "application/vnd.docker.distribution.manifest.v1+json";
pub const DOCKER_MANIFEST_V1_SIGNED: &str =
    "application/vnd.docker.distribution.manifest.v1+prettyjws";

/// Every manifest media type the engine asks registries for, in preference order.
pub const ACCEPTED_MEDIA_TYPES: [&str; 6] = [
    OCI_IMAGE_INDEX,
    DOCKER_MANIFEST_LIST,
    OCI_IMAGE_MANIFEST,
    DOCKER_MANIFEST_V2,
    DOCKER_MANIFEST_V1_SIGNED,
    DOCKER_MANIFEST_V1,
];

/// The resolution strategy a manifest media type calls for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestKind {
    /// Image index or manifest list: one descriptor per platform.
    Index,
    /// A single OCI or Docker v2 image manifest referencing one config blob.
    SinglePlatformImage,
    /// Docker Registry schema 1, signed or unsigned.
    LegacyV1,
    /// Anything else; carries the media type as served.
    Unsupported(String),
}

impl ManifestKind {
    /// Classifies a declared media type.
    ///
    /// Parameters such as `; charset=utf-8` and letter case are ignored.
    ///
    /// # Examples
    ///
    /// ```
    /// use libimgq::manifest::ManifestKind;
    ///
    /// assert_eq!(
    ///     ManifestKind::classify("application/vnd.oci.image.index.v1+json"),
    ///     ManifestKind::Index
    /// );
    /// assert!(matches!(
    ///     ManifestKind::classify("text/html"),
    ///     ManifestKind::Unsupported(_)
    /// ));
    /// ```
    pub fn classify(media_type: &str) -> Self {
        let essence = media_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        match essence.as_str() {
            OCI_IMAGE_INDEX | DOCKER_MANIFEST_LIST => Self::Index,
            OCI_IMAGE_MANIFEST | DOCKER_MANIFEST_V2 => Self::SinglePlatformImage,
            DOCKER_MANIFEST_V1 | DOCKER_MANIFEST_V1_SIGNED => Self::LegacyV1,
            _ => Self::Unsupported(media_type.to_string()),
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, Self::Unsupported(_))
    }
}

/// Infers a media type from a manifest body when the registry's
/// `Content-Type` is missing or generic.
///
/// Looks at `mediaType` first, then at the schema version and the shape of
/// the document.
pub fn sniff_media_type(bytes: &[u8]) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(bytes).ok()?;

    if let Some(media_type) = value.get("mediaType").and_then(|v| v.as_str()) {
        return Some(media_type.to_string());
    }

    if value.get("schemaVersion").and_then(|v| v.as_i64()) == Some(1) {
        let signed = value.get("signatures").is_some();
        return Some(
            if signed {
                DOCKER_MANIFEST_V1_SIGNED
            } else {
                DOCKER_MANIFEST_V1
            }
            .to_string(),
        );
    }

    if value.get("manifests").is_some() {
        Some(OCI_IMAGE_INDEX.to_string())
    } else if value.get("config").is_some() || value.get("layers").is_some() {
        Some(OCI_IMAGE_MANIFEST.to_string())
    } else {
        None
    }
}

/// A manifest body decoded into the record shape its media type calls for.
#[derive(Debug, Clone)]
#[allow(clippy::large_enum_variant)]
pub enum Manifest {
    Index(ImageIndex),
    Image(ImageManifest),
    LegacyV1(LegacyManifest),
}

impl Manifest {
    /// Decodes `bytes` according to `media_type`.
    ///
    /// Unsupported media types fail with [`ImgqError::UnsupportedManifest`]
    /// and malformed bodies with [`ImgqError::Decode`].
    pub fn decode(media_type: &str, bytes: &[u8]) -> Result<Self> {
        match ManifestKind::classify(media_type) {
            ManifestKind::Index => serde_json::from_slice(bytes)
                .map(Manifest::Index)
                .map_err(|e| ImgqError::decode_with_source("Failed to parse image index", e)),
            ManifestKind::SinglePlatformImage => serde_json::from_slice(bytes)
                .map(Manifest::Image)
                .map_err(|e| ImgqError::decode_with_source("Failed to parse image manifest", e)),
            ManifestKind::LegacyV1 => serde_json::from_slice(bytes)
                .map(Manifest::LegacyV1)
                .map_err(|e| {
                    ImgqError::decode_with_source("Failed to parse schema 1 manifest", e)
                }),
            ManifestKind::Unsupported(media_type) => {
                Err(ImgqError::unsupported_manifest(media_type))
            }
        }
    }

    pub fn kind(&self) -> ManifestKind {
        match self {
            Manifest::Index(_) => ManifestKind::Index,
            Manifest::Image(_) => ManifestKind::SinglePlatformImage,
            Manifest::LegacyV1(_) => ManifestKind::LegacyV1,
        }
    }
}

/// Docker Registry schema 1 manifest envelope.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyManifest {
    pub schema_version: u32,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub tag: String,
    #[serde(default)]
    pub history: Vec<LegacyHistory>,
}

/// One `history` entry: a JSON document serialized into a string.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyHistory {
    pub v1_compatibility: String,
}

impl LegacyManifest {
    /// Decodes the first history entry, which describes the most recently
    /// committed layer and carries the image's platform, labels and creation
    /// time.
    pub fn latest_layer(&self) -> Result<LegacyLayerConfig> {
        let first = self
            .history
            .first()
            .ok_or_else(|| ImgqError::decode("Schema 1 manifest has an empty history"))?;

        serde_json::from_str(&first.v1_compatibility)
            .map_err(|e| ImgqError::decode_with_source("Failed to parse schema 1 history entry", e))
    }
}

/// Layer configuration embedded in a schema 1 history entry.
#[derive(Debug, Clone, Deserialize)]
pub struct LegacyLayerConfig {
    #[serde(default)]
    pub os: String,
    #[serde(default)]
    pub architecture: String,
    #[serde(default = "zero_time", deserialize_with = "created_or_zero")]
    pub created: DateTime<Utc>,
    #[serde(default)]
    pub container_config: Option<ContainerConfig>,
    #[serde(default)]
    pub config: Option<ContainerConfig>,
}

impl LegacyLayerConfig {
    /// Image ID the layer was committed as.
    ///
    /// Taken from `container_config.Image`, falling back to `config.Image`.
    pub fn image_id(&self) -> Option<&str> {
        [&self.container_config, &self.config]
            .into_iter()
            .filter_map(|c| c.as_ref())
            .filter_map(|c| c.image.as_deref())
            .find(|image| !image.is_empty())
    }

    /// Labels from `config.Labels`, empty when absent or null.
    pub fn labels(&self) -> HashMap<String, String> {
        self.config
            .as_ref()
            .and_then(|c| c.labels.clone())
            .unwrap_or_default()
    }
}

/// Image config blob fields the engine reads.
#[derive(Debug, Clone, Deserialize)]
pub struct ImageConfigBlob {
    #[serde(default)]
    pub os: String,
    #[serde(default)]
    pub architecture: String,
    #[serde(default = "zero_time", deserialize_with = "created_or_zero")]
    pub created: DateTime<Utc>,
    #[serde(default)]
    pub config: Option<ContainerConfig>,
}

impl ImageConfigBlob {
    /// Decodes a config blob.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| ImgqError::decode_with_source("Failed to parse image config blob", e))
    }

    /// Labels from `config.Labels`, empty when absent or null.
    pub fn labels(&self) -> HashMap<String, String> {
        self.config
            .as_ref()
            .and_then(|c| c.labels.clone())
            .unwrap_or_default()
    }
}

/// Creation time of a config that has none: `0001-01-01T00:00:00Z`.
pub fn zero_time() -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(1, 1, 1)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|time| time.and_utc())
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

fn created_or_zero<'de, D>(deserializer: D) -> std::result::Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<DateTime<Utc>>::deserialize(deserializer)?.unwrap_or_else(zero_time))
}

/// The `config` / `container_config` object shared by both config shapes.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContainerConfig {
    #[serde(rename = "Image", alias = "image", default)]
    pub image: Option<String>,
    #[serde(rename = "Labels", alias = "labels", default)]
    pub labels: Option<HashMap<String, String>>,
}
