// crates/publisher-transfer/src/oci.rs
// ============================================================================
// Module: OCI Registry
// Description: Artifact metadata, layer downloads, image copies, and indexes.
// Purpose: Reach OCI registries for every registry-facing publisher operation.
// Dependencies: oci-client, publisher-core, reqwest, serde_json, tokio, tokio-stream
// ============================================================================

//! ## Overview
//! [`OciRegistry`] wraps one `oci-client` client and credential set. It reads
//! artifact config blobs for instruction derivation, streams titled layers to
//! disk for publishing, copies images between repositories, and pushes
//! multi-arch image indexes.
//! Invariants:
//! - Layer files are written under the caller's directory only.
//! - Copies push the source manifest bytes unchanged, so digests survive.
//! - Index copies carry every child manifest and blob, whatever the media type.
//! - Index entries carry the platform read from each manifest's config blob.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::future::Future;
use std::path::Path;
use std::path::PathBuf;
use std::pin::Pin;

use async_trait::async_trait;
use oci_client::Client;
use oci_client::Reference;
use oci_client::RegistryOperation;
use oci_client::client::ClientConfig;
use oci_client::client::ClientProtocol;
use oci_client::errors::OciDistributionError;
use oci_client::manifest;
use oci_client::manifest::OciDescriptor;
use oci_client::manifest::OciImageIndex;
use oci_client::manifest::OciImageManifest;
use oci_client::secrets::RegistryAuth;
use publisher_core::derive::ArtifactMetadata;
use publisher_core::interfaces::ArtifactRegistry;
use publisher_core::interfaces::ImageRegistry;
use publisher_core::interfaces::TransferError;
use reqwest::header::HeaderValue;
use serde::Deserialize;
use serde_json::Value;
use serde_json::json;
use tokio::io::AsyncWriteExt;
use tokio::io::BufWriter;
use tokio_stream::StreamExt;

use crate::http::COPY_BUFFER_BYTES;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Layer annotation holding the file name.
pub const LAYER_TITLE_ANNOTATION: &str = "org.opencontainers.image.title";

/// Manifest media types accepted when copying images.
const COPY_MANIFEST_MEDIA_TYPES: [&str; 4] = [
    manifest::OCI_IMAGE_MEDIA_TYPE,
    manifest::IMAGE_MANIFEST_MEDIA_TYPE,
    manifest::OCI_IMAGE_INDEX_MEDIA_TYPE,
    manifest::IMAGE_MANIFEST_LIST_MEDIA_TYPE,
];

/// Manifest media types accepted as index children.
const CHILD_MANIFEST_MEDIA_TYPES: [&str; 2] =
    [manifest::OCI_IMAGE_MEDIA_TYPE, manifest::IMAGE_MANIFEST_MEDIA_TYPE];

// ============================================================================
// SECTION: Credentials
// ============================================================================

/// Registry credentials and transport options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryCredentials {
    /// Basic auth username; anonymous when unset.
    pub username: Option<String>,
    /// Basic auth password.
    pub password: Option<String>,
    /// Registries reached over plain HTTP.
    pub insecure_registries: Vec<String>,
}

// ============================================================================
// SECTION: Registry
// ============================================================================

/// OCI registry adapter.
pub struct OciRegistry {
    /// Registry client.
    client: Client,
    /// Auth applied to every registry.
    auth: RegistryAuth,
}

impl OciRegistry {
    /// Creates a registry adapter from credentials.
    #[must_use]
    pub fn new(credentials: &RegistryCredentials) -> Self {
        let protocol = if credentials.insecure_registries.is_empty() {
            ClientProtocol::Https
        } else {
            ClientProtocol::HttpsExcept(credentials.insecure_registries.clone())
        };
        let auth = match (&credentials.username, &credentials.password) {
            (Some(username), Some(password)) => {
                RegistryAuth::Basic(username.clone(), password.clone())
            }
            _ => RegistryAuth::Anonymous,
        };
        Self {
            client: Client::new(ClientConfig {
                protocol,
                ..Default::default()
            }),
            auth,
        }
    }

    /// Streams the layer titled `file` of `reference` into `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError`] when the manifest cannot be read, no layer
    /// carries the title, or the blob cannot be written.
    pub async fn download_layer(
        &self,
        reference: &str,
        file: &str,
        dir: &Path,
    ) -> Result<PathBuf, TransferError> {
        validate_file_name(file)?;
        let image = parse_reference(reference)?;
        let (image_manifest, _digest) = self
            .client
            .pull_image_manifest(&image, &self.auth)
            .await
            .map_err(|err| TransferError::Registry(err.to_string()))?;
        let layer = image_manifest
            .layers
            .iter()
            .find(|layer| layer_title(layer) == Some(file))
            .ok_or_else(|| {
                TransferError::Registry(format!("no layer titled {file} in {reference}"))
            })?;
        let path = dir.join(file);
        let handle = tokio::fs::File::create(&path)
            .await
            .map_err(|err| TransferError::Io(err.to_string()))?;
        let mut writer = BufWriter::with_capacity(COPY_BUFFER_BYTES, handle);
        self.client
            .pull_blob(&image, layer, &mut writer)
            .await
            .map_err(|err| TransferError::Registry(err.to_string()))?;
        writer.flush().await.map_err(|err| TransferError::Io(err.to_string()))?;
        tracing::debug!(reference, file, size = layer.size, "downloaded oci layer");
        Ok(path)
    }

    /// Builds an index entry for the child manifest at `reference`.
    async fn index_entry(&self, reference: &str) -> Result<Value, TransferError> {
        let child = parse_reference(reference)?;
        let (raw, digest) = self
            .client
            .pull_manifest_raw(&child, &self.auth, &CHILD_MANIFEST_MEDIA_TYPES)
            .await
            .map_err(|err| TransferError::Registry(err.to_string()))?;
        let child_manifest: OciImageManifest = serde_json::from_slice(&raw)
            .map_err(|err| TransferError::Registry(format!("{reference}: {err}")))?;
        let mut config = Vec::new();
        self.client
            .pull_blob(&child, &child_manifest.config, &mut config)
            .await
            .map_err(|err| TransferError::Registry(err.to_string()))?;
        let platform: PlatformConfig = serde_json::from_slice(&config)
            .map_err(|err| TransferError::Registry(format!("{reference} config: {err}")))?;
        let media_type = child_manifest
            .media_type
            .clone()
            .unwrap_or_else(|| manifest::OCI_IMAGE_MEDIA_TYPE.to_string());
        Ok(index_entry_json(&media_type, &digest, raw.len(), &platform))
    }

    /// Copies the manifest at `from`, and everything it references, to `to`.
    ///
    /// Index children are copied by digest before the index itself. Returns
    /// the number of blobs transferred.
    fn copy_manifest<'a>(
        &'a self,
        from: &'a Reference,
        to: &'a Reference,
    ) -> Pin<Box<dyn Future<Output = Result<usize, TransferError>> + Send + 'a>> {
        Box::pin(async move {
            let (raw, digest) = self
                .client
                .pull_manifest_raw(from, &self.auth, &COPY_MANIFEST_MEDIA_TYPES)
                .await
                .map_err(|err| TransferError::Registry(err.to_string()))?;
            let kind = classify_manifest(&raw)?;
            let mut blobs = 0;
            if kind.is_index {
                for child in child_digests(&raw)? {
                    let child_from = digest_reference(from, &child);
                    let child_to = digest_reference(to, &child);
                    blobs += self.copy_manifest(&child_from, &child_to).await?;
                }
            } else {
                for descriptor in blob_descriptors(&raw)? {
                    self.copy_blob(from, to, &descriptor).await?;
                    blobs += 1;
                }
            }
            let content_type = HeaderValue::from_str(&kind.media_type)
                .map_err(|err| TransferError::Registry(format!("{}: {err}", kind.media_type)))?;
            self.client
                .push_manifest_raw(to, raw, content_type)
                .await
                .map_err(|err| TransferError::Registry(err.to_string()))?;
            tracing::debug!(
                manifest = %digest,
                media_type = %kind.media_type,
                destination = %to,
                "copied manifest"
            );
            Ok(blobs)
        })
    }

    /// Transfers one blob, mounting it when both sides share a registry.
    async fn copy_blob(
        &self,
        from: &Reference,
        to: &Reference,
        descriptor: &OciDescriptor,
    ) -> Result<(), TransferError> {
        if from.registry() == to.registry() {
            if from.repository() == to.repository() {
                return Ok(());
            }
            match self.client.mount_blob(to, from, &descriptor.digest).await {
                Ok(_) => return Ok(()),
                Err(err) => {
                    tracing::debug!(
                        digest = %descriptor.digest,
                        error = %err,
                        "blob mount refused, streaming instead"
                    );
                }
            }
        }
        let source = self
            .client
            .pull_blob_stream(from, descriptor)
            .await
            .map_err(|err| TransferError::Registry(err.to_string()))?;
        let chunks = source.stream.map(|chunk| chunk.map_err(OciDistributionError::from));
        self.client
            .push_blob_stream(to, chunks, &descriptor.digest)
            .await
            .map_err(|err| TransferError::Registry(err.to_string()))?;
        tracing::debug!(digest = %descriptor.digest, size = descriptor.size, "streamed blob");
        Ok(())
    }
}

#[async_trait]
impl ArtifactRegistry for OciRegistry {
    async fn fetch_metadata(
        &self,
        repo: &str,
        reference: &str,
    ) -> Result<ArtifactMetadata, TransferError> {
        let image = parse_reference(&join_reference(repo, reference))?;
        let (image_manifest, digest, config) = self
            .client
            .pull_manifest_and_config(&image, &self.auth)
            .await
            .map_err(|err| TransferError::Registry(err.to_string()))?;
        let config: Value = serde_json::from_str(&config)
            .map_err(|err| TransferError::Registry(format!("artifact config: {err}")))?;
        let files = image_manifest
            .layers
            .iter()
            .filter_map(|layer| layer_title(layer).map(str::to_string))
            .collect();
        Ok(ArtifactMetadata {
            digest,
            config,
            files,
        })
    }
}

#[async_trait]
impl ImageRegistry for OciRegistry {
    async fn copy(&self, source: &str, destination: &str) -> Result<(), TransferError> {
        let from = parse_reference(source)?;
        let to = parse_reference(destination)?;
        self.client
            .auth(&to, &self.auth, RegistryOperation::Push)
            .await
            .map_err(|err| TransferError::Registry(err.to_string()))?;
        let blobs = self.copy_manifest(&from, &to).await?;
        tracing::info!(source, destination, blobs, "copied image");
        Ok(())
    }

    async fn manifest_digest(&self, repo: &str, tag: &str) -> Result<Option<String>, TransferError> {
        let image = parse_reference(&join_reference(repo, tag))?;
        match self.client.fetch_manifest_digest(&image, &self.auth).await {
            Ok(digest) => Ok(Some(digest)),
            Err(OciDistributionError::ImageManifestNotFoundError(_)) => Ok(None),
            Err(err) if is_manifest_unknown(&err) => Ok(None),
            Err(err) => Err(TransferError::Registry(err.to_string())),
        }
    }

    async fn push_index(
        &self,
        repo: &str,
        tags: &[String],
        manifests: &[String],
    ) -> Result<(), TransferError> {
        let mut entries = Vec::with_capacity(manifests.len());
        for reference in manifests {
            entries.push(self.index_entry(reference).await?);
        }
        let index: OciImageIndex = serde_json::from_value(json!({
            "schemaVersion": 2,
            "mediaType": manifest::OCI_IMAGE_INDEX_MEDIA_TYPE,
            "manifests": entries,
        }))
        .map_err(|err| TransferError::Registry(format!("image index: {err}")))?;
        let base = parse_reference(&join_reference(repo, "latest"))?;
        for tag in tags {
            let target = Reference::with_tag(
                base.registry().to_string(),
                base.repository().to_string(),
                tag.clone(),
            );
            self.client
                .push_manifest_list(&target, &self.auth, index.clone())
                .await
                .map_err(|err| TransferError::Registry(err.to_string()))?;
            tracing::info!(repo, tag = %tag, manifests = manifests.len(), "pushed image index");
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Platform fields of an image config blob.
#[derive(Debug, Deserialize)]
pub(crate) struct PlatformConfig {
    /// Operating system.
    pub(crate) os: String,
    /// CPU architecture.
    pub(crate) architecture: String,
    /// Optional CPU variant.
    #[serde(default)]
    pub(crate) variant: Option<String>,
}

/// Renders one image index entry.
pub(crate) fn index_entry_json(
    media_type: &str,
    digest: &str,
    size: usize,
    platform: &PlatformConfig,
) -> Value {
    let mut platform_json = json!({
        "architecture": platform.architecture,
        "os": platform.os,
    });
    if let (Some(variant), Some(object)) = (&platform.variant, platform_json.as_object_mut()) {
        object.insert("variant".to_string(), Value::String(variant.clone()));
    }
    json!({
        "mediaType": media_type,
        "digest": digest,
        "size": size,
        "platform": platform_json,
    })
}

/// Media type and shape of a raw manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ManifestKind {
    /// Declared media type, or the OCI default for the detected shape.
    pub(crate) media_type: String,
    /// True for image indexes and Docker manifest lists.
    pub(crate) is_index: bool,
}

/// Classifies raw manifest bytes by their `mediaType` field.
///
/// Manifests without the field are indexes when they list `manifests`.
pub(crate) fn classify_manifest(raw: &[u8]) -> Result<ManifestKind, TransferError> {
    let value: Value = serde_json::from_slice(raw)
        .map_err(|err| TransferError::Registry(format!("manifest: {err}")))?;
    let declared = value.get("mediaType").and_then(Value::as_str);
    let is_index = declared.map_or_else(
        || value.get("manifests").is_some(),
        |media_type| {
            media_type == manifest::OCI_IMAGE_INDEX_MEDIA_TYPE
                || media_type == manifest::IMAGE_MANIFEST_LIST_MEDIA_TYPE
        },
    );
    let media_type = match declared {
        Some(media_type) => media_type.to_string(),
        None if is_index => manifest::OCI_IMAGE_INDEX_MEDIA_TYPE.to_string(),
        None => manifest::OCI_IMAGE_MEDIA_TYPE.to_string(),
    };
    Ok(ManifestKind {
        media_type,
        is_index,
    })
}

/// Returns the child manifest digests of a raw index.
pub(crate) fn child_digests(raw: &[u8]) -> Result<Vec<String>, TransferError> {
    let index: OciImageIndex = serde_json::from_slice(raw)
        .map_err(|err| TransferError::Registry(format!("image index: {err}")))?;
    Ok(index.manifests.into_iter().map(|entry| entry.digest).collect())
}

/// Returns the config and layer descriptors of a raw image manifest.
///
/// Foreign layers, which carry download URLs, stay where they are.
pub(crate) fn blob_descriptors(raw: &[u8]) -> Result<Vec<OciDescriptor>, TransferError> {
    let image: OciImageManifest = serde_json::from_slice(raw)
        .map_err(|err| TransferError::Registry(format!("image manifest: {err}")))?;
    Ok(std::iter::once(image.config)
        .chain(image.layers)
        .filter(|descriptor| descriptor.urls.as_ref().is_none_or(Vec::is_empty))
        .collect())
}

/// Points `reference`'s repository at `digest`.
fn digest_reference(reference: &Reference, digest: &str) -> Reference {
    Reference::with_digest(
        reference.registry().to_string(),
        reference.repository().to_string(),
        digest.to_string(),
    )
}

/// Joins a repository and a tag or digest into a reference string.
pub(crate) fn join_reference(repo: &str, reference: &str) -> String {
    if reference.starts_with("sha256:") {
        format!("{repo}@{reference}")
    } else {
        format!("{repo}:{reference}")
    }
}

/// Parses a reference string.
fn parse_reference(reference: &str) -> Result<Reference, TransferError> {
    reference
        .parse::<Reference>()
        .map_err(|err| TransferError::Invalid(format!("{reference}: {err}")))
}

/// Returns a layer's title annotation.
fn layer_title(layer: &oci_client::manifest::OciDescriptor) -> Option<&str> {
    layer.annotations.as_ref()?.get(LAYER_TITLE_ANNOTATION).map(String::as_str)
}

/// Rejects layer titles that would escape the download directory.
pub(crate) fn validate_file_name(file: &str) -> Result<(), TransferError> {
    if file.is_empty() || file == "." || file == ".." || file.contains(['/', '\\']) {
        return Err(TransferError::Invalid(format!("unsafe layer file name: '{file}'")));
    }
    Ok(())
}

/// Returns true when a registry error reports an unknown manifest.
fn is_manifest_unknown(err: &OciDistributionError) -> bool {
    let message = err.to_string();
    message.contains("MANIFEST_UNKNOWN") || message.contains("NAME_UNKNOWN")
}
