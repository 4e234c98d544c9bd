// crates/publisher-core/src/derive/annotations.rs
// ============================================================================
// Module: Artifact Annotations
// Description: Typed view of the OCI artifact config annotation namespace.
// Purpose: Decode artifact metadata once and fan it out into publish requests.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! The artifact config blob is decoded into [`ArtifactAnnotations`] with named
//! optional fields; unknown keys are ignored. Each bundled package yields one
//! [`PublishRequest`] pinned to the manifest digest.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use super::DeriveError;
use super::version::package_name;
use super::version::transform_version;
use crate::core::ArtifactSource;
use crate::core::OciSource;
use crate::core::PublishInfo;
use crate::core::PublishRequest;

// ============================================================================
// SECTION: Metadata
// ============================================================================

/// Artifact metadata as returned by a registry reader.
///
/// # Invariants
/// - `digest` is the content digest of the manifest the config was read from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    /// Resolved manifest digest (`sha256:...`).
    pub digest: String,
    /// Raw config blob document.
    pub config: Value,
    /// Layer titles (file names) listed by the manifest.
    #[serde(default)]
    pub files: Vec<String>,
}

/// Package bundled inside an artifact.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundledPackage {
    /// Tarball layer title.
    pub file: String,
    /// Human readable description.
    #[serde(default)]
    pub description: String,
    /// Entry point inside the tarball.
    #[serde(default)]
    pub entrypoint: String,
    /// Whether the package runs standalone.
    #[serde(default)]
    pub standalone: bool,
}

/// Known annotation namespace of an artifact config blob.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactAnnotations {
    /// Bundled packages.
    #[serde(rename = "net.pingcap.tibuild.tiup", default)]
    pub packages: Option<Vec<BundledPackage>>,
    /// Target operating system.
    #[serde(rename = "net.pingcap.tibuild.os", default)]
    pub os: Option<String>,
    /// Target architecture.
    #[serde(rename = "net.pingcap.tibuild.architecture", default)]
    pub arch: Option<String>,
    /// Declared artifact version.
    #[serde(rename = "org.opencontainers.image.version", default)]
    pub version: Option<String>,
    /// Source commit.
    #[serde(rename = "net.pingcap.tibuild.git-sha", default)]
    pub git_sha: Option<String>,
    /// Build profile.
    #[serde(rename = "net.pingcap.tibuild.profile", default)]
    pub profile: Option<String>,
}

impl ArtifactAnnotations {
    /// Decodes the known annotation namespace from a config document.
    ///
    /// # Errors
    ///
    /// Returns [`DeriveError::InvalidAnnotation`] when a known key has the wrong shape.
    pub fn from_config(config: &Value) -> Result<Self, DeriveError> {
        if config.is_null() {
            return Ok(Self::default());
        }
        Self::deserialize(config).map_err(|err| DeriveError::InvalidAnnotation(err.to_string()))
    }
}

// ============================================================================
// SECTION: Derivation
// ============================================================================

/// Derives one mirror publish request per bundled package.
///
/// An absent or empty package list yields no requests.
///
/// # Errors
///
/// Returns [`DeriveError`] when packages are listed but artifact-level
/// annotations are missing or a file name carries no package name.
pub fn derive_publish_requests(
    repo: &str,
    tag: &str,
    metadata: &ArtifactMetadata,
    target: &str,
) -> Result<Vec<PublishRequest>, DeriveError> {
    let annotations = ArtifactAnnotations::from_config(&metadata.config)?;
    let packages = annotations.packages.unwrap_or_default();
    if packages.is_empty() {
        return Ok(Vec::new());
    }
    let os = required(annotations.os, "net.pingcap.tibuild.os")?;
    let arch = required(annotations.arch, "net.pingcap.tibuild.architecture")?;
    let declared = required(annotations.version, "org.opencontainers.image.version")?;
    let version = transform_version(&declared, tag)?;
    if metadata.digest.trim().is_empty() {
        return Err(DeriveError::MissingAnnotation("manifest digest".to_string()));
    }

    packages
        .into_iter()
        .map(|package| {
            let name = package_name(&package.file)?.ok_or_else(|| {
                DeriveError::InvalidAnnotation(format!(
                    "package file has no version marker: {}",
                    package.file
                ))
            })?;
            Ok(PublishRequest {
                from: ArtifactSource::Oci(OciSource {
                    repo: repo.to_string(),
                    tag: metadata.digest.clone(),
                    file: package.file,
                }),
                publish: PublishInfo {
                    name,
                    os: os.clone(),
                    arch: arch.clone(),
                    version: version.clone(),
                    description: package.description,
                    entry_point: package.entrypoint,
                    standalone: package.standalone,
                },
                target: target.to_string(),
            })
        })
        .collect()
}

/// Returns a required annotation or a missing-annotation error.
fn required(value: Option<String>, key: &str) -> Result<String, DeriveError> {
    value
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| DeriveError::MissingAnnotation(key.to_string()))
}
