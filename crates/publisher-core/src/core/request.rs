// crates/publisher-core/src/core/request.rs
// ============================================================================
// Module: Publisher Requests
// Description: Destination-specific publish payloads carried by envelopes.
// Purpose: Describe what to fetch, where to publish it, and under which identity.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! A [`PublishRequest`] is the unit of work for package mirrors. Fileserver and
//! registry jobs carry their own payloads ([`FsPublishRequest`],
//! [`ImageCopyRequest`], [`MultiArchCollectRequest`]).
//! Invariants:
//! - [`ArtifactSource`] is a closed enum, so exactly one source is populated.
//! - A request accepted by a worker has a non-empty version.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Artifact Sources
// ============================================================================

/// File stored as a layer of an OCI artifact.
///
/// # Invariants
/// - `tag` is a content digest once produced by the instruction deriver.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OciSource {
    /// Repository including the registry host.
    pub repo: String,
    /// Tag or digest of the artifact manifest.
    pub tag: String,
    /// Layer title of the file inside the artifact.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub file: String,
}

impl OciSource {
    /// Returns the same artifact pointing at another layer file.
    #[must_use]
    pub fn with_file(&self, file: impl Into<String>) -> Self {
        Self {
            repo: self.repo.clone(),
            tag: self.tag.clone(),
            file: file.into(),
        }
    }

    /// Returns `repo:tag` or `repo@digest` for the artifact manifest.
    #[must_use]
    pub fn reference(&self) -> String {
        if self.tag.starts_with("sha256:") {
            format!("{}@{}", self.repo, self.tag)
        } else {
            format!("{}:{}", self.repo, self.tag)
        }
    }
}

/// File served over plain HTTP.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HttpSource {
    /// Absolute URL of the file.
    pub url: String,
}

/// Where the bytes of a publish job come from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ArtifactSource {
    /// Layer file of an OCI artifact.
    Oci(OciSource),
    /// Plain HTTP download.
    Http(HttpSource),
}

impl fmt::Display for ArtifactSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Oci(oci) => write!(f, "{}:{}#{}", oci.repo, oci.tag, oci.file),
            Self::Http(http) => f.write_str(&http.url),
        }
    }
}

// ============================================================================
// SECTION: Mirror Requests
// ============================================================================

/// Package identity and metadata for a mirror publish.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PublishInfo {
    /// Package (component) name.
    pub name: String,
    /// Target operating system.
    pub os: String,
    /// Target architecture.
    pub arch: String,
    /// Package version.
    pub version: String,
    /// Human readable description.
    #[serde(default)]
    pub description: String,
    /// Entry point file inside the package tarball.
    #[serde(default)]
    pub entry_point: String,
    /// Whether the package runs standalone.
    #[serde(default)]
    pub standalone: bool,
}

/// Mirror publish job.
///
/// # Invariants
/// - `publish.version` is non-empty once submitted.
/// - `target` names the mirror that must process the job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PublishRequest {
    /// Source of the package tarball.
    pub from: ArtifactSource,
    /// Package identity and metadata.
    pub publish: PublishInfo,
    /// Destination mirror name.
    pub target: String,
}

impl PublishRequest {
    /// Returns the first missing required field, if any.
    #[must_use]
    pub fn missing_field(&self) -> Option<&'static str> {
        let info = &self.publish;
        [
            ("name", &info.name),
            ("version", &info.version),
            ("os", &info.os),
            ("arch", &info.arch),
            ("target", &self.target),
        ]
        .into_iter()
        .find(|(_, value)| value.trim().is_empty())
        .map(|(field, _)| field)
    }
}

// ============================================================================
// SECTION: Fileserver Requests
// ============================================================================

/// Object-store layout for a fileserver publish.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FsPublishInfo {
    /// Repository path without the registry host.
    pub repo: String,
    /// Source branch.
    pub branch: String,
    /// Source commit.
    pub commit_sha: String,
    /// Layer file name to entry point path under the commit directory.
    #[serde(default)]
    pub file_transfer_map: BTreeMap<String, String>,
}

/// Fileserver publish job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FsPublishRequest {
    /// Digest-pinned artifact holding every file.
    pub from: OciSource,
    /// Object-store layout.
    pub publish: FsPublishInfo,
}

// ============================================================================
// SECTION: Registry Requests
// ============================================================================

/// Registry-to-registry image copy job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageCopyRequest {
    /// Source image reference.
    pub source: String,
    /// Destination image reference.
    pub destination: String,
}

/// Multi-arch image index collection job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiArchCollectRequest {
    /// Single-arch image that was just pushed (`repo:tag`).
    pub image_url: String,
    /// Release suffix dropped from an extra alias tag.
    #[serde(default)]
    pub release_tag_suffix: String,
}

/// Outcome stored under `<id>-result` for multi-arch collection jobs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiArchCollectResult {
    /// Repository the index was pushed to.
    pub repo: String,
    /// Tags that now point at the image index.
    pub tags: Vec<String>,
    /// Platform manifests referenced by the index (`repo@digest`).
    pub manifests: Vec<String>,
}
