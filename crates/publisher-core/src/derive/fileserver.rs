// crates/publisher-core/src/derive/fileserver.rs
// ============================================================================
// Module: Fileserver Layout
// Description: Object-store keys and transfer maps for fileserver publishes.
// Purpose: Derive deterministic object keys from repository, branch, and commit.
// Dependencies: regex
// ============================================================================

//! ## Overview
//! Content lands at `download/builds/<repo>/<branch>/<commit>/<entry-point>`
//! and the latest commit of a branch is recorded at
//! `download/refs/<repo>/<branch>/sha1`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use super::DeriveError;
use super::annotations::ArtifactAnnotations;
use super::annotations::ArtifactMetadata;
use super::patterns::patterns;
use super::reference::repo_path;
use crate::core::FsPublishInfo;
use crate::core::FsPublishRequest;
use crate::core::OciSource;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Key prefix for published build content.
pub const FS_BUILDS_PREFIX: &str = "download/builds";
/// Key prefix for branch ref pointers.
pub const FS_REFS_PREFIX: &str = "download/refs";
/// Repository suffix dropped from fileserver repo paths.
const PACKAGE_REPO_SUFFIX: &str = "/package";

// ============================================================================
// SECTION: Keys
// ============================================================================

/// Returns the object key for one published file.
#[must_use]
pub fn builds_key(info: &FsPublishInfo, entry_point: &str) -> String {
    join_key(&[FS_BUILDS_PREFIX, &info.repo, &info.branch, &info.commit_sha, entry_point])
}

/// Returns the object key of the branch ref pointer.
#[must_use]
pub fn refs_key(info: &FsPublishInfo) -> String {
    join_key(&[FS_REFS_PREFIX, &info.repo, &info.branch, "sha1"])
}

/// Joins key segments with single slashes.
fn join_key(segments: &[&str]) -> String {
    segments
        .iter()
        .map(|segment| segment.trim_matches('/'))
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

// ============================================================================
// SECTION: Derivation
// ============================================================================

/// Maps platform tarballs to `<os>_<arch>/<base>.tar.gz` entry points.
///
/// Files that are not platform tarballs are skipped.
///
/// # Errors
///
/// Returns [`DeriveError::Pattern`] when the pattern set cannot compile.
pub fn file_transfer_map(files: &[String]) -> Result<BTreeMap<String, String>, DeriveError> {
    let tarball = &patterns()?.platform_tarball;
    Ok(files
        .iter()
        .filter_map(|file| {
            let caps = tarball.captures(file)?;
            let base = caps.get(1)?.as_str();
            let os = caps.get(3)?.as_str();
            let arch = caps.get(4)?.as_str();
            Some((file.clone(), format!("{os}_{arch}/{base}.tar.gz")))
        })
        .collect())
}

/// Derives a fileserver publish request for an artifact.
///
/// # Errors
///
/// Returns [`DeriveError`] when the commit annotation or digest is missing.
pub fn derive_fs_publish_info(
    repo: &str,
    tag: &str,
    metadata: &ArtifactMetadata,
) -> Result<FsPublishRequest, DeriveError> {
    let annotations = ArtifactAnnotations::from_config(&metadata.config)?;
    let commit_sha = annotations
        .git_sha
        .filter(|sha| !sha.trim().is_empty())
        .ok_or_else(|| DeriveError::MissingAnnotation("net.pingcap.tibuild.git-sha".to_string()))?;
    if metadata.digest.trim().is_empty() {
        return Err(DeriveError::MissingAnnotation("manifest digest".to_string()));
    }
    let path = repo_path(repo);
    let branch = patterns()?.tag_os_arch_suffix.replace_all(tag, "").into_owned();
    Ok(FsPublishRequest {
        from: OciSource {
            repo: repo.to_string(),
            tag: metadata.digest.clone(),
            file: String::new(),
        },
        publish: FsPublishInfo {
            repo: path.strip_suffix(PACKAGE_REPO_SUFFIX).unwrap_or(path).to_string(),
            branch,
            commit_sha,
            file_transfer_map: file_transfer_map(&metadata.files)?,
        },
    })
}
