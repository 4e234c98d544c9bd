// crates/publisher-core/src/derive/reference.rs
// ============================================================================
// Module: Artifact References
// Description: Splitting `repo:tag` and `repo@digest` references.
// Purpose: Normalize caller-supplied artifact references.
// Dependencies: none
// ============================================================================

//! ## Overview
//! References containing `@sha256:` split at `@`; all others split at the last
//! `:` that follows the last `/`, so registry ports are left in the repository.

// ============================================================================
// SECTION: Imports
// ============================================================================

use super::DeriveError;

// ============================================================================
// SECTION: Reference Helpers
// ============================================================================

/// Splits an artifact reference into repository and tag (or digest).
///
/// # Errors
///
/// Returns [`DeriveError::InvalidReference`] when either part is missing.
pub fn split_repo_and_tag(reference: &str) -> Result<(String, String), DeriveError> {
    let reference = reference.trim();
    let split = if reference.contains("@sha256:") {
        reference.split_once('@')
    } else {
        let name_start = reference.rfind('/').map_or(0, |idx| idx + 1);
        reference[name_start ..]
            .rfind(':')
            .map(|idx| (&reference[.. name_start + idx], &reference[name_start + idx + 1 ..]))
    };
    match split {
        Some((repo, tag)) if !repo.is_empty() && !tag.is_empty() => {
            Ok((repo.to_string(), tag.to_string()))
        }
        _ => Err(DeriveError::InvalidReference(reference.to_string())),
    }
}

/// Returns the repository path without its registry host.
///
/// `hub.example.com/pingcap/tidb/package` becomes `pingcap/tidb/package`.
#[must_use]
pub fn repo_path(repo: &str) -> &str {
    repo.split_once('/').map_or(repo, |(_, path)| path)
}
