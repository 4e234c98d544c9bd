// crates/publisher-core/src/derive/image_tags.rs
// ============================================================================
// Module: Image Tag Rules
// Description: Single-arch sibling lookup and multi-arch alias computation.
// Purpose: Decide which tags a multi-arch image index is published under.
// Dependencies: regex
// ============================================================================

//! ## Overview
//! Single-arch images are tagged `<base>_linux_<arch>`. The multi-arch index
//! is pushed under `<base>`, under `<base>` without the release suffix, and for
//! non-semver tags under that value without a trailing commit SHA.

// ============================================================================
// SECTION: Imports
// ============================================================================

use regex::Regex;

use super::DeriveError;
use super::patterns::patterns;

// ============================================================================
// SECTION: Tag Rules
// ============================================================================

/// Returns the tag of the other supported architecture, if the tag has one.
#[must_use]
pub fn sibling_arch_tag(tag: &str) -> Option<String> {
    if let Some(base) = tag.strip_suffix("_linux_amd64") {
        return Some(format!("{base}_linux_arm64"));
    }
    tag.strip_suffix("_linux_arm64").map(|base| format!("{base}_linux_amd64"))
}

/// Computes the alias tags for a multi-arch index.
///
/// # Errors
///
/// Returns [`DeriveError::Pattern`] when a pattern cannot compile.
pub fn compute_base_tags(
    pushed_tag: &str,
    release_tag_suffix: &str,
) -> Result<Vec<String>, DeriveError> {
    let patterns = patterns()?;
    let without_arch = patterns.image_arch_suffix.replace_all(pushed_tag, "");
    let tag = patterns.image_linux_suffix.replace_all(&without_arch, "").into_owned();

    let mut tags = vec![tag.clone()];
    let release_suffix = Regex::new(&format!("[-_]{}$", regex::escape(release_tag_suffix)))
        .map_err(|err| DeriveError::Pattern(err.to_string()))?;
    let without_release = release_suffix.replace_all(&tag, "").into_owned();
    if without_release != tag {
        tags.push(without_release.clone());
    }
    if !patterns.semver_tag.is_match(&tag) {
        let without_sha = patterns.trailing_commit_sha.replace_all(&without_release, "").into_owned();
        if without_sha != without_release {
            tags.push(without_sha);
        }
    }
    Ok(tags)
}
