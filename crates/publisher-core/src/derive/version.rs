// crates/publisher-core/src/derive/version.rs
// ============================================================================
// Module: Version Derivation
// Description: Tag-shape specific version rewriting and package naming.
// Purpose: Map artifact tags onto mirror package versions.
// Dependencies: regex
// ============================================================================

//! ## Overview
//! Version rules by tag shape:
//! - GA (`vX.Y.Z[-suffix]_<os>_<arch>`): the tag without its platform suffix.
//! - Beta/RC (`vX.Y.Z-(beta|rc).N[-suffix]_<os>_<arch>`): the tag without its
//!   platform suffix, keeping the pre-release component.
//! - Nightly (`(master|main)_<os>_<arch>`): the declared version with its
//!   `-<count>-g<sha>` suffix replaced by `-nightly`.
//! - Anything else: the declared version unchanged.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;

use regex::Captures;

use super::DeriveError;
use super::patterns::patterns;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Suffix marking every nightly build of one logical version.
pub const NIGHTLY_VERSION_SUFFIX: &str = "-nightly";

// ============================================================================
// SECTION: Version Rules
// ============================================================================

/// Derives the mirror package version from the declared version and the tag.
///
/// # Errors
///
/// Returns [`DeriveError::Pattern`] when the pattern set cannot compile.
pub fn transform_version(version: &str, tag: &str) -> Result<String, DeriveError> {
    let patterns = patterns()?;
    if let Some(caps) = patterns.ga_tag.captures(tag) {
        return Ok(format!("{}{}", group(&caps, 1), group(&caps, 2)));
    }
    if let Some(caps) = patterns.beta_rc_tag.captures(tag) {
        return Ok(format!("{}{}", group(&caps, 1), group(&caps, 3)));
    }
    if patterns.nightly_tag.is_match(tag) {
        let base = patterns.nightly_version_suffix.replace_all(version, "");
        return Ok(format!("{base}{NIGHTLY_VERSION_SUFFIX}"));
    }
    Ok(version.to_string())
}

/// Returns true when the version belongs to the nightly (high-frequency) class.
///
/// # Errors
///
/// Returns [`DeriveError::Pattern`] when the pattern set cannot compile.
pub fn is_nightly_version(version: &str) -> Result<bool, DeriveError> {
    Ok(patterns()?.nightly_version.is_match(version))
}

/// Extracts the package name from a tarball path (`<name>-vX.Y.Z...`).
///
/// Returns `None` when the file name does not carry a version marker.
///
/// # Errors
///
/// Returns [`DeriveError::Pattern`] when the pattern set cannot compile.
pub fn package_name(tarball: &str) -> Result<Option<String>, DeriveError> {
    let base = Path::new(tarball).file_name().and_then(|name| name.to_str()).unwrap_or_default();
    Ok(patterns()?
        .package_name
        .captures(base)
        .and_then(|caps| caps.get(1))
        .map(|name| name.as_str().to_string()))
}

/// Returns a capture group or an empty string.
fn group<'a>(caps: &Captures<'a>, index: usize) -> &'a str {
    caps.get(index).map_or("", |m| m.as_str())
}
