// crates/publisher-core/src/derive/patterns.rs
// ============================================================================
// Module: Derivation Patterns
// Description: Compiled regular expressions for tag and file name shapes.
// Purpose: Compile the fixed pattern set once per process.
// Dependencies: regex
// ============================================================================

//! ## Overview
//! Patterns are compiled lazily and shared. Compilation failures surface as
//! [`DeriveError::Pattern`] instead of panicking.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::OnceLock;

use regex::Regex;

use super::DeriveError;

// ============================================================================
// SECTION: Pattern Set
// ============================================================================

/// Fixed regular expressions used by the deriver.
pub(crate) struct Patterns {
    /// Package name prefix of a tarball (`<name>-vX.Y.Z`).
    pub(crate) package_name: Regex,
    /// Commit-count and short-SHA suffix of a nightly version.
    pub(crate) nightly_version_suffix: Regex,
    /// GA tag (`vX.Y.Z[-suffix]_<os>_<arch>`).
    pub(crate) ga_tag: Regex,
    /// Beta/RC tag (`vX.Y.Z-(beta|rc).N[-suffix]_<os>_<arch>`).
    pub(crate) beta_rc_tag: Regex,
    /// Nightly branch tag (`(master|main)_<os>_<arch>`).
    pub(crate) nightly_tag: Regex,
    /// Version marked as nightly.
    pub(crate) nightly_version: Regex,
    /// OS/arch suffix of a tag.
    pub(crate) tag_os_arch_suffix: Regex,
    /// Platform tarball file name.
    pub(crate) platform_tarball: Regex,
    /// Trailing arch token of an image tag.
    pub(crate) image_arch_suffix: Regex,
    /// Trailing `linux` token of an image tag.
    pub(crate) image_linux_suffix: Regex,
    /// Semantic version tag.
    pub(crate) semver_tag: Regex,
    /// Trailing commit SHA of an image tag.
    pub(crate) trailing_commit_sha: Regex,
}

/// Shared compiled pattern set.
static PATTERNS: OnceLock<Patterns> = OnceLock::new();

/// Returns the shared pattern set, compiling it on first use.
pub(crate) fn patterns() -> Result<&'static Patterns, DeriveError> {
    if let Some(patterns) = PATTERNS.get() {
        return Ok(patterns);
    }
    let compiled = Patterns {
        package_name: compile(r"^(.+)-v\d+\.\d+\.\d+")?,
        nightly_version_suffix: compile(r"(-\d+-g[0-9a-f]{7,})$")?,
        ga_tag: compile(r"^(v\d+\.\d+\.\d+)(-\w+)?_(linux|darwin)_(amd64|arm64)$")?,
        beta_rc_tag: compile(
            r"^(v\d+\.\d+\.\d+-(beta|rc)\.\d+)?(-\w+)?_(linux|darwin)_(amd64|arm64)$",
        )?,
        nightly_tag: compile(r"^(master|main)_(linux|darwin)_(amd64|arm64)$")?,
        nightly_version: compile(r"^v\d+\.\d+\.\d+.*(-nightly)$")?,
        tag_os_arch_suffix: compile(r"_((linux|darwin)_(amd64|arm64))$")?,
        platform_tarball: compile(
            r"(.+)-v\d+\.\d+\.\d+(-.+)?-(linux|darwin)-(amd64|arm64)\.tar\.gz$",
        )?,
        image_arch_suffix: compile(r"[-_](amd64|arm64)$")?,
        image_linux_suffix: compile(r"[-_]linux$")?,
        semver_tag: compile(r"^v?[0-9]+\.[0-9]+\.[0-9]+([-+][a-zA-Z0-9]+)*$")?,
        trailing_commit_sha: compile(r"-[0-9a-f]{7,40}$")?,
    };
    let _ = PATTERNS.set(compiled);
    PATTERNS.get().ok_or_else(|| DeriveError::Pattern("pattern set missing".to_string()))
}

/// Compiles one pattern.
pub(crate) fn compile(pattern: &str) -> Result<Regex, DeriveError> {
    Regex::new(pattern).map_err(|err| DeriveError::Pattern(err.to_string()))
}
