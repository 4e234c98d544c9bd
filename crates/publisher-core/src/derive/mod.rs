// crates/publisher-core/src/derive/mod.rs
// ============================================================================
// Module: Instruction Deriver
// Description: Pure rules turning artifact metadata into publish requests.
// Purpose: Keep tag parsing, version rewriting, and fan-out free of side effects.
// Dependencies: regex, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! The deriver reads artifact references, decoded annotations, and static
//! delivery rules. Nothing in this module performs I/O; the registry reader
//! supplies [`ArtifactMetadata`] and callers submit the derived requests.
//! Invariants:
//! - Derived OCI sources are pinned to the resolved manifest digest.
//! - Rules are evaluated against repository and tag only.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod annotations;
pub mod fileserver;
pub mod image_tags;
mod patterns;
pub mod reference;
pub mod rules;
pub mod version;

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use annotations::ArtifactAnnotations;
pub use annotations::ArtifactMetadata;
pub use annotations::BundledPackage;
pub use annotations::derive_publish_requests;
pub use fileserver::FS_BUILDS_PREFIX;
pub use fileserver::FS_REFS_PREFIX;
pub use fileserver::builds_key;
pub use fileserver::derive_fs_publish_info;
pub use fileserver::file_transfer_map;
pub use fileserver::refs_key;
pub use image_tags::compute_base_tags;
pub use image_tags::sibling_arch_tag;
pub use reference::repo_path;
pub use reference::split_repo_and_tag;
pub use rules::DeliveryInstruction;
pub use rules::DeliveryRule;
pub use rules::DeliveryRules;
pub use version::is_nightly_version;
pub use version::package_name;
pub use version::transform_version;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Input errors raised while deriving publish instructions.
///
/// # Invariants
/// - Every variant is an input error; no job is created when one is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeriveError {
    /// Artifact reference could not be split into repository and tag.
    #[error("invalid URL: {0}")]
    InvalidReference(String),
    /// A required annotation is absent.
    #[error("missing annotation: {0}")]
    MissingAnnotation(String),
    /// An annotation is present but malformed.
    #[error("invalid annotation: {0}")]
    InvalidAnnotation(String),
    /// A configured pattern failed to compile.
    #[error("invalid pattern: {0}")]
    Pattern(String),
}
