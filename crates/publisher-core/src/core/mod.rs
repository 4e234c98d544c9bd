// crates/publisher-core/src/core/mod.rs
// ============================================================================
// Module: Publisher Core Types
// Description: Canonical publish requests, envelopes, and job status values.
// Purpose: Provide stable, serializable types shared by submitters and workers.
// Dependencies: serde, serde_json, time, uuid
// ============================================================================

//! ## Overview
//! Core types describe what a publish job is (requests), how it travels through
//! the broker (envelopes), and how callers observe it (job status). These types
//! are the canonical wire forms for the broker and the status store.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod envelope;
pub mod hashing;
pub mod identifiers;
pub mod request;
pub mod status;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use envelope::Envelope;
pub use envelope::EnvelopeError;
pub use envelope::EventType;
pub use hashing::HashError;
pub use hashing::hex_encode;
pub use hashing::sha256_file;
pub use identifiers::RequestId;
pub use request::ArtifactSource;
pub use request::FsPublishInfo;
pub use request::FsPublishRequest;
pub use request::HttpSource;
pub use request::ImageCopyRequest;
pub use request::MultiArchCollectRequest;
pub use request::MultiArchCollectResult;
pub use request::OciSource;
pub use request::PublishInfo;
pub use request::PublishRequest;
pub use status::JobStatus;
pub use status::StatusParseError;
