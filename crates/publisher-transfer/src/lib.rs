// crates/publisher-transfer/src/lib.rs
// ============================================================================
// Module: Publisher Transfer Library
// Description: Adapters moving artifact bytes between external systems.
// Purpose: Implement the transfer and notification seams of the publish pipeline.
// Dependencies: aws-sdk-s3, oci-client, publisher-core, reqwest, tokio
// ============================================================================

//! ## Overview
//! Each adapter implements one `publisher-core` interface against a real
//! system: OCI registries, HTTP servers, the TiUP CLI, S3 buckets, and chat
//! webhooks. Adapters hold no job state and are safe to share across tasks.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod fetcher;
pub mod http;
pub mod notify;
pub mod oci;
pub mod s3;
pub mod tiup;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use fetcher::SourceFetcher;
pub use http::COPY_BUFFER_BYTES;
pub use http::HttpDownloader;
pub use notify::WebhookNotifier;
pub use oci::LAYER_TITLE_ANNOTATION;
pub use oci::OciRegistry;
pub use oci::RegistryCredentials;
pub use s3::S3ObjectStore;
pub use s3::S3Settings;
pub use tiup::DEFAULT_TIUP_PROGRAM;
pub use tiup::TiupCli;

#[cfg(test)]
mod tests;
