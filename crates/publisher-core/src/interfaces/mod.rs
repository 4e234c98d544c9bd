// crates/publisher-core/src/interfaces/mod.rs
// ============================================================================
// Module: Publisher Interfaces
// Description: Backend-agnostic seams for storage, brokers, and transfers.
// Purpose: Define the contract surfaces used by the publish pipeline.
// Dependencies: async-trait, crate::core, crate::derive
// ============================================================================

//! ## Overview
//! Interfaces define how the pipeline reaches external systems without
//! embedding backend details. Redis, OCI registries, object stores, the mirror
//! CLI, and webhooks live behind these traits; in-memory implementations back
//! the tests.
//! Invariants:
//! - Status writes are conditional (set-if-absent or set-if-present).
//! - Counter increments are atomic and return the post-increment value.
//! - Lock release only succeeds for the holder's token.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::core::ArtifactSource;
use crate::core::Envelope;
use crate::core::JobStatus;
use crate::core::PublishInfo;
use crate::core::RequestId;
use crate::derive::ArtifactMetadata;

// ============================================================================
// SECTION: Status Store
// ============================================================================

/// Key/value store errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Backend call failed.
    #[error("store backend error: {0}")]
    Backend(String),
    /// Stored value could not be interpreted.
    #[error("store corrupt value: {0}")]
    Corrupt(String),
}

/// Per-job status store with TTL.
///
/// # Invariants
/// - `set_if_absent` never overwrites an existing status.
/// - `set_if_present` keeps the existing TTL and never creates a key.
#[async_trait]
pub trait StatusStore: Send + Sync {
    /// Seeds a status unless one already exists. Returns true when written.
    async fn set_if_absent(
        &self,
        id: &RequestId,
        status: JobStatus,
        ttl: Duration,
    ) -> Result<bool, StoreError>;

    /// Replaces an existing status, keeping its TTL. Returns true when written.
    async fn set_if_present(&self, id: &RequestId, status: JobStatus) -> Result<bool, StoreError>;

    /// Reads the current status, `None` when absent or expired.
    async fn get(&self, id: &RequestId) -> Result<Option<JobStatus>, StoreError>;

    /// Stores a structured job result under `<id>-result`.
    async fn put_result(&self, id: &RequestId, payload: &str, ttl: Duration)
    -> Result<(), StoreError>;

    /// Reads a structured job result.
    async fn get_result(&self, id: &RequestId) -> Result<Option<String>, StoreError>;
}

// ============================================================================
// SECTION: Counter Store
// ============================================================================

/// Atomic counters used by the rate limiter.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Increments a counter and returns the post-increment value.
    async fn increment(&self, key: &str) -> Result<u64, StoreError>;

    /// Sets the counter expiry.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Deletes every counter whose key starts with `prefix`. Returns the count.
    async fn delete_prefix(&self, prefix: &str) -> Result<u64, StoreError>;
}

// ============================================================================
// SECTION: Lock Backend
// ============================================================================

/// Distributed lock errors.
#[derive(Debug, Clone, Error)]
pub enum LockError {
    /// Backend call failed.
    #[error("lock backend error: {0}")]
    Backend(String),
    /// Acquisition retries were exhausted.
    #[error("failed to obtain lock {name} after {tries} tries")]
    Exhausted {
        /// Lock name.
        name: String,
        /// Attempts made.
        tries: u32,
    },
}

/// Lease-based lock primitive.
///
/// # Invariants
/// - A lease expires on its own if the holder disappears.
/// - `release` only deletes the lease when `token` matches the holder.
#[async_trait]
pub trait LockBackend: Send + Sync {
    /// Attempts to take the lease once. Returns true when acquired.
    async fn try_acquire(&self, name: &str, token: &str, lease: Duration)
    -> Result<bool, LockError>;

    /// Releases the lease held under `token`. Returns true when released.
    async fn release(&self, name: &str, token: &str) -> Result<bool, LockError>;
}

// ============================================================================
// SECTION: Broker
// ============================================================================

/// Broker errors.
#[derive(Debug, Clone, Error)]
pub enum BrokerError {
    /// Backend call failed.
    #[error("broker backend error: {0}")]
    Backend(String),
    /// Message could not be encoded or decoded.
    #[error("broker codec error: {0}")]
    Codec(String),
    /// Subscription is closed.
    #[error("broker subscription closed")]
    Closed,
}

/// Producer side of the broker.
#[async_trait]
pub trait BrokerProducer: Send + Sync {
    /// Publishes all envelopes in one call, keyed by envelope id.
    async fn publish_batch(&self, envelopes: &[Envelope]) -> Result<(), BrokerError>;
}

/// One delivered broker message.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    /// Backend receipt used to acknowledge the message.
    pub receipt: String,
    /// Decoded envelope.
    pub envelope: Envelope,
}

/// Consumer side of the broker (at-least-once).
#[async_trait]
pub trait BrokerSubscription: Send {
    /// Blocks until the next message arrives.
    async fn receive(&mut self) -> Result<Delivery, BrokerError>;

    /// Acknowledges a processed message.
    async fn ack(&mut self, delivery: &Delivery) -> Result<(), BrokerError>;

    /// Rejects a message this consumer does not own.
    async fn nack(&mut self, delivery: &Delivery) -> Result<(), BrokerError>;
}

// ============================================================================
// SECTION: Transfers
// ============================================================================

/// Transfer engine errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Clone, Error)]
pub enum TransferError {
    /// Local filesystem failure.
    #[error("transfer io error: {0}")]
    Io(String),
    /// HTTP request failed or returned a non-success status.
    #[error("transfer http error: {0}")]
    Http(String),
    /// Registry request failed.
    #[error("registry error: {0}")]
    Registry(String),
    /// Mirror publish command failed.
    #[error("mirror command failed: {0}")]
    Command(String),
    /// Object store request failed.
    #[error("object store error: {0}")]
    ObjectStore(String),
    /// Input was rejected before any I/O.
    #[error("invalid transfer input: {0}")]
    Invalid(String),
    /// Operation exceeded its deadline.
    #[error("transfer timed out: {0}")]
    Timeout(String),
}

/// Reads OCI artifact manifests and config blobs.
#[async_trait]
pub trait ArtifactRegistry: Send + Sync {
    /// Fetches the manifest digest, config document, and layer file names.
    async fn fetch_metadata(
        &self,
        repo: &str,
        reference: &str,
    ) -> Result<ArtifactMetadata, TransferError>;
}

/// Materializes job sources as local files.
#[async_trait]
pub trait ArtifactFetcher: Send + Sync {
    /// Downloads a source into `dir` and returns the file path.
    async fn download(&self, source: &ArtifactSource, dir: &Path)
    -> Result<PathBuf, TransferError>;

    /// Downloads a URL and returns its lowercase hex SHA-256.
    async fn remote_sha256(&self, url: &str) -> Result<String, TransferError>;
}

/// Package mirror publish operation.
#[async_trait]
pub trait MirrorPublisher: Send + Sync {
    /// Publishes a package tarball to the mirror.
    async fn publish(&self, file: &Path, info: &PublishInfo) -> Result<(), TransferError>;
}

/// Object store writes.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Uploads a local file to `key`.
    async fn put_file(&self, key: &str, path: &Path) -> Result<(), TransferError>;

    /// Uploads a small in-memory object to `key`.
    async fn put_bytes(&self, key: &str, bytes: Vec<u8>) -> Result<(), TransferError>;
}

/// Container registry operations.
#[async_trait]
pub trait ImageRegistry: Send + Sync {
    /// Copies an image or image index between references, keeping its digest.
    async fn copy(&self, source: &str, destination: &str) -> Result<(), TransferError>;

    /// Returns the manifest digest of `repo:tag`, `None` when the tag is absent.
    async fn manifest_digest(&self, repo: &str, tag: &str) -> Result<Option<String>, TransferError>;

    /// Pushes an image index referencing `manifests` under each tag.
    async fn push_index(
        &self,
        repo: &str,
        tags: &[String],
        manifests: &[String],
    ) -> Result<(), TransferError>;
}

// ============================================================================
// SECTION: Notifier
// ============================================================================

/// Notification errors.
#[derive(Debug, Clone, Error)]
pub enum NotifyError {
    /// Webhook delivery failed.
    #[error("notify error: {0}")]
    Delivery(String),
}

/// Diagnostic summary of a terminal job failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureReport {
    /// Message title.
    pub title: String,
    /// Ordered key/value diagnostic fields.
    pub fields: Vec<(String, String)>,
    /// Error text.
    pub error: String,
}

impl FailureReport {
    /// Renders the report as plain text.
    #[must_use]
    pub fn render(&self) -> String {
        let mut text = format!("{}\n", self.title);
        for (key, value) in &self.fields {
            text.push_str(&format!("- {key}: {value}\n"));
        }
        text.push_str(&format!("- error: {}", self.error));
        text
    }
}

/// Failure notification sink.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Delivers a failure report.
    async fn notify(&self, report: &FailureReport) -> Result<(), NotifyError>;
}
