// crates/publisher-core/src/runtime/error.rs
// ============================================================================
// Module: Publish Errors
// Description: Error taxonomy for submission and job processing.
// Purpose: Classify failures into input, terminal, and infrastructure errors.
// Dependencies: thiserror, crate::interfaces
// ============================================================================

//! ## Overview
//! Submission surfaces [`PublishError::Input`] and infrastructure errors
//! synchronously. Worker-side failures end as a `failed` status plus a
//! notification; only [`PublishError::Canceled`] ends as `canceled`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

use crate::core::EnvelopeError;
use crate::core::HashError;
use crate::derive::DeriveError;
use crate::interfaces::BrokerError;
use crate::interfaces::LockError;
use crate::interfaces::StoreError;
use crate::interfaces::TransferError;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Pipeline errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Clone, Error)]
pub enum PublishError {
    /// Malformed reference, missing annotation, or undecodable payload.
    #[error("invalid input: {0}")]
    Input(String),
    /// Unknown or expired request id.
    #[error("request ID not found: {0}")]
    NotFound(String),
    /// Download or publish failed after local retries.
    #[error("transfer failed: {0}")]
    Transfer(String),
    /// High-frequency package already published in the current window.
    #[error("skip: rate limit exceeded for package {package}")]
    RateLimited {
        /// Package name.
        package: String,
    },
    /// Mirror lock could not be taken.
    #[error("failed to obtain lock: {0}")]
    Lock(String),
    /// Published artifact does not match the local file.
    #[error("sha256 mismatch for {url}: local {local}, remote {remote}")]
    Verification {
        /// Remote artifact URL.
        url: String,
        /// Local checksum.
        local: String,
        /// Remote checksum.
        remote: String,
    },
    /// Status or counter store failure.
    #[error("store failure: {0}")]
    Store(String),
    /// Broker failure.
    #[error("broker failure: {0}")]
    Broker(String),
    /// Job was canceled.
    #[error("canceled: {0}")]
    Canceled(String),
}

impl From<DeriveError> for PublishError {
    fn from(err: DeriveError) -> Self {
        Self::Input(err.to_string())
    }
}

impl From<EnvelopeError> for PublishError {
    fn from(err: EnvelopeError) -> Self {
        Self::Input(err.to_string())
    }
}

impl From<StoreError> for PublishError {
    fn from(err: StoreError) -> Self {
        Self::Store(err.to_string())
    }
}

impl From<BrokerError> for PublishError {
    fn from(err: BrokerError) -> Self {
        Self::Broker(err.to_string())
    }
}

impl From<LockError> for PublishError {
    fn from(err: LockError) -> Self {
        Self::Lock(err.to_string())
    }
}

impl From<TransferError> for PublishError {
    fn from(err: TransferError) -> Self {
        Self::Transfer(err.to_string())
    }
}

impl From<HashError> for PublishError {
    fn from(err: HashError) -> Self {
        Self::Transfer(err.to_string())
    }
}
