// crates/publisher-core/src/core/identifiers.rs
// ============================================================================
// Module: Publisher Identifiers
// Description: Opaque request identifiers shared by the broker and status store.
// Purpose: Provide a strongly typed job key with a stable wire form.
// Dependencies: serde, uuid
// ============================================================================

//! ## Overview
//! A [`RequestId`] is minted once when an envelope is composed and reused for
//! every broker delivery and status write of that job.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;

// ============================================================================
// SECTION: Request Identifier
// ============================================================================

/// Publish job identifier.
///
/// # Invariants
/// - Opaque UTF-8 string; freshly generated values are random UUIDv4 strings.
/// - Serves as both the broker message key and the status-store key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    /// Creates a request identifier from an existing value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh random identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the status-store key holding this job's structured result.
    #[must_use]
    pub fn result_key(&self) -> String {
        format!("{}-result", self.0)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for RequestId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for RequestId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}
