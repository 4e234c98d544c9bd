// crates/publisher-core/src/core/status.rs
// ============================================================================
// Module: Publisher Job Status
// Description: Job lifecycle states observed by callers.
// Purpose: Provide the closed set of status values and their wire strings.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! Jobs move `queued -> processing -> {success | failed | canceled}`. The
//! status store does not enforce ordering; writers choose set-if-absent or
//! set-if-present writes to respect it.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Job Status
// ============================================================================

/// Lifecycle state of a publish job.
///
/// # Invariants
/// - Wire strings are lowercase and stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Enqueued and waiting for a worker.
    Queued,
    /// Claimed by a worker.
    Processing,
    /// Published (and verified where applicable).
    Success,
    /// Terminal failure.
    Failed,
    /// Terminal outcome reserved for manual cancellation.
    Canceled,
}

impl JobStatus {
    /// Returns the stable wire string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
        }
    }

    /// Returns true for states no worker will move away from.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Canceled)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a stored status string is not recognized.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown job status: {0}")]
pub struct StatusParseError(pub String);

impl FromStr for JobStatus {
    type Err = StatusParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "queued" => Ok(Self::Queued),
            "processing" => Ok(Self::Processing),
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            "canceled" => Ok(Self::Canceled),
            other => Err(StatusParseError(other.to_string())),
        }
    }
}
