// crates/publisher-core/src/runtime/retry.rs
// ============================================================================
// Module: Retry Policy
// Description: Fixed-count, fixed-delay retry driver.
// Purpose: Retry flaky transfers locally before escalating to a terminal failure.
// Dependencies: tokio, tracing
// ============================================================================

//! ## Overview
//! Fixed-count, fixed-delay retry driver used to retry flaky transfers
//! locally before escalating to a terminal failure.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

// ============================================================================
// SECTION: Retry Policy
// ============================================================================

/// Default mirror publish attempts.
pub const DEFAULT_PUBLISH_ATTEMPTS: u32 = 3;
/// Default delay between mirror publish attempts.
pub const DEFAULT_PUBLISH_RETRY_DELAY: Duration = Duration::from_secs(60);

/// Fixed retry policy.
///
/// # Invariants
/// - At least one attempt is always made.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum attempts.
    pub attempts: u32,
    /// Delay between attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_PUBLISH_ATTEMPTS,
            delay: DEFAULT_PUBLISH_RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Creates a retry policy.
    #[must_use]
    pub const fn new(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts,
            delay,
        }
    }

    /// Runs `op` until it succeeds or attempts are exhausted.
    ///
    /// # Errors
    ///
    /// Returns the last error once every attempt has failed.
    pub async fn run<T, E, F, Fut>(&self, operation: &str, mut op: F) -> Result<T, E>
    where
        E: Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let attempts = self.attempts.max(1);
        let mut tried = 0;
        loop {
            tried += 1;
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if tried >= attempts => return Err(err),
                Err(err) => {
                    tracing::warn!(
                        operation,
                        tried,
                        max_attempts = attempts,
                        error = %err,
                        "attempt failed, retrying after {}s",
                        self.delay.as_secs()
                    );
                    tokio::time::sleep(self.delay).await;
                }
            }
        }
    }
}
