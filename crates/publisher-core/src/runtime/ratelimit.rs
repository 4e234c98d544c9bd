// crates/publisher-core/src/runtime/ratelimit.rs
// ============================================================================
// Module: Rate Limiter
// Description: Fixed-window counters for high-frequency publish classes.
// Purpose: Publish each nightly package at most once per window per mirror.
// Dependencies: crate::interfaces, tracing
// ============================================================================

//! ## Overview
//! The limiter increments a counter keyed by
//! `ratelimit:<class>:<destination>:<package>:<os>:<arch>`. A post-increment
//! value of `1` opens the window (the expiry is set then) and the job runs;
//! any larger value inside the window rejects the job.
//! Invariants:
//! - Only nightly versions are limited; other jobs bypass the counter.
//! - A zero window disables limiting.
//! - The window is fixed, so two hits straddling its end both pass.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use crate::core::PublishInfo;
use crate::derive::is_nightly_version;
use crate::interfaces::CounterStore;
use crate::runtime::error::PublishError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Root prefix of every rate-limit key.
pub const RATE_LIMIT_PREFIX: &str = "ratelimit";
/// Destination class of package mirror publishes.
pub const MIRROR_RATE_LIMIT_CLASS: &str = "tiup";
/// Default nightly window.
pub const DEFAULT_NIGHTLY_WINDOW: Duration = Duration::from_secs(12 * 60 * 60);

// ============================================================================
// SECTION: Keys
// ============================================================================

/// Identity of one rate-limited package stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateLimitKey {
    /// Destination class.
    pub class: String,
    /// Destination (mirror endpoint).
    pub destination: String,
    /// Package name.
    pub package: String,
    /// Target OS.
    pub os: String,
    /// Target architecture.
    pub arch: String,
}

impl RateLimitKey {
    /// Builds the key for a mirror publish.
    #[must_use]
    pub fn for_publish(class: &str, destination: &str, info: &PublishInfo) -> Self {
        Self {
            class: class.to_string(),
            destination: destination.to_string(),
            package: info.name.clone(),
            os: info.os.clone(),
            arch: info.arch.clone(),
        }
    }

    /// Returns the counter key.
    #[must_use]
    pub fn to_key(&self) -> String {
        format!(
            "{RATE_LIMIT_PREFIX}:{}:{}:{}:{}:{}",
            self.class, self.destination, self.package, self.os, self.arch
        )
    }
}

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    /// Job is not in a limited class.
    Bypass,
    /// First hit in the window.
    Allowed,
    /// Window already used; carries the post-increment count.
    Rejected(u64),
}

// ============================================================================
// SECTION: Limiter
// ============================================================================

/// Fixed-window limiter over a shared counter store.
#[derive(Clone)]
pub struct RateLimiter {
    /// Counter backend.
    counters: Arc<dyn CounterStore>,
    /// Destination class used in keys.
    class: String,
    /// Window length.
    window: Duration,
}

impl RateLimiter {
    /// Creates a limiter for a destination class.
    #[must_use]
    pub fn new(counters: Arc<dyn CounterStore>, class: impl Into<String>, window: Duration) -> Self {
        Self {
            counters,
            class: class.into(),
            window,
        }
    }

    /// Creates the package mirror limiter.
    #[must_use]
    pub fn for_mirrors(counters: Arc<dyn CounterStore>, window: Duration) -> Self {
        Self::new(counters, MIRROR_RATE_LIMIT_CLASS, window)
    }

    /// Returns the configured window.
    #[must_use]
    pub const fn window(&self) -> Duration {
        self.window
    }

    /// Counts one hit for a publish and decides whether it may run.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::Store`] when the counter cannot be incremented.
    pub async fn check_publish(
        &self,
        destination: &str,
        info: &PublishInfo,
    ) -> Result<RateDecision, PublishError> {
        if self.window.is_zero() || !is_nightly_version(&info.version)? {
            return Ok(RateDecision::Bypass);
        }
        let key = RateLimitKey::for_publish(&self.class, destination, info).to_key();
        let count = self.counters.increment(&key).await?;
        if count <= 1 {
            if let Err(err) = self.counters.expire(&key, self.window).await {
                tracing::error!(key = %key, error = %err, "failed to set rate limit window");
            }
            return Ok(RateDecision::Allowed);
        }
        tracing::warn!(
            key = %key,
            package = %info.name,
            os = %info.os,
            arch = %info.arch,
            count,
            window_secs = self.window.as_secs(),
            "rate limit exceeded for package"
        );
        Ok(RateDecision::Rejected(count))
    }

    /// Deletes every counter of this limiter's class.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::Store`] when the backend rejects the scan or delete.
    pub async fn reset(&self) -> Result<u64, PublishError> {
        let prefix = format!("{RATE_LIMIT_PREFIX}:{}:", self.class);
        let removed = self.counters.delete_prefix(&prefix).await?;
        tracing::info!(prefix = %prefix, removed, "rate limit counters reset");
        Ok(removed)
    }
}
