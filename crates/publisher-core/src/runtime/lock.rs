// crates/publisher-core/src/runtime/lock.rs
// ============================================================================
// Module: Mirror Lock
// Description: Bounded-retry acquisition over a lease-based lock backend.
// Purpose: Serialize every publish against one mirror across worker processes.
// Dependencies: crate::interfaces, rand, tokio, tracing, uuid
// ============================================================================

//! ## Overview
//! [`MirrorLock`] takes a single named lease shared by every worker that
//! targets the same mirror. Acquisition retries with a fixed delay plus small
//! jitter and gives up after a bounded number of tries.
//! Invariants:
//! - Each acquisition uses a fresh token; only that token can release it.
//! - [`MirrorLock::run_exclusive`] releases the lease whether the operation
//!   succeeds or fails.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use uuid::Uuid;

use crate::interfaces::LockBackend;
use crate::interfaces::LockError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Lock shared by every package mirror publisher.
pub const DEFAULT_MIRROR_LOCK_NAME: &str = "global/mutex/tiup-publishing";
/// Default lease length.
pub const DEFAULT_LOCK_LEASE: Duration = Duration::from_secs(10 * 60);
/// Default acquisition attempts.
pub const DEFAULT_LOCK_TRIES: u32 = 300;
/// Default delay between acquisition attempts.
pub const DEFAULT_LOCK_RETRY_DELAY: Duration = Duration::from_secs(1);
/// Upper bound of the random jitter added to each retry delay, in milliseconds.
const LOCK_JITTER_MS: u64 = 100;

// ============================================================================
// SECTION: Lock Settings
// ============================================================================

/// Lock acquisition settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockSettings {
    /// Lock name.
    pub name: String,
    /// Lease length.
    pub lease: Duration,
    /// Acquisition attempts.
    pub tries: u32,
    /// Delay between attempts.
    pub retry_delay: Duration,
}

impl Default for LockSettings {
    fn default() -> Self {
        Self {
            name: DEFAULT_MIRROR_LOCK_NAME.to_string(),
            lease: DEFAULT_LOCK_LEASE,
            tries: DEFAULT_LOCK_TRIES,
            retry_delay: DEFAULT_LOCK_RETRY_DELAY,
        }
    }
}

// ============================================================================
// SECTION: Mirror Lock
// ============================================================================

/// Held lease.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockLease {
    /// Lock name.
    pub name: String,
    /// Holder token.
    pub token: String,
}

/// Distributed mirror lock.
#[derive(Clone)]
pub struct MirrorLock {
    /// Lease backend.
    backend: Arc<dyn LockBackend>,
    /// Acquisition settings.
    settings: LockSettings,
}

impl MirrorLock {
    /// Creates a mirror lock.
    #[must_use]
    pub fn new(backend: Arc<dyn LockBackend>, settings: LockSettings) -> Self {
        Self {
            backend,
            settings,
        }
    }

    /// Returns the lock settings.
    #[must_use]
    pub const fn settings(&self) -> &LockSettings {
        &self.settings
    }

    /// Acquires the lease, retrying up to the configured number of tries.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Exhausted`] when every attempt finds the lock held,
    /// or [`LockError::Backend`] when the backend fails.
    pub async fn acquire(&self) -> Result<LockLease, LockError> {
        let token = Uuid::new_v4().to_string();
        let tries = self.settings.tries.max(1);
        for attempt in 1 ..= tries {
            if self.backend.try_acquire(&self.settings.name, &token, self.settings.lease).await? {
                tracing::debug!(lock = %self.settings.name, attempt, "lock acquired");
                return Ok(LockLease {
                    name: self.settings.name.clone(),
                    token,
                });
            }
            if attempt < tries {
                let jitter = rand::thread_rng().gen_range(0 ..= LOCK_JITTER_MS);
                tokio::time::sleep(self.settings.retry_delay + Duration::from_millis(jitter))
                    .await;
            }
        }
        Err(LockError::Exhausted {
            name: self.settings.name.clone(),
            tries,
        })
    }

    /// Releases a held lease.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Backend`] when the backend fails.
    pub async fn release(&self, lease: &LockLease) -> Result<(), LockError> {
        let released = self.backend.release(&lease.name, &lease.token).await?;
        if released {
            tracing::debug!(lock = %lease.name, "lock released");
        } else {
            tracing::warn!(lock = %lease.name, "lock lease expired before release");
        }
        Ok(())
    }

    /// Runs `op` while holding the lease and releases it afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`LockError`] when the lease cannot be acquired; otherwise the
    /// operation's own result is returned unchanged.
    pub async fn run_exclusive<T, E, F, Fut>(&self, op: F) -> Result<Result<T, E>, LockError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let lease = self.acquire().await?;
        let result = op().await;
        if let Err(err) = self.release(&lease).await {
            tracing::error!(lock = %lease.name, error = %err, "failed to release lock");
        }
        Ok(result)
    }
}
