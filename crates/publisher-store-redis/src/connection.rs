// crates/publisher-store-redis/src/connection.rs
// ============================================================================
// Module: Redis Connection
// Description: Connection setup and command argument helpers.
// Purpose: Open one multiplexed connection shared by every Redis adapter.
// Dependencies: redis, thiserror, tokio, tracing
// ============================================================================

//! ## Overview
//! Opens a multiplexed async connection with bounded exponential back-off and
//! provides the TTL and glob helpers the adapters share.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use redis::aio::MultiplexedConnection;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Connection attempts before giving up.
const CONNECT_ATTEMPTS: u32 = 5;
/// Initial back-off between connection attempts.
const CONNECT_BACKOFF: Duration = Duration::from_millis(200);

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Redis connection errors.
#[derive(Debug, Clone, Error)]
pub enum RedisConnectError {
    /// URL could not be parsed.
    #[error("invalid redis url: {0}")]
    InvalidUrl(String),
    /// Server could not be reached.
    #[error("failed to connect to redis after {attempts} attempts: {message}")]
    Unreachable {
        /// Attempts made.
        attempts: u32,
        /// Last error.
        message: String,
    },
}

// ============================================================================
// SECTION: Connection
// ============================================================================

/// Opens a multiplexed connection, retrying with exponential back-off.
///
/// # Errors
///
/// Returns [`RedisConnectError`] when the URL is invalid or every attempt fails.
pub async fn connect(url: &str) -> Result<MultiplexedConnection, RedisConnectError> {
    let client =
        redis::Client::open(url).map_err(|err| RedisConnectError::InvalidUrl(err.to_string()))?;
    let mut delay = CONNECT_BACKOFF;
    let mut last = String::new();
    for attempt in 1 ..= CONNECT_ATTEMPTS {
        match client.get_multiplexed_async_connection().await {
            Ok(conn) => {
                tracing::info!(attempt, "connected to redis");
                return Ok(conn);
            }
            Err(err) => {
                tracing::warn!(attempt, max_attempts = CONNECT_ATTEMPTS, error = %err, "redis connection failed");
                last = err.to_string();
                if attempt < CONNECT_ATTEMPTS {
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
            }
        }
    }
    Err(RedisConnectError::Unreachable {
        attempts: CONNECT_ATTEMPTS,
        message: last,
    })
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns a TTL in whole seconds, rounded up and at least one.
pub(crate) fn ttl_secs(ttl: Duration) -> u64 {
    let secs = ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0);
    secs.max(1)
}

/// Returns a TTL in milliseconds, at least one.
pub(crate) fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

/// Escapes glob metacharacters so a prefix matches literally in `SCAN MATCH`.
pub(crate) fn escape_glob(prefix: &str) -> String {
    let mut escaped = String::with_capacity(prefix.len());
    for ch in prefix.chars() {
        if matches!(ch, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}
