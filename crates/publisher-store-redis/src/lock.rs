// crates/publisher-store-redis/src/lock.rs
// ============================================================================
// Module: Redis Lock Backend
// Description: Lease-based mutual exclusion on a single Redis key.
// Purpose: Serialize mirror publishes across worker processes.
// Dependencies: publisher-core, redis
// ============================================================================

//! ## Overview
//! Acquisition is `SET name token NX PX lease`. Release runs a compare-and-delete
//! script so an expired holder can never remove a successor's lease.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use async_trait::async_trait;
use publisher_core::interfaces::LockBackend;
use publisher_core::interfaces::LockError;
use redis::aio::MultiplexedConnection;

use crate::connection::ttl_millis;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Deletes the key only when it still holds the caller's token.
const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
end
return 0
"#;

// ============================================================================
// SECTION: Lock
// ============================================================================

/// Lock backend backed by Redis keys with millisecond leases.
#[derive(Clone)]
pub struct RedisLock {
    /// Shared multiplexed connection.
    conn: MultiplexedConnection,
    /// Compiled release script.
    release: redis::Script,
}

impl RedisLock {
    /// Wraps an open connection.
    #[must_use]
    pub fn new(conn: MultiplexedConnection) -> Self {
        Self {
            conn,
            release: redis::Script::new(RELEASE_SCRIPT),
        }
    }
}

#[async_trait]
impl LockBackend for RedisLock {
    async fn try_acquire(
        &self,
        name: &str,
        token: &str,
        lease: Duration,
    ) -> Result<bool, LockError> {
        let mut conn = self.conn.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(name)
            .arg(token)
            .arg("NX")
            .arg("PX")
            .arg(ttl_millis(lease))
            .query_async(&mut conn)
            .await
            .map_err(|err| LockError::Backend(err.to_string()))?;
        Ok(reply.is_some())
    }

    async fn release(&self, name: &str, token: &str) -> Result<bool, LockError> {
        let mut conn = self.conn.clone();
        let removed: i64 = self
            .release
            .key(name)
            .arg(token)
            .invoke_async(&mut conn)
            .await
            .map_err(|err| LockError::Backend(err.to_string()))?;
        Ok(removed == 1)
    }
}
