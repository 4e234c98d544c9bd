// crates/publisher-store-redis/src/counters.rs
// ============================================================================
// Module: Redis Counter Store
// Description: Fixed-window counters for the nightly rate limiter.
// Purpose: Count publishes per bucket across every worker process.
// Dependencies: publisher-core, redis
// ============================================================================

//! ## Overview
//! Counters are plain Redis integers. Prefix deletion walks the keyspace with
//! `SCAN MATCH` so resets never block the server.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use async_trait::async_trait;
use publisher_core::interfaces::CounterStore;
use publisher_core::interfaces::StoreError;
use redis::aio::MultiplexedConnection;

use crate::connection::escape_glob;
use crate::connection::ttl_secs;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Keys requested per `SCAN` page.
const SCAN_COUNT: u64 = 500;

// ============================================================================
// SECTION: Store
// ============================================================================

/// Counter store backed by Redis integers.
#[derive(Clone)]
pub struct RedisCounterStore {
    /// Shared multiplexed connection.
    conn: MultiplexedConnection,
}

impl RedisCounterStore {
    /// Wraps an open connection.
    #[must_use]
    pub const fn new(conn: MultiplexedConnection) -> Self {
        Self {
            conn,
        }
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn increment(&self, key: &str) -> Result<u64, StoreError> {
        let mut conn = self.conn.clone();
        let value: i64 = redis::cmd("INCR")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|err| StoreError::Backend(err.to_string()))?;
        u64::try_from(value).map_err(|_| StoreError::Corrupt(format!("negative counter {key}")))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("EXPIRE")
            .arg(key)
            .arg(ttl_secs(ttl))
            .query_async(&mut conn)
            .await
            .map_err(|err| StoreError::Backend(err.to_string()))?;
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<u64, StoreError> {
        let mut conn = self.conn.clone();
        let pattern = format!("{}*", escape_glob(prefix));
        let mut cursor: u64 = 0;
        let mut deleted: u64 = 0;
        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_COUNT)
                .query_async(&mut conn)
                .await
                .map_err(|err| StoreError::Backend(err.to_string()))?;
            if !keys.is_empty() {
                let removed: u64 = redis::cmd("DEL")
                    .arg(&keys)
                    .query_async(&mut conn)
                    .await
                    .map_err(|err| StoreError::Backend(err.to_string()))?;
                deleted += removed;
            }
            if next == 0 {
                break;
            }
            cursor = next;
        }
        tracing::debug!(prefix, deleted, "deleted counters by prefix");
        Ok(deleted)
    }
}
