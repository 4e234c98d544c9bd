// crates/publisher-store-redis/src/status.rs
// ============================================================================
// Module: Redis Status Store
// Description: Job status and result records in Redis strings.
// Purpose: Share job state between submitters, workers, and status readers.
// Dependencies: publisher-core, redis
// ============================================================================

//! ## Overview
//! Status lives under the request id and results under `{id}-result`, both
//! with the TTL supplied by the caller.
//! Invariants:
//! - Seeding uses `SET NX EX`; transitions use `SET XX KEEPTTL`.
//! - An expired record is indistinguishable from an unknown id.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use async_trait::async_trait;
use publisher_core::JobStatus;
use publisher_core::RequestId;
use publisher_core::interfaces::StatusStore;
use publisher_core::interfaces::StoreError;
use redis::aio::MultiplexedConnection;

use crate::connection::ttl_secs;

// ============================================================================
// SECTION: Store
// ============================================================================

/// Status store backed by Redis string keys.
#[derive(Clone)]
pub struct RedisStatusStore {
    /// Shared multiplexed connection.
    conn: MultiplexedConnection,
}

impl RedisStatusStore {
    /// Wraps an open connection.
    #[must_use]
    pub const fn new(conn: MultiplexedConnection) -> Self {
        Self {
            conn,
        }
    }
}

#[async_trait]
impl StatusStore for RedisStatusStore {
    async fn set_if_absent(
        &self,
        id: &RequestId,
        status: JobStatus,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(id.as_str())
            .arg(status.as_str())
            .arg("NX")
            .arg("EX")
            .arg(ttl_secs(ttl))
            .query_async(&mut conn)
            .await
            .map_err(|err| StoreError::Backend(err.to_string()))?;
        Ok(reply.is_some())
    }

    async fn set_if_present(&self, id: &RequestId, status: JobStatus) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(id.as_str())
            .arg(status.as_str())
            .arg("XX")
            .arg("KEEPTTL")
            .query_async(&mut conn)
            .await
            .map_err(|err| StoreError::Backend(err.to_string()))?;
        Ok(reply.is_some())
    }

    async fn get(&self, id: &RequestId) -> Result<Option<JobStatus>, StoreError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = redis::cmd("GET")
            .arg(id.as_str())
            .query_async(&mut conn)
            .await
            .map_err(|err| StoreError::Backend(err.to_string()))?;
        raw.map(|value| {
            value.parse::<JobStatus>().map_err(|err| StoreError::Corrupt(err.to_string()))
        })
        .transpose()
    }

    async fn put_result(
        &self,
        id: &RequestId,
        payload: &str,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("SET")
            .arg(id.result_key())
            .arg(payload)
            .arg("EX")
            .arg(ttl_secs(ttl))
            .query_async(&mut conn)
            .await
            .map_err(|err| StoreError::Backend(err.to_string()))?;
        Ok(())
    }

    async fn get_result(&self, id: &RequestId) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        redis::cmd("GET")
            .arg(id.result_key())
            .query_async(&mut conn)
            .await
            .map_err(|err| StoreError::Backend(err.to_string()))
    }
}
