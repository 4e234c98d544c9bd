// crates/publisher-store-redis/src/stream.rs
// ============================================================================
// Module: Redis Stream Broker
// Description: Job envelopes on a Redis stream read through consumer groups.
// Purpose: Deliver publish jobs at least once to worker processes.
// Dependencies: publisher-core, redis, tracing
// ============================================================================

//! ## Overview
//! Producers append each envelope as an entry with `id` and `data` fields in a
//! single atomic pipeline per batch. Workers read through a consumer group;
//! an entry stays pending until it is acknowledged, so a crashed worker gets
//! its pending entries back on restart.
//! Invariants:
//! - A batch is appended atomically or not at all.
//! - Pending entries are replayed before new entries are read.
//! - Undecodable entries are acknowledged and logged so they cannot wedge a
//!   consumer.
//!
//! Each worker owns its consumer group. A negative acknowledgment removes the
//! entry from that group only; workers in other groups still see it.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::VecDeque;

use async_trait::async_trait;
use publisher_core::Envelope;
use publisher_core::interfaces::BrokerError;
use publisher_core::interfaces::BrokerProducer;
use publisher_core::interfaces::BrokerSubscription;
use publisher_core::interfaces::Delivery;
use redis::aio::MultiplexedConnection;
use redis::streams::StreamId;
use redis::streams::StreamReadReply;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default blocking read timeout in milliseconds.
pub const DEFAULT_BLOCK_MS: u64 = 5_000;
/// Entries requested per read.
const READ_COUNT: usize = 16;
/// Stream entry field holding the envelope JSON.
const DATA_FIELD: &str = "data";
/// Stream entry field holding the envelope id.
const ID_FIELD: &str = "id";
/// Read cursor for this consumer's pending entries.
const PENDING_CURSOR: &str = "0";
/// Read cursor for entries never delivered to the group.
const NEW_CURSOR: &str = ">";

// ============================================================================
// SECTION: Settings
// ============================================================================

/// Stream and consumer identity for a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSettings {
    /// Stream key.
    pub stream: String,
    /// Consumer group name.
    pub group: String,
    /// Consumer name within the group.
    pub consumer: String,
    /// Blocking read timeout in milliseconds.
    pub block_ms: u64,
}

// ============================================================================
// SECTION: Producer
// ============================================================================

/// Broker producer appending envelopes to a Redis stream.
#[derive(Clone)]
pub struct RedisStreamBroker {
    /// Shared multiplexed connection.
    conn: MultiplexedConnection,
    /// Stream key.
    stream: String,
}

impl RedisStreamBroker {
    /// Creates a producer for `stream`.
    #[must_use]
    pub fn new(conn: MultiplexedConnection, stream: impl Into<String>) -> Self {
        Self {
            conn,
            stream: stream.into(),
        }
    }

    /// Joins a consumer group, creating the group and stream when missing.
    ///
    /// `conn` must be dedicated to this subscription because blocking reads
    /// stall every other command sharing the connection.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::Backend`] when the group cannot be created.
    pub async fn subscribe(
        conn: MultiplexedConnection,
        settings: StreamSettings,
    ) -> Result<RedisStreamSubscription, BrokerError> {
        let mut conn = conn;
        let created: Result<String, redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&settings.stream)
            .arg(&settings.group)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;
        match created {
            Ok(_) => {
                tracing::info!(stream = %settings.stream, group = %settings.group, "created consumer group");
            }
            Err(err) if err.to_string().contains("BUSYGROUP") => {
                tracing::debug!(stream = %settings.stream, group = %settings.group, "consumer group exists");
            }
            Err(err) => return Err(BrokerError::Backend(err.to_string())),
        }
        Ok(RedisStreamSubscription {
            conn,
            settings,
            pending_drained: false,
            buffer: VecDeque::new(),
        })
    }
}

#[async_trait]
impl BrokerProducer for RedisStreamBroker {
    async fn publish_batch(&self, envelopes: &[Envelope]) -> Result<(), BrokerError> {
        if envelopes.is_empty() {
            return Ok(());
        }
        let mut pipe = redis::pipe();
        pipe.atomic();
        for envelope in envelopes {
            let json = envelope.to_json().map_err(|err| BrokerError::Codec(err.to_string()))?;
            pipe.cmd("XADD")
                .arg(&self.stream)
                .arg("*")
                .arg(ID_FIELD)
                .arg(envelope.id.as_str())
                .arg(DATA_FIELD)
                .arg(json)
                .ignore();
        }
        let mut conn = self.conn.clone();
        let _: () = pipe
            .query_async(&mut conn)
            .await
            .map_err(|err| BrokerError::Backend(err.to_string()))?;
        tracing::debug!(stream = %self.stream, count = envelopes.len(), "published envelope batch");
        Ok(())
    }
}

// ============================================================================
// SECTION: Subscription
// ============================================================================

/// Consumer-group reader over a Redis stream.
pub struct RedisStreamSubscription {
    /// Dedicated connection for blocking reads.
    conn: MultiplexedConnection,
    /// Stream and consumer identity.
    settings: StreamSettings,
    /// Whether this consumer's pending entries have been replayed.
    pending_drained: bool,
    /// Decoded deliveries not yet handed out.
    buffer: VecDeque<Delivery>,
}

impl RedisStreamSubscription {
    /// Reads one page from the group and buffers decodable entries.
    async fn fill(&mut self) -> Result<(), BrokerError> {
        let cursor = if self.pending_drained { NEW_CURSOR } else { PENDING_CURSOR };
        let mut cmd = redis::cmd("XREADGROUP");
        cmd.arg("GROUP")
            .arg(&self.settings.group)
            .arg(&self.settings.consumer)
            .arg("COUNT")
            .arg(READ_COUNT);
        if self.pending_drained {
            cmd.arg("BLOCK").arg(self.settings.block_ms);
        }
        cmd.arg("STREAMS").arg(&self.settings.stream).arg(cursor);
        let reply: Option<StreamReadReply> = cmd
            .query_async(&mut self.conn)
            .await
            .map_err(|err| BrokerError::Backend(err.to_string()))?;
        let entries: Vec<StreamId> =
            reply.map(|reply| reply.keys.into_iter().flat_map(|key| key.ids).collect()).unwrap_or_default();
        if !self.pending_drained && entries.is_empty() {
            self.pending_drained = true;
            tracing::debug!(consumer = %self.settings.consumer, "pending entries replayed");
            return Ok(());
        }
        for entry in entries {
            match decode_entry(&entry) {
                Ok(envelope) => self.buffer.push_back(Delivery {
                    receipt: entry.id,
                    envelope,
                }),
                Err(err) => {
                    tracing::error!(entry_id = %entry.id, error = %err, "dropping undecodable stream entry");
                    self.acknowledge(&entry.id).await?;
                }
            }
        }
        Ok(())
    }

    /// Acknowledges one entry within this consumer's group.
    async fn acknowledge(&mut self, entry_id: &str) -> Result<(), BrokerError> {
        let _: i64 = redis::cmd("XACK")
            .arg(&self.settings.stream)
            .arg(&self.settings.group)
            .arg(entry_id)
            .query_async(&mut self.conn)
            .await
            .map_err(|err| BrokerError::Backend(err.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl BrokerSubscription for RedisStreamSubscription {
    async fn receive(&mut self) -> Result<Delivery, BrokerError> {
        loop {
            if let Some(delivery) = self.buffer.pop_front() {
                return Ok(delivery);
            }
            self.fill().await?;
        }
    }

    async fn ack(&mut self, delivery: &Delivery) -> Result<(), BrokerError> {
        self.acknowledge(&delivery.receipt).await
    }

    async fn nack(&mut self, delivery: &Delivery) -> Result<(), BrokerError> {
        tracing::debug!(
            request_id = %delivery.envelope.id,
            event_type = %delivery.envelope.event_type,
            subject = %delivery.envelope.subject,
            group = %self.settings.group,
            "declined stream entry"
        );
        self.acknowledge(&delivery.receipt).await
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Decodes the envelope carried in a stream entry.
fn decode_entry(entry: &StreamId) -> Result<Envelope, BrokerError> {
    let raw: String = entry
        .get(DATA_FIELD)
        .ok_or_else(|| BrokerError::Codec(format!("entry {} has no {DATA_FIELD} field", entry.id)))?;
    Envelope::from_json(&raw).map_err(|err| BrokerError::Codec(err.to_string()))
}
