// crates/publisher-store-redis/src/lib.rs
// ============================================================================
// Module: Publisher Redis Store Library
// Description: Redis implementations of the publisher storage and broker seams.
// Purpose: Share job status, counters, locks, and the job stream across processes.
// Dependencies: publisher-core, redis, tokio
// ============================================================================

//! ## Overview
//! One multiplexed Redis connection backs the status store, the rate-limit
//! counters, the mirror lock, and the stream broker. Every type here is a
//! thin adapter from a `publisher-core` interface to Redis commands.
//! Invariants:
//! - Status writes use `SET NX EX` and `SET XX KEEPTTL`.
//! - Lock release compares the holder token atomically in a script.
//! - Stream consumers read their pending entries before new ones.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod connection;
pub mod counters;
pub mod lock;
pub mod status;
pub mod stream;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use connection::RedisConnectError;
pub use connection::connect;
pub use counters::RedisCounterStore;
pub use lock::RedisLock;
pub use status::RedisStatusStore;
pub use stream::DEFAULT_BLOCK_MS;
pub use stream::RedisStreamBroker;
pub use stream::RedisStreamSubscription;
pub use stream::StreamSettings;
