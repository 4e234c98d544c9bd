// crates/publisher-core/src/runtime/mod.rs
// ============================================================================
// Module: Publisher Runtime
// Description: Submission, dispatch, and job execution for the pipeline.
// Purpose: Drive publish jobs from request to terminal status.
// Dependencies: crate::{core, derive, interfaces}
// ============================================================================

//! ## Overview
//! The runtime wires the submitter, worker dispatcher, and destination
//! handlers to the backend interfaces. Rate limiting, the mirror lock, and
//! retry policy are runtime concerns layered around the transfer seams.

pub mod dispatcher;
pub mod error;
pub mod fileserver;
pub mod image;
pub mod lock;
pub mod memory;
pub mod mirror;
pub mod ratelimit;
pub mod retry;
pub mod submitter;

pub use dispatcher::Disposition;
pub use dispatcher::Worker;
pub use dispatcher::WorkerContext;
pub use dispatcher::WorkerRole;
pub use error::PublishError;
pub use fileserver::FileserverHandler;
pub use image::DEFAULT_COLLECT_TIMEOUT;
pub use image::DEFAULT_COPY_TIMEOUT;
pub use image::ImageHandler;
pub use lock::DEFAULT_LOCK_LEASE;
pub use lock::DEFAULT_LOCK_RETRY_DELAY;
pub use lock::DEFAULT_LOCK_TRIES;
pub use lock::DEFAULT_MIRROR_LOCK_NAME;
pub use lock::LockLease;
pub use lock::LockSettings;
pub use lock::MirrorLock;
pub use memory::InMemoryBroker;
pub use memory::InMemoryCounterStore;
pub use memory::InMemoryLock;
pub use memory::InMemoryStatusStore;
pub use memory::InMemorySubscription;
pub use mirror::MirrorHandler;
pub use ratelimit::DEFAULT_NIGHTLY_WINDOW;
pub use ratelimit::MIRROR_RATE_LIMIT_CLASS;
pub use ratelimit::RATE_LIMIT_PREFIX;
pub use ratelimit::RateDecision;
pub use ratelimit::RateLimitKey;
pub use ratelimit::RateLimiter;
pub use retry::DEFAULT_PUBLISH_ATTEMPTS;
pub use retry::DEFAULT_PUBLISH_RETRY_DELAY;
pub use retry::RetryPolicy;
pub use submitter::DEFAULT_STATUS_TTL;
pub use submitter::Submitter;
pub use submitter::SubmitterBuilder;
