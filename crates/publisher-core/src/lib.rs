// crates/publisher-core/src/lib.rs
// ============================================================================
// Module: Publisher Core Library
// Description: Event-driven artifact publish pipeline core.
// Purpose: Derive, submit, dispatch, and execute artifact publish jobs.
// Dependencies: async-trait, regex, serde, tokio, tracing
// ============================================================================

//! ## Overview
//! Publisher core turns freshly pushed OCI artifacts into asynchronous publish
//! jobs and drives them to a terminal status. It owns the pure derivation
//! rules, the envelope and status types, the backend seams, and the runtime
//! (submitter, worker dispatcher, rate limiter, mirror lock, handlers).
//! Invariants:
//! - Job status is seeded `queued` only after the broker accepts the batch.
//! - Terminal statuses are `success`, `failed`, and `canceled`.
//! - Backends are reached only through [`interfaces`].

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod derive;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use crate::core::ArtifactSource;
pub use crate::core::Envelope;
pub use crate::core::EventType;
pub use crate::core::FsPublishRequest;
pub use crate::core::ImageCopyRequest;
pub use crate::core::JobStatus;
pub use crate::core::MultiArchCollectRequest;
pub use crate::core::MultiArchCollectResult;
pub use crate::core::OciSource;
pub use crate::core::PublishInfo;
pub use crate::core::PublishRequest;
pub use crate::core::RequestId;
pub use crate::derive::DeliveryRule;
pub use crate::derive::DeliveryRules;
pub use crate::derive::DeriveError;
pub use crate::runtime::PublishError;
pub use crate::runtime::Submitter;
pub use crate::runtime::Worker;
pub use crate::runtime::WorkerContext;
pub use crate::runtime::WorkerRole;
