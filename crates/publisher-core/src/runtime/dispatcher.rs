// crates/publisher-core/src/runtime/dispatcher.rs
// ============================================================================
// Module: Worker Dispatcher
// Description: Broker receive loop with a typed dispatch table.
// Purpose: Claim owned jobs, drive them to a terminal status, and notify failures.
// Dependencies: crate::{core, interfaces}, serde, tokio, tracing
// ============================================================================

//! ## Overview
//! A [`Worker`] owns one destination. For each delivery it matches the event
//! type against its handler table and, for mirror jobs, the subject against
//! its mirror name. Mismatches are NACKed without touching status. Matches are
//! marked `processing` with a set-if-present write, run, and finished as
//! `success`, `failed` (plus notification), or `canceled`.
//! Invariants:
//! - Status writes reuse the envelope id, so redeliveries are idempotent.
//! - A job with no prior status is treated as abandoned and skipped.
//! - Notification and terminal-status write failures are logged, never raised.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::core::Envelope;
use crate::core::EventType;
use crate::core::FsPublishRequest;
use crate::core::ImageCopyRequest;
use crate::core::JobStatus;
use crate::core::MultiArchCollectRequest;
use crate::core::PublishRequest;
use crate::core::RequestId;
use crate::interfaces::BrokerError;
use crate::interfaces::BrokerSubscription;
use crate::interfaces::FailureReport;
use crate::interfaces::Notifier;
use crate::interfaces::StatusStore;
use crate::runtime::error::PublishError;
use crate::runtime::fileserver::FileserverHandler;
use crate::runtime::image::ImageHandler;
use crate::runtime::mirror::MirrorHandler;
use crate::runtime::submitter::DEFAULT_STATUS_TTL;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Back-off after a transient broker receive failure.
const RECEIVE_RETRY_DELAY: Duration = Duration::from_secs(1);

// ============================================================================
// SECTION: Job Handlers
// ============================================================================

/// Destination-specific job execution.
#[async_trait]
pub(crate) trait JobHandler<T: Sync>: Sync {
    /// Runs the job and returns an optional structured result.
    async fn run(&self, id: &RequestId, request: &T) -> Result<Option<Value>, PublishError>;

    /// Builds the failure notification for the job.
    fn failure_report(&self, request: &T, error: &PublishError) -> FailureReport;
}

// ============================================================================
// SECTION: Dispositions
// ============================================================================

/// Broker-level outcome of one delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Job reached the carried terminal status.
    Completed(JobStatus),
    /// Job had no prior status and was skipped.
    Abandoned,
    /// Job is not owned by this worker.
    Rejected(&'static str),
}

impl Disposition {
    /// Returns true when the delivery should be acknowledged.
    #[must_use]
    pub const fn is_ack(&self) -> bool {
        !matches!(self, Self::Rejected(_))
    }
}

// ============================================================================
// SECTION: Worker
// ============================================================================

/// Shared worker dependencies.
#[derive(Clone)]
pub struct WorkerContext {
    /// Status store.
    pub status: Arc<dyn StatusStore>,
    /// Optional failure notifier.
    pub notifier: Option<Arc<dyn Notifier>>,
    /// TTL for structured results.
    pub status_ttl: Duration,
}

impl WorkerContext {
    /// Creates a context with the default TTL and no notifier.
    #[must_use]
    pub fn new(status: Arc<dyn StatusStore>) -> Self {
        Self {
            status,
            notifier: None,
            status_ttl: DEFAULT_STATUS_TTL,
        }
    }

    /// Sets the failure notifier.
    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Sets the status TTL.
    #[must_use]
    pub const fn with_status_ttl(mut self, ttl: Duration) -> Self {
        self.status_ttl = ttl;
        self
    }
}

/// Handler set owned by one worker process.
pub enum WorkerRole {
    /// Package mirror publisher.
    Mirror(MirrorHandler),
    /// Object-store fileserver publisher.
    Fileserver(FileserverHandler),
    /// Container registry copier and index collector.
    Image(ImageHandler),
}

/// Consumer-side dispatcher.
pub struct Worker {
    /// Shared dependencies.
    context: WorkerContext,
    /// Destination handler.
    role: WorkerRole,
}

impl Worker {
    /// Creates a worker for one destination.
    #[must_use]
    pub const fn new(context: WorkerContext, role: WorkerRole) -> Self {
        Self {
            context,
            role,
        }
    }

    /// Returns the event types this worker handles.
    #[must_use]
    pub fn supported_types(&self) -> Vec<EventType> {
        match self.role {
            WorkerRole::Mirror(_) => vec![EventType::TiupPublish],
            WorkerRole::Fileserver(_) => vec![EventType::FsPublish],
            WorkerRole::Image(_) => vec![EventType::ImageCopy, EventType::ImageMultiArchCollect],
        }
    }

    /// Handles one envelope and returns its broker disposition.
    pub async fn handle(&self, envelope: &Envelope) -> Disposition {
        match (envelope.event_type, &self.role) {
            (EventType::TiupPublish, WorkerRole::Mirror(handler)) => {
                if envelope.subject != handler.mirror_name() {
                    return Disposition::Rejected("subject is not this mirror");
                }
                self.process::<PublishRequest, _>(envelope, handler).await
            }
            (EventType::FsPublish, WorkerRole::Fileserver(handler)) => {
                self.process::<FsPublishRequest, _>(envelope, handler).await
            }
            (EventType::ImageCopy, WorkerRole::Image(handler)) => {
                self.process::<ImageCopyRequest, _>(envelope, handler).await
            }
            (EventType::ImageMultiArchCollect, WorkerRole::Image(handler)) => {
                self.process::<MultiArchCollectRequest, _>(envelope, handler).await
            }
            (
                EventType::TiupPublish
                | EventType::FsPublish
                | EventType::ImageCopy
                | EventType::ImageMultiArchCollect,
                _,
            ) => Disposition::Rejected("unsupported event type"),
        }
    }

    /// Runs the receive loop until `shutdown` resolves or the subscription closes.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::Closed`] when the subscription ends.
    pub async fn run<S, F>(&self, subscription: &mut S, shutdown: F) -> Result<(), BrokerError>
    where
        S: BrokerSubscription + ?Sized,
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            let delivery = tokio::select! {
                () = &mut shutdown => {
                    tracing::info!("worker shutting down");
                    return Ok(());
                }
                delivery = subscription.receive() => delivery,
            };
            let delivery = match delivery {
                Ok(delivery) => delivery,
                Err(BrokerError::Closed) => return Err(BrokerError::Closed),
                Err(err) => {
                    tracing::error!(error = %err, "broker receive failed");
                    tokio::time::sleep(RECEIVE_RETRY_DELAY).await;
                    continue;
                }
            };
            let disposition = self.handle(&delivery.envelope).await;
            let settled = if disposition.is_ack() {
                subscription.ack(&delivery).await
            } else {
                tracing::debug!(
                    request_id = %delivery.envelope.id,
                    event_type = %delivery.envelope.event_type,
                    subject = %delivery.envelope.subject,
                    "delivery rejected"
                );
                subscription.nack(&delivery).await
            };
            if let Err(err) = settled {
                tracing::error!(
                    request_id = %delivery.envelope.id,
                    error = %err,
                    "failed to settle delivery"
                );
            }
        }
    }

    /// Drives one owned job to a terminal status.
    async fn process<T, H>(&self, envelope: &Envelope, handler: &H) -> Disposition
    where
        T: DeserializeOwned + Send + Sync,
        H: JobHandler<T>,
    {
        let id = &envelope.id;
        match self.context.status.set_if_present(id, JobStatus::Processing).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(request_id = %id, "job has no status, skipping as abandoned");
                return Disposition::Abandoned;
            }
            Err(err) => {
                tracing::error!(request_id = %id, error = %err, "failed to mark job processing");
            }
        }
        tracing::info!(request_id = %id, event_type = %envelope.event_type, "job processing");

        let request: T = match envelope.decode_data() {
            Ok(request) => request,
            Err(err) => {
                let error = PublishError::from(err);
                let report = FailureReport {
                    title: "Publish Request Rejected".to_string(),
                    fields: vec![
                        ("request".to_string(), id.to_string()),
                        ("type".to_string(), envelope.event_type.to_string()),
                    ],
                    error: error.to_string(),
                };
                return self.finish(id, JobStatus::Failed, Some(report)).await;
            }
        };

        match handler.run(id, &request).await {
            Ok(result) => {
                if let Some(result) = result {
                    self.store_result(id, &result).await;
                }
                self.finish(id, JobStatus::Success, None).await
            }
            Err(PublishError::Canceled(reason)) => {
                tracing::warn!(request_id = %id, reason = %reason, "job canceled");
                self.finish(id, JobStatus::Canceled, None).await
            }
            Err(err) => {
                tracing::error!(request_id = %id, error = %err, "job failed");
                let report = handler.failure_report(&request, &err);
                self.finish(id, JobStatus::Failed, Some(report)).await
            }
        }
    }

    /// Writes the terminal status and sends the failure report, if any.
    async fn finish(
        &self,
        id: &RequestId,
        status: JobStatus,
        report: Option<FailureReport>,
    ) -> Disposition {
        match self.context.status.set_if_present(id, status).await {
            Ok(true) => tracing::info!(request_id = %id, status = %status, "job finished"),
            Ok(false) => {
                tracing::error!(request_id = %id, intended_status = %status, "job status vanished");
            }
            Err(err) => tracing::error!(
                request_id = %id,
                intended_status = %status,
                error = %err,
                "failed to write final status"
            ),
        }
        if let (Some(report), Some(notifier)) = (report, &self.context.notifier) {
            if let Err(err) = notifier.notify(&report).await {
                tracing::warn!(request_id = %id, error = %err, "failure notification not delivered");
            }
        }
        Disposition::Completed(status)
    }

    /// Stores a structured job result next to the status.
    async fn store_result(&self, id: &RequestId, result: &Value) {
        let payload = match serde_json::to_string(result) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::error!(request_id = %id, error = %err, "failed to encode job result");
                return;
            }
        };
        if let Err(err) = self.context.status.put_result(id, &payload, self.context.status_ttl).await
        {
            tracing::error!(request_id = %id, error = %err, "failed to store job result");
        }
    }
}
