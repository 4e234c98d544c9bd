// crates/publisher-core/src/runtime/submitter.rs
// ============================================================================
// Module: Job Submitter
// Description: Event composition, broker publish, and status seeding.
// Purpose: Turn caller requests into durable, uniquely identified jobs.
// Dependencies: crate::{core, derive, interfaces}, tracing
// ============================================================================

//! ## Overview
//! Every caller request becomes one broker batch. Only after the broker accepts
//! the batch is each job seeded as `queued` with a set-if-absent write, so a
//! job a worker already claimed is never regressed.
//! Invariants:
//! - Envelope ids are minted once here and returned to the caller.
//! - A broker failure creates no status entries.
//! - Zero derived requests is a successful, empty submission.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use crate::core::Envelope;
use crate::core::EventType;
use crate::core::ImageCopyRequest;
use crate::core::JobStatus;
use crate::core::MultiArchCollectRequest;
use crate::core::PublishRequest;
use crate::core::RequestId;
use crate::derive::DeliveryRules;
use crate::derive::derive_fs_publish_info;
use crate::derive::derive_publish_requests;
use crate::derive::split_repo_and_tag;
use crate::interfaces::ArtifactRegistry;
use crate::interfaces::BrokerProducer;
use crate::interfaces::StatusStore;
use crate::runtime::error::PublishError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default status TTL.
pub const DEFAULT_STATUS_TTL: Duration = Duration::from_secs(12 * 60 * 60);

// ============================================================================
// SECTION: Submitter
// ============================================================================

/// Producer-side entry point of the pipeline.
#[derive(Clone)]
pub struct Submitter {
    /// Broker producer.
    broker: Arc<dyn BrokerProducer>,
    /// Status store.
    status: Arc<dyn StatusStore>,
    /// Artifact metadata reader.
    registry: Arc<dyn ArtifactRegistry>,
    /// Envelope source identifier.
    source: String,
    /// Status TTL.
    status_ttl: Duration,
    /// Delivery rule table.
    rules: DeliveryRules,
}

/// Builder for [`Submitter`].
pub struct SubmitterBuilder {
    /// Broker producer.
    broker: Arc<dyn BrokerProducer>,
    /// Status store.
    status: Arc<dyn StatusStore>,
    /// Artifact metadata reader.
    registry: Arc<dyn ArtifactRegistry>,
    /// Envelope source identifier.
    source: String,
    /// Status TTL.
    status_ttl: Duration,
    /// Delivery rule table.
    rules: DeliveryRules,
}

impl SubmitterBuilder {
    /// Sets the envelope source identifier.
    #[must_use]
    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Sets the status TTL.
    #[must_use]
    pub const fn status_ttl(mut self, ttl: Duration) -> Self {
        self.status_ttl = ttl;
        self
    }

    /// Sets the delivery rule table.
    #[must_use]
    pub fn rules(mut self, rules: DeliveryRules) -> Self {
        self.rules = rules;
        self
    }

    /// Builds the submitter.
    #[must_use]
    pub fn build(self) -> Submitter {
        Submitter {
            broker: self.broker,
            status: self.status,
            registry: self.registry,
            source: self.source,
            status_ttl: self.status_ttl,
            rules: self.rules,
        }
    }
}

impl Submitter {
    /// Starts a submitter builder.
    #[must_use]
    pub fn builder(
        broker: Arc<dyn BrokerProducer>,
        status: Arc<dyn StatusStore>,
        registry: Arc<dyn ArtifactRegistry>,
    ) -> SubmitterBuilder {
        SubmitterBuilder {
            broker,
            status,
            registry,
            source: "publisher".to_string(),
            status_ttl: DEFAULT_STATUS_TTL,
            rules: DeliveryRules::default(),
        }
    }

    /// Publishes envelopes as one batch, then seeds each status as `queued`.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::Broker`] when the batch is rejected and
    /// [`PublishError::Store`] when a status cannot be seeded.
    pub async fn submit_envelopes(
        &self,
        envelopes: Vec<Envelope>,
    ) -> Result<Vec<RequestId>, PublishError> {
        if envelopes.is_empty() {
            return Ok(Vec::new());
        }
        self.broker.publish_batch(&envelopes).await?;
        let mut ids = Vec::with_capacity(envelopes.len());
        for envelope in envelopes {
            let seeded =
                self.status.set_if_absent(&envelope.id, JobStatus::Queued, self.status_ttl).await?;
            if !seeded {
                tracing::debug!(request_id = %envelope.id, "status already present, not reseeded");
            }
            tracing::info!(
                request_id = %envelope.id,
                event_type = %envelope.event_type,
                subject = %envelope.subject,
                "job enqueued"
            );
            ids.push(envelope.id);
        }
        Ok(ids)
    }

    /// Submits caller-supplied mirror publish requests.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::Input`] when a request lacks a required field,
    /// otherwise see [`Submitter::submit_envelopes`].
    pub async fn submit_requests(
        &self,
        requests: Vec<PublishRequest>,
    ) -> Result<Vec<RequestId>, PublishError> {
        let envelopes = requests
            .iter()
            .map(|request| {
                if let Some(field) = request.missing_field() {
                    return Err(PublishError::Input(format!("publish request missing {field}")));
                }
                Ok(Envelope::compose(
                    EventType::TiupPublish,
                    &self.source,
                    &request.target,
                    request,
                )?)
            })
            .collect::<Result<Vec<_>, PublishError>>()?;
        self.submit_envelopes(envelopes).await
    }

    /// Derives the mirror publish requests of an artifact without submitting.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::Input`] for malformed references or metadata and
    /// [`PublishError::Transfer`] when the registry cannot be read.
    pub async fn derive_requests(
        &self,
        artifact_url: &str,
        mirror: &str,
        version: Option<&str>,
    ) -> Result<Vec<PublishRequest>, PublishError> {
        let (repo, tag) = split_repo_and_tag(artifact_url)?;
        let metadata = self.registry.fetch_metadata(&repo, &tag).await?;
        let mut requests = derive_publish_requests(&repo, &tag, &metadata, mirror)?;
        if let Some(version) = version.filter(|version| !version.trim().is_empty()) {
            for request in &mut requests {
                request.publish.version = version.to_string();
            }
        }
        Ok(requests)
    }

    /// Derives and submits mirror publish jobs for one artifact.
    ///
    /// # Errors
    ///
    /// See [`Submitter::derive_requests`] and [`Submitter::submit_envelopes`].
    pub async fn submit_tiup(
        &self,
        artifact_url: &str,
        mirror: &str,
        version: Option<&str>,
    ) -> Result<Vec<RequestId>, PublishError> {
        let requests = self.derive_requests(artifact_url, mirror, version).await?;
        if requests.is_empty() {
            tracing::info!(artifact = %artifact_url, "artifact bundles no packages");
        }
        self.submit_requests(requests).await
    }

    /// Fans an artifact out through the delivery rules and submits one batch.
    ///
    /// # Errors
    ///
    /// See [`Submitter::derive_requests`] and [`Submitter::submit_envelopes`].
    pub async fn submit_by_rules(&self, artifact_url: &str) -> Result<Vec<RequestId>, PublishError> {
        let instructions = self.rules.instructions(artifact_url)?;
        let mut requests = Vec::new();
        for instruction in &instructions {
            tracing::debug!(
                mirror = %instruction.mirror,
                artifact = %instruction.artifact_url,
                "delivery rule matched"
            );
            requests.extend(
                self.derive_requests(
                    &instruction.artifact_url,
                    &instruction.mirror,
                    instruction.version.as_deref(),
                )
                .await?,
            );
        }
        self.submit_requests(requests).await
    }

    /// Derives and submits a fileserver publish job.
    ///
    /// # Errors
    ///
    /// See [`Submitter::derive_requests`] and [`Submitter::submit_envelopes`].
    pub async fn submit_fs(&self, artifact_url: &str) -> Result<Vec<RequestId>, PublishError> {
        let (repo, tag) = split_repo_and_tag(artifact_url)?;
        let metadata = self.registry.fetch_metadata(&repo, &tag).await?;
        let request = derive_fs_publish_info(&repo, &tag, &metadata)?;
        let envelope = Envelope::compose(
            EventType::FsPublish,
            &self.source,
            &request.publish.repo,
            &request,
        )?;
        self.submit_envelopes(vec![envelope]).await
    }

    /// Submits a registry-to-registry image copy job.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::Input`] for malformed references, otherwise see
    /// [`Submitter::submit_envelopes`].
    pub async fn submit_image_copy(
        &self,
        source: &str,
        destination: &str,
    ) -> Result<RequestId, PublishError> {
        split_repo_and_tag(source)?;
        let (dest_repo, _) = split_repo_and_tag(destination)?;
        let request = ImageCopyRequest {
            source: source.to_string(),
            destination: destination.to_string(),
        };
        let envelope = Envelope::compose(EventType::ImageCopy, &self.source, dest_repo, &request)?;
        self.single(envelope).await
    }

    /// Submits a multi-arch image index collection job.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::Input`] for malformed references, otherwise see
    /// [`Submitter::submit_envelopes`].
    pub async fn submit_multiarch_collect(
        &self,
        image_url: &str,
        release_tag_suffix: &str,
    ) -> Result<RequestId, PublishError> {
        let (repo, _) = split_repo_and_tag(image_url)?;
        let request = MultiArchCollectRequest {
            image_url: image_url.to_string(),
            release_tag_suffix: release_tag_suffix.to_string(),
        };
        let envelope =
            Envelope::compose(EventType::ImageMultiArchCollect, &self.source, repo, &request)?;
        self.single(envelope).await
    }

    /// Returns the status of a job.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::NotFound`] for unknown or expired ids.
    pub async fn status(&self, id: &RequestId) -> Result<JobStatus, PublishError> {
        self.status.get(id).await?.ok_or_else(|| PublishError::NotFound(id.to_string()))
    }

    /// Returns the structured result of a job.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::NotFound`] when no result is stored.
    pub async fn result(&self, id: &RequestId) -> Result<String, PublishError> {
        self.status.get_result(id).await?.ok_or_else(|| PublishError::NotFound(id.result_key()))
    }

    /// Submits one envelope and returns its id.
    async fn single(&self, envelope: Envelope) -> Result<RequestId, PublishError> {
        let id = envelope.id.clone();
        self.submit_envelopes(vec![envelope]).await?;
        Ok(id)
    }
}
