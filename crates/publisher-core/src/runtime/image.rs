// crates/publisher-core/src/runtime/image.rs
// ============================================================================
// Module: Image Handler
// Description: Registry image copy and multi-arch index collection.
// Purpose: Execute container image jobs with bounded deadlines.
// Dependencies: crate::{core, derive, interfaces}, serde_json, tokio, tracing
// ============================================================================

//! ## Overview
//! Image copy jobs replicate one reference to another and record the
//! destination as the job result. Multi-arch collection jobs look up the
//! sibling architecture of a freshly pushed `_linux_<arch>` tag and, once both
//! exist, push an image index under the derived alias tags.
//! Invariants:
//! - Copies are bounded by the copy timeout, collection by the collect timeout.
//! - A collection with a single architecture stores an empty result.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::core::ImageCopyRequest;
use crate::core::MultiArchCollectRequest;
use crate::core::MultiArchCollectResult;
use crate::core::RequestId;
use crate::derive::compute_base_tags;
use crate::derive::sibling_arch_tag;
use crate::derive::split_repo_and_tag;
use crate::interfaces::FailureReport;
use crate::interfaces::ImageRegistry;
use crate::interfaces::TransferError;
use crate::runtime::dispatcher::JobHandler;
use crate::runtime::error::PublishError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default deadline for an image copy.
pub const DEFAULT_COPY_TIMEOUT: Duration = Duration::from_secs(10 * 60);
/// Default deadline for a multi-arch collection.
pub const DEFAULT_COLLECT_TIMEOUT: Duration = Duration::from_secs(60);

// ============================================================================
// SECTION: Handler
// ============================================================================

/// Image job handler.
pub struct ImageHandler {
    /// Registry client.
    registry: Arc<dyn ImageRegistry>,
    /// Copy deadline.
    copy_timeout: Duration,
    /// Collection deadline.
    collect_timeout: Duration,
}

impl ImageHandler {
    /// Creates an image handler with default deadlines.
    #[must_use]
    pub fn new(registry: Arc<dyn ImageRegistry>) -> Self {
        Self {
            registry,
            copy_timeout: DEFAULT_COPY_TIMEOUT,
            collect_timeout: DEFAULT_COLLECT_TIMEOUT,
        }
    }

    /// Overrides both deadlines.
    #[must_use]
    pub const fn with_timeouts(mut self, copy: Duration, collect: Duration) -> Self {
        self.copy_timeout = copy;
        self.collect_timeout = collect;
        self
    }

    /// Collects the architectures of `image_url` into one index.
    async fn collect(
        &self,
        request: &MultiArchCollectRequest,
    ) -> Result<MultiArchCollectResult, PublishError> {
        let (repo, tag) = split_repo_and_tag(&request.image_url)?;
        let mut arch_tags = vec![tag.clone()];
        if let Some(sibling) = sibling_arch_tag(&tag) {
            if self.registry.manifest_digest(&repo, &sibling).await?.is_some() {
                arch_tags.push(sibling);
            }
        }
        if arch_tags.len() < 2 {
            tracing::info!(
                image = %request.image_url,
                "sibling architecture not pushed yet, skipping index"
            );
            return Ok(MultiArchCollectResult {
                repo,
                ..MultiArchCollectResult::default()
            });
        }

        arch_tags.sort();
        let mut manifests = Vec::with_capacity(arch_tags.len());
        for arch_tag in &arch_tags {
            let digest = self.registry.manifest_digest(&repo, arch_tag).await?.ok_or_else(|| {
                TransferError::Registry(format!("manifest {repo}:{arch_tag} disappeared"))
            })?;
            manifests.push(format!("{repo}@{digest}"));
        }
        let tags = compute_base_tags(&tag, &request.release_tag_suffix)?;
        self.registry.push_index(&repo, &tags, &manifests).await?;
        tracing::info!(repo = %repo, tags = %tags.join(","), "multi-arch index pushed");
        Ok(MultiArchCollectResult {
            repo,
            tags,
            manifests,
        })
    }
}

/// Bounds `future` by `limit`, reporting `operation` on expiry.
async fn bounded<T, F>(operation: &str, limit: Duration, future: F) -> Result<T, PublishError>
where
    F: Future<Output = Result<T, PublishError>>,
{
    match tokio::time::timeout(limit, future).await {
        Ok(outcome) => outcome,
        Err(_) => Err(PublishError::from(TransferError::Timeout(format!(
            "{operation} exceeded {}s",
            limit.as_secs()
        )))),
    }
}

#[async_trait]
impl JobHandler<ImageCopyRequest> for ImageHandler {
    async fn run(
        &self,
        id: &RequestId,
        request: &ImageCopyRequest,
    ) -> Result<Option<Value>, PublishError> {
        if request.source.is_empty() || request.destination.is_empty() {
            return Err(PublishError::Input("missing source or destination".to_string()));
        }
        bounded("image copy", self.copy_timeout, async {
            self.registry
                .copy(&request.source, &request.destination)
                .await
                .map_err(PublishError::from)
        })
        .await?;
        tracing::info!(
            request_id = %id,
            source = %request.source,
            destination = %request.destination,
            "image copied"
        );
        Ok(Some(Value::String(request.destination.clone())))
    }

    fn failure_report(&self, request: &ImageCopyRequest, error: &PublishError) -> FailureReport {
        FailureReport {
            title: "Image Copy Failed".to_string(),
            fields: vec![
                ("source".to_string(), request.source.clone()),
                ("destination".to_string(), request.destination.clone()),
            ],
            error: error.to_string(),
        }
    }
}

#[async_trait]
impl JobHandler<MultiArchCollectRequest> for ImageHandler {
    async fn run(
        &self,
        id: &RequestId,
        request: &MultiArchCollectRequest,
    ) -> Result<Option<Value>, PublishError> {
        let result = bounded("multi-arch collect", self.collect_timeout, self.collect(request)).await?;
        tracing::info!(request_id = %id, repo = %result.repo, "multi-arch collection finished");
        let value = serde_json::to_value(&result)
            .map_err(|err| PublishError::Input(err.to_string()))?;
        Ok(Some(value))
    }

    fn failure_report(
        &self,
        request: &MultiArchCollectRequest,
        error: &PublishError,
    ) -> FailureReport {
        FailureReport {
            title: "Multi-arch Image Collect Failed".to_string(),
            fields: vec![("image".to_string(), request.image_url.clone())],
            error: error.to_string(),
        }
    }
}
