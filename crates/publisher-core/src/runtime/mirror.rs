// crates/publisher-core/src/runtime/mirror.rs
// ============================================================================
// Module: Mirror Publish Handler
// Description: Download, locked publish, and checksum verification.
// Purpose: Execute package mirror jobs end to end.
// Dependencies: crate::{core, interfaces, runtime}, tempfile, tracing
// ============================================================================

//! ## Overview
//! A mirror job is rate checked, downloaded into a scratch directory that is
//! removed on drop, published under the global mirror lock with bounded
//! retries, then verified by comparing the local SHA-256 with the one the
//! mirror serves.
//! Invariants:
//! - The lock is held only around a single publish attempt.
//! - Verification failure is terminal and never retried.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::core::ArtifactSource;
use crate::core::PublishRequest;
use crate::core::RequestId;
use crate::core::sha256_file;
use crate::interfaces::ArtifactFetcher;
use crate::interfaces::FailureReport;
use crate::interfaces::MirrorPublisher;
use crate::interfaces::TransferError;
use crate::runtime::dispatcher::JobHandler;
use crate::runtime::error::PublishError;
use crate::runtime::lock::MirrorLock;
use crate::runtime::ratelimit::RateDecision;
use crate::runtime::ratelimit::RateLimiter;
use crate::runtime::retry::RetryPolicy;

// ============================================================================
// SECTION: Handler
// ============================================================================

/// Mirror publish job handler.
pub struct MirrorHandler {
    /// Mirror name matched against envelope subjects.
    mirror_name: String,
    /// Mirror base URL used for publish and verification.
    mirror_url: String,
    /// Source downloader and remote hasher.
    fetcher: Arc<dyn ArtifactFetcher>,
    /// Mirror publish operation.
    publisher: Arc<dyn MirrorPublisher>,
    /// Nightly rate limiter.
    limiter: RateLimiter,
    /// Global mirror lock.
    lock: MirrorLock,
    /// Publish retry policy.
    retry: RetryPolicy,
    /// Whether to verify the published checksum.
    verify: bool,
}

impl MirrorHandler {
    /// Creates a handler with default retries and verification enabled.
    #[must_use]
    pub fn new(
        mirror_name: impl Into<String>,
        mirror_url: impl Into<String>,
        fetcher: Arc<dyn ArtifactFetcher>,
        publisher: Arc<dyn MirrorPublisher>,
        limiter: RateLimiter,
        lock: MirrorLock,
    ) -> Self {
        Self {
            mirror_name: mirror_name.into(),
            mirror_url: mirror_url.into(),
            fetcher,
            publisher,
            limiter,
            lock,
            retry: RetryPolicy::default(),
            verify: true,
        }
    }

    /// Overrides the publish retry policy.
    #[must_use]
    pub const fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Enables or disables post-publish verification.
    #[must_use]
    pub const fn with_verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    /// Returns the mirror name this handler owns.
    #[must_use]
    pub fn mirror_name(&self) -> &str {
        &self.mirror_name
    }

    /// Returns the URL the mirror serves a published tarball from.
    #[must_use]
    pub fn artifact_url(&self, request: &PublishRequest) -> String {
        let info = &request.publish;
        format!(
            "{}/{}-{}-{}-{}.tar.gz",
            self.mirror_url.trim_end_matches('/'),
            info.name,
            info.version,
            info.os,
            info.arch
        )
    }

    /// Compares the local tarball with the one the mirror now serves.
    async fn verify(
        &self,
        request: &PublishRequest,
        local: &std::path::Path,
    ) -> Result<(), PublishError> {
        let url = self.artifact_url(request);
        let local = sha256_file(local).await?;
        let remote = self.fetcher.remote_sha256(&url).await?;
        if !local.eq_ignore_ascii_case(&remote) {
            return Err(PublishError::Verification {
                url,
                local,
                remote,
            });
        }
        tracing::info!(url = %url, sha256 = %local, "published package verified");
        Ok(())
    }
}

#[async_trait]
impl JobHandler<PublishRequest> for MirrorHandler {
    async fn run(
        &self,
        id: &RequestId,
        request: &PublishRequest,
    ) -> Result<Option<Value>, PublishError> {
        if let Some(field) = request.missing_field() {
            return Err(PublishError::Input(format!("missing {field}")));
        }
        let info = &request.publish;
        if let RateDecision::Rejected(_) =
            self.limiter.check_publish(&self.mirror_url, info).await?
        {
            return Err(PublishError::RateLimited {
                package: info.name.clone(),
            });
        }

        let scratch = tempfile::tempdir().map_err(|err| TransferError::Io(err.to_string()))?;
        let file = self.fetcher.download(&request.from, scratch.path()).await?;
        tracing::info!(request_id = %id, source = %request.from, "package downloaded");

        let publisher = &self.publisher;
        let lock = &self.lock;
        let path = file.as_path();
        self.retry
            .run("mirror publish", || async move {
                match lock.run_exclusive(|| publisher.publish(path, info)).await {
                    Ok(outcome) => outcome.map_err(PublishError::from),
                    Err(err) => Err(PublishError::from(err)),
                }
            })
            .await?;
        tracing::info!(
            request_id = %id,
            package = %info.name,
            version = %info.version,
            mirror = %self.mirror_name,
            "package published"
        );

        if self.verify {
            self.verify(request, path).await?;
        }
        Ok(None)
    }

    fn failure_report(&self, request: &PublishRequest, error: &PublishError) -> FailureReport {
        let info = &request.publish;
        let mut fields = vec![
            ("package".to_string(), info.name.clone()),
            ("version".to_string(), info.version.clone()),
            ("os".to_string(), info.os.clone()),
            ("arch".to_string(), info.arch.clone()),
            ("to-mirror".to_string(), self.mirror_url.clone()),
            ("from".to_string(), request.from.to_string()),
        ];
        if let ArtifactSource::Oci(oci) = &request.from {
            fields.push(("rerun".to_string(), format!("publisher submit {}", oci.reference())));
        }
        FailureReport {
            title: "TiUP Publish Failed".to_string(),
            fields,
            error: error.to_string(),
        }
    }
}
