// crates/publisher-core/src/runtime/fileserver.rs
// ============================================================================
// Module: Fileserver Publish Handler
// Description: Copies artifact layers into the object-store build layout.
// Purpose: Execute fileserver jobs and move the branch pointer last.
// Dependencies: crate::{core, derive, interfaces}, tempfile, tracing
// ============================================================================

//! ## Overview
//! Every `file -> entry` pair is downloaded from the digest-pinned artifact
//! and written under `download/builds/<repo>/<branch>/<commit>/<entry>`. The branch
//! pointer at `download/refs/<repo>/<branch>/sha1` is written only after all
//! build objects succeed.
//! Invariants:
//! - A failed build object leaves the refs pointer untouched.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::core::ArtifactSource;
use crate::core::FsPublishRequest;
use crate::core::RequestId;
use crate::derive::builds_key;
use crate::derive::refs_key;
use crate::interfaces::ArtifactFetcher;
use crate::interfaces::FailureReport;
use crate::interfaces::ObjectStore;
use crate::interfaces::TransferError;
use crate::runtime::dispatcher::JobHandler;
use crate::runtime::error::PublishError;

// ============================================================================
// SECTION: Handler
// ============================================================================

/// Fileserver publish job handler.
pub struct FileserverHandler {
    /// Layer downloader.
    fetcher: Arc<dyn ArtifactFetcher>,
    /// Destination bucket.
    store: Arc<dyn ObjectStore>,
}

impl FileserverHandler {
    /// Creates a fileserver handler.
    #[must_use]
    pub fn new(fetcher: Arc<dyn ArtifactFetcher>, store: Arc<dyn ObjectStore>) -> Self {
        Self {
            fetcher,
            store,
        }
    }
}

#[async_trait]
impl JobHandler<FsPublishRequest> for FileserverHandler {
    async fn run(
        &self,
        id: &RequestId,
        request: &FsPublishRequest,
    ) -> Result<Option<Value>, PublishError> {
        let info = &request.publish;
        if info.commit_sha.is_empty() || info.repo.is_empty() {
            return Err(PublishError::Input("missing repo or commit".to_string()));
        }
        let scratch = tempfile::tempdir().map_err(|err| TransferError::Io(err.to_string()))?;
        for (file, entry) in &info.file_transfer_map {
            let source = ArtifactSource::Oci(request.from.with_file(file.as_str()));
            let local = self.fetcher.download(&source, scratch.path()).await?;
            let key = builds_key(info, entry);
            self.store.put_file(&key, &local).await?;
            tracing::info!(request_id = %id, key = %key, "build object uploaded");
        }
        let pointer = refs_key(info);
        self.store.put_bytes(&pointer, info.commit_sha.clone().into_bytes()).await?;
        tracing::info!(request_id = %id, key = %pointer, commit = %info.commit_sha, "branch pointer updated");
        Ok(None)
    }

    fn failure_report(&self, request: &FsPublishRequest, error: &PublishError) -> FailureReport {
        let info = &request.publish;
        FailureReport {
            title: "Fileserver Publish Failed".to_string(),
            fields: vec![
                ("repo".to_string(), info.repo.clone()),
                ("branch".to_string(), info.branch.clone()),
                ("commit".to_string(), info.commit_sha.clone()),
                ("from".to_string(), request.from.reference()),
            ],
            error: format!(
                "Failed to publish {}/{}/* file to fileserver: {error}",
                info.repo, info.commit_sha
            ),
        }
    }
}
