// crates/publisher-transfer/src/fetcher.rs
// ============================================================================
// Module: Artifact Fetcher
// Description: Source-dispatching download and verification client.
// Purpose: Resolve any artifact source to a local file.
// Dependencies: publisher-core, crate::http, crate::oci
// ============================================================================

//! ## Overview
//! OCI sources stream the titled layer; HTTP sources stream the URL body.
//! Remote checksums always go over HTTP because published packages are
//! served by the mirror's web front.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use publisher_core::ArtifactSource;
use publisher_core::interfaces::ArtifactFetcher;
use publisher_core::interfaces::TransferError;

use crate::http::HttpDownloader;
use crate::oci::OciRegistry;

// ============================================================================
// SECTION: Fetcher
// ============================================================================

/// Downloads artifacts from OCI registries or HTTP servers.
#[derive(Clone)]
pub struct SourceFetcher {
    /// Registry used for OCI layer sources.
    registry: Arc<OciRegistry>,
    /// HTTP client for URL sources and checksums.
    http: HttpDownloader,
}

impl SourceFetcher {
    /// Creates a fetcher over a shared registry and HTTP client.
    #[must_use]
    pub const fn new(registry: Arc<OciRegistry>, http: HttpDownloader) -> Self {
        Self {
            registry,
            http,
        }
    }
}

#[async_trait]
impl ArtifactFetcher for SourceFetcher {
    async fn download(
        &self,
        source: &ArtifactSource,
        dir: &Path,
    ) -> Result<PathBuf, TransferError> {
        match source {
            ArtifactSource::Oci(oci) => {
                if oci.file.is_empty() {
                    return Err(TransferError::Invalid(format!(
                        "oci source {} names no file",
                        oci.reference()
                    )));
                }
                self.registry.download_layer(&oci.reference(), &oci.file, dir).await
            }
            ArtifactSource::Http(http) => self.http.download(&http.url, dir).await,
        }
    }

    async fn remote_sha256(&self, url: &str) -> Result<String, TransferError> {
        self.http.sha256(url).await
    }
}
