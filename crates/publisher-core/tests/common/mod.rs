// crates/publisher-core/tests/common/mod.rs
// ============================================================================
// Module: Common Test Utilities
// Description: Shared fakes and builders for publisher-core tests.
// Purpose: Provide recording backends for registries, transfers, and notifiers.
// Dependencies: publisher-core, serde_json, sha2, tokio
// ============================================================================

//! ## Overview
//! Recording fakes for every transfer seam plus request builders shared by
//! the integration tests.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]
#![allow(dead_code, reason = "Shared test helpers may be unused in some cases.")]

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use async_trait::async_trait;
use publisher_core::ArtifactSource;
use publisher_core::OciSource;
use publisher_core::PublishInfo;
use publisher_core::PublishRequest;
use publisher_core::core::hex_encode;
use publisher_core::derive::ArtifactMetadata;
use publisher_core::interfaces::ArtifactFetcher;
use publisher_core::interfaces::ArtifactRegistry;
use publisher_core::interfaces::FailureReport;
use publisher_core::interfaces::ImageRegistry;
use publisher_core::interfaces::MirrorPublisher;
use publisher_core::interfaces::Notifier;
use publisher_core::interfaces::NotifyError;
use publisher_core::interfaces::ObjectStore;
use publisher_core::interfaces::TransferError;
use serde_json::json;
use sha2::Digest;
use sha2::Sha256;

// ============================================================================
// SECTION: Builders
// ============================================================================

/// Digest used by fixture artifacts.
pub const FIXTURE_DIGEST: &str =
    "sha256:4a5e1e4baab89f3a32518a88c31bc87f618f76673e2cc77ab2127b7afdeda33b";

/// Builds a mirror publish request for `tidb` on linux/amd64.
pub fn publish_request(version: &str, target: &str) -> PublishRequest {
    PublishRequest {
        from: ArtifactSource::Oci(OciSource {
            repo: "hub.example.com/pingcap/tidb/package".to_string(),
            tag: FIXTURE_DIGEST.to_string(),
            file: "tidb-v8.5.0-linux-amd64.tar.gz".to_string(),
        }),
        publish: PublishInfo {
            name: "tidb".to_string(),
            os: "linux".to_string(),
            arch: "amd64".to_string(),
            version: version.to_string(),
            description: "TiDB server".to_string(),
            entry_point: "tidb-server".to_string(),
            standalone: false,
        },
        target: target.to_string(),
    }
}

/// Builds artifact metadata bundling the given package files.
pub fn package_metadata(files: &[&str], version: &str) -> ArtifactMetadata {
    let packages: Vec<_> = files
        .iter()
        .map(|file| {
            json!({
                "file": file,
                "description": "bundled package",
                "entrypoint": "bin/server",
                "standalone": false,
            })
        })
        .collect();
    ArtifactMetadata {
        digest: FIXTURE_DIGEST.to_string(),
        config: json!({
            "net.pingcap.tibuild.tiup": packages,
            "net.pingcap.tibuild.os": "linux",
            "net.pingcap.tibuild.architecture": "amd64",
            "org.opencontainers.image.version": version,
            "net.pingcap.tibuild.git-sha": "abc123def",
        }),
        files: files.iter().map(ToString::to_string).collect(),
    }
}

/// Returns the lowercase hex SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex_encode(&Sha256::digest(bytes))
}

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Registry serving fixed metadata per `repo:reference`.
#[derive(Default)]
pub struct FixedRegistry {
    /// Metadata keyed by `repo:reference`.
    entries: Mutex<HashMap<String, ArtifactMetadata>>,
}

impl FixedRegistry {
    /// Registers metadata for an artifact reference.
    pub fn with(self, repo: &str, reference: &str, metadata: ArtifactMetadata) -> Self {
        self.entries.lock().unwrap().insert(format!("{repo}:{reference}"), metadata);
        self
    }
}

#[async_trait]
impl ArtifactRegistry for FixedRegistry {
    async fn fetch_metadata(
        &self,
        repo: &str,
        reference: &str,
    ) -> Result<ArtifactMetadata, TransferError> {
        self.entries
            .lock()
            .unwrap()
            .get(&format!("{repo}:{reference}"))
            .cloned()
            .ok_or_else(|| TransferError::Registry(format!("manifest unknown: {repo}:{reference}")))
    }
}

// ============================================================================
// SECTION: Fetcher
// ============================================================================

/// Fetcher writing fixed bytes and serving a configurable remote copy.
pub struct FakeFetcher {
    /// Bytes written for every download.
    content: Vec<u8>,
    /// Bytes the mirror serves back after publish.
    remote: Mutex<Vec<u8>>,
    /// Sources downloaded so far.
    pub downloads: Mutex<Vec<ArtifactSource>>,
    /// Verification URLs requested so far.
    pub verified: Mutex<Vec<String>>,
}

impl FakeFetcher {
    /// Creates a fetcher whose mirror copy matches the download.
    pub fn new(content: &[u8]) -> Self {
        Self {
            content: content.to_vec(),
            remote: Mutex::new(content.to_vec()),
            downloads: Mutex::new(Vec::new()),
            verified: Mutex::new(Vec::new()),
        }
    }

    /// Makes the mirror serve different bytes than were published.
    pub fn corrupt_remote(self, bytes: &[u8]) -> Self {
        *self.remote.lock().unwrap() = bytes.to_vec();
        self
    }
}

#[async_trait]
impl ArtifactFetcher for FakeFetcher {
    async fn download(
        &self,
        source: &ArtifactSource,
        dir: &Path,
    ) -> Result<PathBuf, TransferError> {
        let name = match source {
            ArtifactSource::Oci(oci) if !oci.file.is_empty() => oci.file.clone(),
            _ => "artifact.bin".to_string(),
        };
        let path = dir.join(name);
        tokio::fs::write(&path, &self.content)
            .await
            .map_err(|err| TransferError::Io(err.to_string()))?;
        self.downloads.lock().unwrap().push(source.clone());
        Ok(path)
    }

    async fn remote_sha256(&self, url: &str) -> Result<String, TransferError> {
        self.verified.lock().unwrap().push(url.to_string());
        Ok(sha256_hex(&self.remote.lock().unwrap()))
    }
}

// ============================================================================
// SECTION: Mirror Publisher
// ============================================================================

/// Publisher tracking call counts and overlapping calls.
#[derive(Default)]
pub struct RecordingPublisher {
    /// Time spent inside each publish.
    delay: Duration,
    /// Number of upcoming calls that fail.
    failures_left: AtomicUsize,
    /// Calls currently in flight.
    active: AtomicUsize,
    /// Highest number of overlapping calls.
    pub max_active: AtomicUsize,
    /// Total calls.
    pub calls: AtomicUsize,
}

impl RecordingPublisher {
    /// Creates a publisher holding each call for `delay`.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    /// Makes the next `count` calls fail.
    pub fn failing(self, count: usize) -> Self {
        self.failures_left.store(count, Ordering::SeqCst);
        self
    }

    /// Returns the number of publish calls made.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MirrorPublisher for RecordingPublisher {
    async fn publish(&self, _file: &Path, _info: &PublishInfo) -> Result<(), TransferError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        let fail = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if fail {
            return Err(TransferError::Command("mirror rejected upload".to_string()));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Object Store
// ============================================================================

/// Object store recording writes in order.
#[derive(Default)]
pub struct MemoryObjectStore {
    /// Objects by key.
    pub objects: Mutex<BTreeMap<String, Vec<u8>>>,
    /// Keys in write order.
    pub order: Mutex<Vec<String>>,
    /// Key whose write fails.
    fail_key: Option<String>,
}

impl MemoryObjectStore {
    /// Makes writes to keys ending in `suffix` fail.
    pub fn failing_on(suffix: &str) -> Self {
        Self {
            fail_key: Some(suffix.to_string()),
            ..Self::default()
        }
    }

    /// Records one object write.
    fn record(&self, key: &str, bytes: Vec<u8>) -> Result<(), TransferError> {
        if self.fail_key.as_deref().is_some_and(|suffix| key.ends_with(suffix)) {
            return Err(TransferError::ObjectStore(format!("put {key} denied")));
        }
        self.order.lock().unwrap().push(key.to_string());
        self.objects.lock().unwrap().insert(key.to_string(), bytes);
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put_file(&self, key: &str, path: &Path) -> Result<(), TransferError> {
        let bytes =
            tokio::fs::read(path).await.map_err(|err| TransferError::Io(err.to_string()))?;
        self.record(key, bytes)
    }

    async fn put_bytes(&self, key: &str, bytes: Vec<u8>) -> Result<(), TransferError> {
        self.record(key, bytes)
    }
}

// ============================================================================
// SECTION: Image Registry
// ============================================================================

/// Pushed index record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushedIndex {
    /// Repository.
    pub repo: String,
    /// Tags.
    pub tags: Vec<String>,
    /// Referenced manifests.
    pub manifests: Vec<String>,
}

/// Image registry with fixed digests and recorded writes.
#[derive(Default)]
pub struct FakeImageRegistry {
    /// Digests keyed by `repo:tag`.
    digests: HashMap<String, String>,
    /// Time each copy takes.
    copy_delay: Duration,
    /// Copies performed.
    pub copies: Mutex<Vec<(String, String)>>,
    /// Indexes pushed.
    pub indexes: Mutex<Vec<PushedIndex>>,
}

impl FakeImageRegistry {
    /// Registers a manifest digest.
    pub fn with_digest(mut self, repo: &str, tag: &str, digest: &str) -> Self {
        self.digests.insert(format!("{repo}:{tag}"), digest.to_string());
        self
    }

    /// Makes every copy take `delay`.
    pub const fn with_copy_delay(mut self, delay: Duration) -> Self {
        self.copy_delay = delay;
        self
    }
}

#[async_trait]
impl ImageRegistry for FakeImageRegistry {
    async fn copy(&self, source: &str, destination: &str) -> Result<(), TransferError> {
        tokio::time::sleep(self.copy_delay).await;
        self.copies.lock().unwrap().push((source.to_string(), destination.to_string()));
        Ok(())
    }

    async fn manifest_digest(
        &self,
        repo: &str,
        tag: &str,
    ) -> Result<Option<String>, TransferError> {
        Ok(self.digests.get(&format!("{repo}:{tag}")).cloned())
    }

    async fn push_index(
        &self,
        repo: &str,
        tags: &[String],
        manifests: &[String],
    ) -> Result<(), TransferError> {
        self.indexes.lock().unwrap().push(PushedIndex {
            repo: repo.to_string(),
            tags: tags.to_vec(),
            manifests: manifests.to_vec(),
        });
        Ok(())
    }
}

// ============================================================================
// SECTION: Notifier
// ============================================================================

/// Notifier recording reports, optionally failing every delivery.
#[derive(Default)]
pub struct RecordingNotifier {
    /// Reports received.
    pub reports: Mutex<Vec<FailureReport>>,
    /// Whether delivery fails.
    fail: bool,
}

impl RecordingNotifier {
    /// Creates a notifier whose deliveries always fail.
    pub fn unreachable() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Returns the recorded reports.
    pub fn recorded(&self) -> Vec<FailureReport> {
        self.reports.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, report: &FailureReport) -> Result<(), NotifyError> {
        self.reports.lock().unwrap().push(report.clone());
        if self.fail {
            return Err(NotifyError::Delivery("webhook unreachable".to_string()));
        }
        Ok(())
    }
}

/// Wraps a value in an `Arc`.
pub fn shared<T>(value: T) -> Arc<T> {
    Arc::new(value)
}
