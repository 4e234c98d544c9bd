// crates/publisher-transfer/src/http.rs
// ============================================================================
// Module: HTTP Transfers
// Description: Streaming HTTP downloads and remote checksums.
// Purpose: Fetch HTTP-sourced artifacts and re-download published packages.
// Dependencies: publisher-core, reqwest, sha2, tokio, url
// ============================================================================

//! ## Overview
//! [`HttpDownloader`] streams response bodies to disk or through a SHA-256
//! hasher without buffering whole files in memory.
//! Invariants:
//! - Only `http` and `https` URLs are requested.
//! - Any status other than 200 fails the transfer.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use publisher_core::core::hex_encode;
use publisher_core::interfaces::TransferError;
use reqwest::Client;
use reqwest::Response;
use reqwest::StatusCode;
use sha2::Digest;
use sha2::Sha256;
use tokio::io::AsyncWriteExt;
use tokio::io::BufWriter;
use url::Url;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Write buffer size for streamed downloads.
pub const COPY_BUFFER_BYTES: usize = 64 * 1024;
/// Connect timeout for outbound requests.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
/// Whole-request timeout for large package transfers.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30 * 60);
/// File name used when the URL path has no final segment.
const FALLBACK_FILE_NAME: &str = "download";

// ============================================================================
// SECTION: Downloader
// ============================================================================

/// Streaming HTTP client for artifacts and verification downloads.
#[derive(Debug, Clone)]
pub struct HttpDownloader {
    /// Shared HTTP client.
    client: Client,
}

impl HttpDownloader {
    /// Builds a downloader with transfer-sized timeouts.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::Http`] when the client cannot be constructed.
    pub fn new() -> Result<Self, TransferError> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| TransferError::Http(err.to_string()))?;
        Ok(Self {
            client,
        })
    }

    /// Wraps a preconfigured client.
    #[must_use]
    pub const fn with_client(client: Client) -> Self {
        Self {
            client,
        }
    }

    /// Downloads `url` into `dir`, naming the file after the last path segment.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError`] when the request fails, the status is not 200,
    /// or the file cannot be written.
    pub async fn download(&self, url: &str, dir: &Path) -> Result<PathBuf, TransferError> {
        let parsed = parse_http_url(url)?;
        let mut response = self.get(&parsed).await?;
        let path = dir.join(file_name_from_url(&parsed));
        let file = tokio::fs::File::create(&path)
            .await
            .map_err(|err| TransferError::Io(err.to_string()))?;
        let mut writer = BufWriter::with_capacity(COPY_BUFFER_BYTES, file);
        let mut written: u64 = 0;
        while let Some(chunk) =
            response.chunk().await.map_err(|err| TransferError::Http(err.to_string()))?
        {
            writer.write_all(&chunk).await.map_err(|err| TransferError::Io(err.to_string()))?;
            written += chunk.len() as u64;
        }
        writer.flush().await.map_err(|err| TransferError::Io(err.to_string()))?;
        tracing::debug!(url, path = %path.display(), bytes = written, "downloaded http file");
        Ok(path)
    }

    /// Streams `url` through SHA-256 and returns the lowercase hex digest.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::Http`] when the request fails or the status is
    /// not 200.
    pub async fn sha256(&self, url: &str) -> Result<String, TransferError> {
        let parsed = parse_http_url(url)?;
        let mut response = self.get(&parsed).await?;
        let mut hasher = Sha256::new();
        while let Some(chunk) =
            response.chunk().await.map_err(|err| TransferError::Http(err.to_string()))?
        {
            hasher.update(&chunk);
        }
        Ok(hex_encode(&hasher.finalize()))
    }

    /// Sends a GET and rejects non-200 responses.
    async fn get(&self, url: &Url) -> Result<Response, TransferError> {
        let response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(|err| TransferError::Http(err.to_string()))?;
        if response.status() != StatusCode::OK {
            return Err(TransferError::Http(format!(
                "unexpected status code: {} for {url}",
                response.status().as_u16()
            )));
        }
        Ok(response)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Parses a URL and requires an HTTP scheme.
pub(crate) fn parse_http_url(url: &str) -> Result<Url, TransferError> {
    let parsed = Url::parse(url).map_err(|err| TransferError::Invalid(format!("{url}: {err}")))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        scheme => Err(TransferError::Invalid(format!("unsupported url scheme: {scheme}"))),
    }
}

/// Returns the final non-empty path segment of a URL.
pub(crate) fn file_name_from_url(url: &Url) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.rfind(|segment| !segment.is_empty()))
        .filter(|segment| *segment != "." && *segment != "..")
        .map_or_else(|| FALLBACK_FILE_NAME.to_string(), str::to_string)
}
