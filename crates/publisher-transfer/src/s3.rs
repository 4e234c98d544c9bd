// crates/publisher-transfer/src/s3.rs
// ============================================================================
// Module: S3 Object Store
// Description: Fileserver objects stored in an S3-compatible bucket.
// Purpose: Upload build files and branch pointers for the fileserver.
// Dependencies: aws-config, aws-sdk-s3, publisher-core
// ============================================================================

//! ## Overview
//! [`S3ObjectStore`] uploads files and small byte payloads with `PutObject`.
//! Retries are left to the SDK's standard retry policy.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_config::Region;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::Credentials;
use aws_sdk_s3::primitives::ByteStream;
use publisher_core::interfaces::ObjectStore;
use publisher_core::interfaces::TransferError;

// ============================================================================
// SECTION: Settings
// ============================================================================

/// Bucket location and credentials.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct S3Settings {
    /// Bucket name.
    pub bucket: String,
    /// Region; falls back to the environment when unset.
    pub region: Option<String>,
    /// Custom endpoint for S3-compatible stores.
    pub endpoint: Option<String>,
    /// Static access key; environment credentials when unset.
    pub access_key: Option<String>,
    /// Static secret key.
    pub secret_key: Option<String>,
    /// Static session token.
    pub session_token: Option<String>,
    /// Force path-style addressing.
    pub force_path_style: bool,
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// Object store backed by S3.
#[derive(Debug, Clone)]
pub struct S3ObjectStore {
    /// S3 client handle.
    client: Client,
    /// Target bucket.
    bucket: String,
}

impl S3ObjectStore {
    /// Builds a client from settings and the ambient AWS environment.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::Invalid`] when the bucket is empty.
    pub async fn connect(settings: &S3Settings) -> Result<Self, TransferError> {
        if settings.bucket.trim().is_empty() {
            return Err(TransferError::Invalid("bucket must be set".to_string()));
        }
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = &settings.region {
            loader = loader.region(Region::new(region.clone()));
        }
        if let Some(endpoint) = &settings.endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        if let (Some(access_key), Some(secret_key)) = (&settings.access_key, &settings.secret_key) {
            loader = loader.credentials_provider(Credentials::new(
                access_key.clone(),
                secret_key.clone(),
                settings.session_token.clone(),
                None,
                "publisher-config",
            ));
        }
        let shared_config = loader.load().await;
        let mut s3_builder = aws_sdk_s3::config::Builder::from(&shared_config);
        if settings.force_path_style {
            s3_builder = s3_builder.force_path_style(true);
        }
        Ok(Self {
            client: Client::from_conf(s3_builder.build()),
            bucket: settings.bucket.clone(),
        })
    }

    /// Wraps a preconfigured client.
    #[must_use]
    pub fn with_client(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put_file(&self, key: &str, path: &Path) -> Result<(), TransferError> {
        let body = ByteStream::from_path(path)
            .await
            .map_err(|err| TransferError::Io(err.to_string()))?;
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .send()
            .await
            .map_err(|err| TransferError::ObjectStore(err.to_string()))?;
        tracing::info!(bucket = %self.bucket, key, "uploaded object");
        Ok(())
    }

    async fn put_bytes(&self, key: &str, bytes: Vec<u8>) -> Result<(), TransferError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(bytes))
            .content_type("text/plain")
            .send()
            .await
            .map_err(|err| TransferError::ObjectStore(err.to_string()))?;
        tracing::info!(bucket = %self.bucket, key, "uploaded object");
        Ok(())
    }
}
