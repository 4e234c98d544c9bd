// crates/publisher-config/src/config.rs
// ============================================================================
// Module: Publisher Configuration
// Description: Configuration loading and validation for publisher processes.
// Purpose: Provide strict config parsing with hard limits.
// Dependencies: publisher-core, serde, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with size and path limits, then
//! validated as a whole. Durations are written as whole seconds or
//! milliseconds and converted to runtime settings here.
//! Invariants:
//! - Every loaded config has passed [`PublisherConfig::validate`].
//! - Worker sections required by the selected worker kind are present.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use publisher_core::DeliveryRule;
use publisher_core::DeliveryRules;
use publisher_core::runtime::DEFAULT_LOCK_LEASE;
use publisher_core::runtime::DEFAULT_LOCK_RETRY_DELAY;
use publisher_core::runtime::DEFAULT_LOCK_TRIES;
use publisher_core::runtime::DEFAULT_MIRROR_LOCK_NAME;
use publisher_core::runtime::DEFAULT_NIGHTLY_WINDOW;
use publisher_core::runtime::DEFAULT_PUBLISH_ATTEMPTS;
use publisher_core::runtime::DEFAULT_PUBLISH_RETRY_DELAY;
use publisher_core::runtime::DEFAULT_STATUS_TTL;
use publisher_core::runtime::LockSettings;
use publisher_core::runtime::RetryPolicy;
use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "publisher.toml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "PUBLISHER_CONFIG";
/// Maximum configuration file size in bytes.
pub const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Default stream key.
const DEFAULT_STREAM: &str = "publisher-jobs";
/// Default consumer group.
const DEFAULT_GROUP: &str = "publisher";
/// Default consumer name.
const DEFAULT_CONSUMER: &str = "worker-1";
/// Default blocking read timeout in milliseconds.
const DEFAULT_BLOCK_MS: u64 = 5_000;
/// Default envelope source identifier.
const DEFAULT_EVENT_SOURCE: &str = "publisher";

// ============================================================================
// SECTION: Configuration Types
// ============================================================================

/// Publisher process configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PublisherConfig {
    /// Redis connection and stream settings.
    pub redis: RedisConfig,
    /// Submission settings.
    #[serde(default)]
    pub service: ServiceConfig,
    /// OCI registry credentials.
    #[serde(default)]
    pub registry: RegistryConfig,
    /// Worker settings; required only by the `worker` command.
    #[serde(default)]
    pub worker: Option<WorkerConfig>,
    /// Failure notification settings.
    #[serde(default)]
    pub notify: NotifyConfig,
    /// Static fan-out rules for rule-based submissions.
    #[serde(default)]
    pub delivery_rules: Vec<DeliveryRule>,
}

impl PublisherConfig {
    /// Loads configuration from disk using the default resolution rules.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path)?;
        validate_path(&resolved)?;
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        Self::from_toml(content)
    }

    /// Parses and validates configuration text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when parsing or validation fails.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.redis.validate()?;
        self.service.validate()?;
        if let Some(worker) = &self.worker {
            worker.validate()?;
        }
        self.notify.validate()?;
        self.compiled_rules()?;
        Ok(())
    }

    /// Compiles the delivery rules.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when a rule pattern does not compile.
    pub fn compiled_rules(&self) -> Result<DeliveryRules, ConfigError> {
        DeliveryRules::compile(&self.delivery_rules)
            .map_err(|err| ConfigError::Invalid(format!("delivery_rules: {err}")))
    }

    /// Returns the worker section or an error naming the command that needs it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when no `[worker]` section is present.
    pub fn require_worker(&self) -> Result<&WorkerConfig, ConfigError> {
        self.worker
            .as_ref()
            .ok_or_else(|| ConfigError::Invalid("[worker] section is required".to_string()))
    }
}

/// Redis connection and stream settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RedisConfig {
    /// Connection URL (`redis://host:port/db`).
    pub url: String,
    /// Stream key carrying job envelopes.
    #[serde(default = "default_stream")]
    pub stream: String,
    /// Consumer group; one per worker destination.
    #[serde(default = "default_group")]
    pub group: String,
    /// Consumer name within the group.
    #[serde(default = "default_consumer")]
    pub consumer: String,
    /// Blocking read timeout in milliseconds.
    #[serde(default = "default_block_ms")]
    pub block_ms: u64,
}

impl RedisConfig {
    /// Validates Redis settings.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.url.trim().is_empty() {
            return Err(ConfigError::Invalid("redis.url must be set".to_string()));
        }
        if self.stream.trim().is_empty() {
            return Err(ConfigError::Invalid("redis.stream must be set".to_string()));
        }
        if self.group.trim().is_empty() || self.consumer.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "redis.group and redis.consumer must be set".to_string(),
            ));
        }
        if self.block_ms == 0 {
            return Err(ConfigError::Invalid("redis.block_ms must be greater than zero".to_string()));
        }
        Ok(())
    }
}

/// Submission settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    /// Source identifier stamped on envelopes.
    #[serde(default = "default_event_source")]
    pub event_source: String,
    /// Status record lifetime in seconds.
    #[serde(default = "default_status_ttl_secs")]
    pub status_ttl_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            event_source: default_event_source(),
            status_ttl_secs: default_status_ttl_secs(),
        }
    }
}

impl ServiceConfig {
    /// Returns the status record lifetime.
    #[must_use]
    pub const fn status_ttl(&self) -> Duration {
        Duration::from_secs(self.status_ttl_secs)
    }

    /// Validates submission settings.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.event_source.trim().is_empty() {
            return Err(ConfigError::Invalid("service.event_source must be set".to_string()));
        }
        if self.status_ttl_secs == 0 {
            return Err(ConfigError::Invalid(
                "service.status_ttl_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// OCI registry credentials.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegistryConfig {
    /// Basic auth username.
    #[serde(default)]
    pub username: Option<String>,
    /// Basic auth password.
    #[serde(default)]
    pub password: Option<String>,
    /// Registries reached over plain HTTP.
    #[serde(default)]
    pub insecure_registries: Vec<String>,
}

/// Worker destination kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerKind {
    /// Package mirror publishing.
    Mirror,
    /// Fileserver (object store) publishing.
    Fileserver,
    /// Image copy and multi-arch collection.
    Image,
}

/// Worker settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkerConfig {
    /// Destination kind this worker serves.
    pub kind: WorkerKind,
    /// Nightly rate-limit window in seconds; zero disables limiting.
    #[serde(default = "default_nightly_interval_secs")]
    pub nightly_interval_secs: u64,
    /// Mirror settings for `kind = "mirror"`.
    #[serde(default)]
    pub mirror: Option<MirrorConfig>,
    /// Bucket settings for `kind = "fileserver"`.
    #[serde(default)]
    pub s3: Option<S3Config>,
}

impl WorkerConfig {
    /// Returns the nightly rate-limit window.
    #[must_use]
    pub const fn nightly_window(&self) -> Duration {
        Duration::from_secs(self.nightly_interval_secs)
    }

    /// Validates worker settings against the selected kind.
    fn validate(&self) -> Result<(), ConfigError> {
        match self.kind {
            WorkerKind::Mirror => {
                let mirror = self.mirror.as_ref().ok_or_else(|| {
                    ConfigError::Invalid("worker.mirror is required for mirror workers".to_string())
                })?;
                mirror.validate()?;
            }
            WorkerKind::Fileserver => {
                let s3 = self.s3.as_ref().ok_or_else(|| {
                    ConfigError::Invalid("worker.s3 is required for fileserver workers".to_string())
                })?;
                s3.validate()?;
            }
            WorkerKind::Image => {}
        }
        Ok(())
    }
}

/// Mirror worker settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MirrorConfig {
    /// Mirror identity matched against job subjects.
    pub name: String,
    /// Mirror URL used for publishing and verification.
    pub url: String,
    /// Publish attempts per job.
    #[serde(default = "default_publish_attempts")]
    pub publish_attempts: u32,
    /// Delay between publish attempts in seconds.
    #[serde(default = "default_publish_retry_delay_secs")]
    pub publish_retry_delay_secs: u64,
    /// Distributed lock name shared by every writer of the mirror.
    #[serde(default = "default_lock_name")]
    pub lock_name: String,
    /// Lock lease in seconds.
    #[serde(default = "default_lock_ttl_secs")]
    pub lock_ttl_secs: u64,
    /// Lock acquisition attempts.
    #[serde(default = "default_lock_tries")]
    pub lock_tries: u32,
    /// Delay between lock attempts in milliseconds.
    #[serde(default = "default_lock_retry_delay_ms")]
    pub lock_retry_delay_ms: u64,
    /// Whether published packages are re-downloaded and checksummed.
    #[serde(default = "default_verify")]
    pub verify: bool,
}

impl MirrorConfig {
    /// Returns lock settings for the mirror.
    #[must_use]
    pub fn lock_settings(&self) -> LockSettings {
        LockSettings {
            name: self.lock_name.clone(),
            lease: Duration::from_secs(self.lock_ttl_secs),
            tries: self.lock_tries,
            retry_delay: Duration::from_millis(self.lock_retry_delay_ms),
        }
    }

    /// Returns the publish retry policy.
    #[must_use]
    pub const fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.publish_attempts, Duration::from_secs(self.publish_retry_delay_secs))
    }

    /// Validates mirror settings.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::Invalid("worker.mirror.name must be set".to_string()));
        }
        let url = self.url.trim();
        if url.is_empty() {
            return Err(ConfigError::Invalid("worker.mirror.url must be set".to_string()));
        }
        if !(url.starts_with("https://") || url.starts_with("http://")) {
            return Err(ConfigError::Invalid(
                "worker.mirror.url must include http:// or https://".to_string(),
            ));
        }
        if self.lock_name.trim().is_empty() {
            return Err(ConfigError::Invalid("worker.mirror.lock_name must be set".to_string()));
        }
        if self.lock_tries == 0 {
            return Err(ConfigError::Invalid(
                "worker.mirror.lock_tries must be greater than zero".to_string(),
            ));
        }
        if self.lock_ttl_secs == 0 {
            return Err(ConfigError::Invalid(
                "worker.mirror.lock_ttl_secs must be greater than zero".to_string(),
            ));
        }
        if self.publish_attempts == 0 {
            return Err(ConfigError::Invalid(
                "worker.mirror.publish_attempts must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Object store settings for fileserver workers.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct S3Config {
    /// Bucket name.
    pub bucket: String,
    /// Optional region (defaults to environment).
    #[serde(default)]
    pub region: Option<String>,
    /// Optional endpoint for S3-compatible stores.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Static access key.
    #[serde(default)]
    pub access_key: Option<String>,
    /// Static secret key.
    #[serde(default)]
    pub secret_key: Option<String>,
    /// Static session token.
    #[serde(default)]
    pub session_token: Option<String>,
    /// Force path-style addressing.
    #[serde(default)]
    pub force_path_style: bool,
}

impl S3Config {
    /// Validates object store settings.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.bucket.trim().is_empty() {
            return Err(ConfigError::Invalid("worker.s3.bucket must be set".to_string()));
        }
        if let Some(endpoint) = &self.endpoint {
            let trimmed = endpoint.trim();
            if !(trimmed.starts_with("https://") || trimmed.starts_with("http://")) {
                return Err(ConfigError::Invalid(
                    "worker.s3.endpoint must include http:// or https://".to_string(),
                ));
            }
        }
        if self.access_key.is_some() != self.secret_key.is_some() {
            return Err(ConfigError::Invalid(
                "worker.s3.access_key and worker.s3.secret_key must be set together".to_string(),
            ));
        }
        Ok(())
    }
}

/// Failure notification settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NotifyConfig {
    /// Webhook receiving failure reports; notifications are off when unset.
    #[serde(default)]
    pub webhook_url: Option<String>,
}

impl NotifyConfig {
    /// Validates notification settings.
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(url) = &self.webhook_url {
            let trimmed = url.trim();
            if !(trimmed.starts_with("https://") || trimmed.starts_with("http://")) {
                return Err(ConfigError::Invalid(
                    "notify.webhook_url must include http:// or https://".to_string(),
                ));
            }
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from CLI or environment defaults.
fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Validates the resolved path against length limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Default stream key.
fn default_stream() -> String {
    DEFAULT_STREAM.to_string()
}

/// Default consumer group.
fn default_group() -> String {
    DEFAULT_GROUP.to_string()
}

/// Default consumer name.
fn default_consumer() -> String {
    DEFAULT_CONSUMER.to_string()
}

/// Default blocking read timeout.
const fn default_block_ms() -> u64 {
    DEFAULT_BLOCK_MS
}

/// Default envelope source.
fn default_event_source() -> String {
    DEFAULT_EVENT_SOURCE.to_string()
}

/// Default status TTL in seconds.
const fn default_status_ttl_secs() -> u64 {
    DEFAULT_STATUS_TTL.as_secs()
}

/// Default nightly window in seconds.
const fn default_nightly_interval_secs() -> u64 {
    DEFAULT_NIGHTLY_WINDOW.as_secs()
}

/// Default publish attempts.
const fn default_publish_attempts() -> u32 {
    DEFAULT_PUBLISH_ATTEMPTS
}

/// Default delay between publish attempts in seconds.
const fn default_publish_retry_delay_secs() -> u64 {
    DEFAULT_PUBLISH_RETRY_DELAY.as_secs()
}

/// Default lock name.
fn default_lock_name() -> String {
    DEFAULT_MIRROR_LOCK_NAME.to_string()
}

/// Default lock lease in seconds.
const fn default_lock_ttl_secs() -> u64 {
    DEFAULT_LOCK_LEASE.as_secs()
}

/// Default lock attempts.
const fn default_lock_tries() -> u32 {
    DEFAULT_LOCK_TRIES
}

/// Default delay between lock attempts in milliseconds.
const fn default_lock_retry_delay_ms() -> u64 {
    DEFAULT_LOCK_RETRY_DELAY.as_secs() * 1_000
}

/// Verification is on unless disabled.
const fn default_verify() -> bool {
    true
}
