// crates/publisher-cli/src/main.rs
// ============================================================================
// Module: Publisher CLI Entry Point
// Description: Command dispatcher for publish submission and worker processes.
// Purpose: Wire configuration, Redis backends, and transfer clients into the
//          publish pipeline.
// Dependencies: clap, publisher-config, publisher-core, publisher-store-redis,
//               publisher-transfer, tokio, tracing-subscriber
// ============================================================================

//! ## Overview
//! The `publisher` binary is the process boundary of the pipeline. Submission
//! commands derive and enqueue jobs then print their request ids; `worker`
//! consumes one destination's jobs until interrupted. Backends are built once
//! per process from the loaded configuration and handed to the pipeline as
//! trait objects.

// ============================================================================
// SECTION: Modules
// ============================================================================


// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Args;
use clap::Parser;
use clap::Subcommand;
use publisher_config::PublisherConfig;
use publisher_config::RedisConfig;
use publisher_config::RegistryConfig;
use publisher_config::S3Config;
use publisher_config::WorkerConfig;
use publisher_config::WorkerKind;
use publisher_core::RequestId;
use publisher_core::Submitter;
use publisher_core::Worker;
use publisher_core::WorkerContext;
use publisher_core::WorkerRole;
use publisher_core::interfaces::BrokerProducer;
use publisher_core::interfaces::CounterStore;
use publisher_core::interfaces::LockBackend;
use publisher_core::interfaces::StatusStore;
use publisher_core::runtime::DEFAULT_NIGHTLY_WINDOW;
use publisher_core::runtime::FileserverHandler;
use publisher_core::runtime::ImageHandler;
use publisher_core::runtime::MirrorHandler;
use publisher_core::runtime::MirrorLock;
use publisher_core::runtime::RateLimiter;
use publisher_store_redis::RedisCounterStore;
use publisher_store_redis::RedisLock;
use publisher_store_redis::RedisStatusStore;
use publisher_store_redis::RedisStreamBroker;
use publisher_store_redis::StreamSettings;
use publisher_store_redis::connect;
use publisher_transfer::HttpDownloader;
use publisher_transfer::OciRegistry;
use publisher_transfer::RegistryCredentials;
use publisher_transfer::S3ObjectStore;
use publisher_transfer::S3Settings;
use publisher_transfer::SourceFetcher;
use publisher_transfer::TiupCli;
use publisher_transfer::WebhookNotifier;
use thiserror::Error;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Log filter used when `RUST_LOG` is unset.
const DEFAULT_LOG_FILTER: &str = "info";
/// Release suffix stripped from collected base tags by default.
const DEFAULT_RELEASE_TAG_SUFFIX: &str = "release";

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "publisher", version, disable_help_subcommand = true)]
struct Cli {
    /// Optional config file path (defaults to publisher.toml or `PUBLISHER_CONFIG`).
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Consume and execute jobs for the configured destination.
    Worker,
    /// Derive and enqueue mirror publish jobs for an artifact.
    Submit(SubmitCommand),
    /// Derive and enqueue a fileserver publish job for an artifact.
    SubmitFs(SubmitFsCommand),
    /// Enqueue a registry-to-registry image copy.
    CopyImage(CopyImageCommand),
    /// Enqueue a multi-arch image index collection.
    CollectImage(CollectImageCommand),
    /// Print the status of a job.
    Status(RequestIdArgs),
    /// Print the stored result of a job.
    Result(RequestIdArgs),
    /// Delete every nightly rate-limit counter.
    ResetRateLimit,
}

/// Arguments for mirror submission.
#[derive(Args, Debug)]
struct SubmitCommand {
    /// Artifact reference (`registry/repo:tag` or `registry/repo@sha256:...`).
    #[arg(value_name = "ARTIFACT")]
    artifact: String,
    /// Target mirror; delivery rules choose mirrors when omitted.
    #[arg(long, value_name = "NAME")]
    mirror: Option<String>,
    /// Version override applied to every derived package.
    #[arg(long, value_name = "VERSION", requires = "mirror")]
    version: Option<String>,
    /// Print the derived requests as JSON without enqueueing them.
    #[arg(long, requires = "mirror")]
    dry_run: bool,
}

/// Arguments for fileserver submission.
#[derive(Args, Debug)]
struct SubmitFsCommand {
    /// Artifact reference.
    #[arg(value_name = "ARTIFACT")]
    artifact: String,
}

/// Arguments for image copy submission.
#[derive(Args, Debug)]
struct CopyImageCommand {
    /// Source image reference.
    #[arg(value_name = "SOURCE")]
    source: String,
    /// Destination image reference.
    #[arg(value_name = "DESTINATION")]
    destination: String,
}

/// Arguments for multi-arch collection submission.
#[derive(Args, Debug)]
struct CollectImageCommand {
    /// Single-arch image reference that was just pushed.
    #[arg(value_name = "IMAGE")]
    image: String,
    /// Release suffix removed when computing additional base tags.
    #[arg(long, value_name = "SUFFIX", default_value = DEFAULT_RELEASE_TAG_SUFFIX)]
    release_tag_suffix: String,
}

/// Arguments naming one job.
#[derive(Args, Debug)]
struct RequestIdArgs {
    /// Request id printed at submission.
    #[arg(value_name = "REQUEST_ID")]
    request_id: String,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI error wrapper for rendered error messages.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Human-readable error message.
    message: String,
}

impl CliError {
    /// Constructs a new [`CliError`] from a message.
    const fn new(message: String) -> Self {
        Self {
            message,
        }
    }
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    init_tracing();
    match run(Cli::parse()).await {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Installs the global tracing subscriber.
fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

/// Executes the CLI command dispatcher.
async fn run(cli: Cli) -> CliResult<ExitCode> {
    let config = PublisherConfig::load(cli.config.as_deref())
        .map_err(|err| CliError::new(format!("failed to load config: {err}")))?;
    match cli.command {
        Commands::Worker => command_worker(&config).await,
        Commands::Submit(command) => command_submit(&config, &command).await,
        Commands::SubmitFs(command) => command_submit_fs(&config, &command).await,
        Commands::CopyImage(command) => command_copy_image(&config, &command).await,
        Commands::CollectImage(command) => command_collect_image(&config, &command).await,
        Commands::Status(args) => command_status(&config, &args).await,
        Commands::Result(args) => command_result(&config, &args).await,
        Commands::ResetRateLimit => command_reset_rate_limit(&config).await,
    }
}

// ============================================================================
// SECTION: Backends
// ============================================================================

/// Redis-backed collaborators shared by every command.
struct Backends {
    /// Job status store.
    status: Arc<dyn StatusStore>,
    /// Rate-limit counters.
    counters: Arc<dyn CounterStore>,
    /// Distributed lock backend.
    locks: Arc<dyn LockBackend>,
    /// Stream producer.
    broker: Arc<dyn BrokerProducer>,
}

/// Connects to Redis and builds the shared backends on one connection.
async fn connect_backends(redis: &RedisConfig) -> CliResult<Backends> {
    let conn = connect(&redis.url)
        .await
        .map_err(|err| CliError::new(format!("failed to connect to redis: {err}")))?;
    Ok(Backends {
        status: Arc::new(RedisStatusStore::new(conn.clone())),
        counters: Arc::new(RedisCounterStore::new(conn.clone())),
        locks: Arc::new(RedisLock::new(conn.clone())),
        broker: Arc::new(RedisStreamBroker::new(conn, redis.stream.clone())),
    })
}

/// Builds the OCI registry client from the `[registry]` section.
fn build_registry(registry: &RegistryConfig) -> Arc<OciRegistry> {
    Arc::new(OciRegistry::new(&registry_credentials(registry)))
}

/// Maps the `[registry]` section to client credentials.
fn registry_credentials(registry: &RegistryConfig) -> RegistryCredentials {
    RegistryCredentials {
        username: registry.username.clone(),
        password: registry.password.clone(),
        insecure_registries: registry.insecure_registries.clone(),
    }
}

/// Maps the `[worker.s3]` section to object store settings.
fn s3_settings(s3: &S3Config) -> S3Settings {
    S3Settings {
        bucket: s3.bucket.clone(),
        region: s3.region.clone(),
        endpoint: s3.endpoint.clone(),
        access_key: s3.access_key.clone(),
        secret_key: s3.secret_key.clone(),
        session_token: s3.session_token.clone(),
        force_path_style: s3.force_path_style,
    }
}

/// Builds a submitter for the configured stream and delivery rules.
async fn build_submitter(config: &PublisherConfig) -> CliResult<Submitter> {
    let backends = connect_backends(&config.redis).await?;
    let rules = config.compiled_rules().map_err(|err| CliError::new(err.to_string()))?;
    Ok(Submitter::builder(backends.broker, backends.status, build_registry(&config.registry))
        .source(config.service.event_source.clone())
        .status_ttl(config.service.status_ttl())
        .rules(rules)
        .build())
}

// ============================================================================
// SECTION: Worker Command
// ============================================================================

/// Executes the `worker` command until interrupted.
async fn command_worker(config: &PublisherConfig) -> CliResult<ExitCode> {
    let worker_config =
        config.require_worker().map_err(|err| CliError::new(err.to_string()))?;
    let backends = connect_backends(&config.redis).await?;
    let registry = build_registry(&config.registry);
    let role = build_role(worker_config, &backends, registry).await?;

    let mut context = WorkerContext::new(Arc::clone(&backends.status))
        .with_status_ttl(config.service.status_ttl());
    if let Some(url) = &config.notify.webhook_url {
        let notifier =
            WebhookNotifier::new(url.clone()).map_err(|err| CliError::new(err.to_string()))?;
        context = context.with_notifier(Arc::new(notifier));
    }
    let worker = Worker::new(context, role);

    let subscription_conn = connect(&config.redis.url)
        .await
        .map_err(|err| CliError::new(format!("failed to connect to redis: {err}")))?;
    let settings = StreamSettings {
        stream: config.redis.stream.clone(),
        group: config.redis.group.clone(),
        consumer: config.redis.consumer.clone(),
        block_ms: config.redis.block_ms,
    };
    let mut subscription = RedisStreamBroker::subscribe(subscription_conn, settings)
        .await
        .map_err(|err| CliError::new(format!("failed to subscribe: {err}")))?;

    tracing::info!(
        stream = %config.redis.stream,
        group = %config.redis.group,
        consumer = %config.redis.consumer,
        "worker started"
    );
    worker
        .run(&mut subscription, shutdown_signal())
        .await
        .map_err(|err| CliError::new(format!("worker stopped: {err}")))?;
    tracing::info!("worker stopped");
    Ok(ExitCode::SUCCESS)
}

/// Builds the destination handler selected by `[worker].kind`.
async fn build_role(
    worker: &WorkerConfig,
    backends: &Backends,
    registry: Arc<OciRegistry>,
) -> CliResult<WorkerRole> {
    match worker.kind {
        WorkerKind::Mirror => {
            let mirror = worker
                .mirror
                .as_ref()
                .ok_or_else(|| CliError::new("worker.mirror is required".to_string()))?;
            let fetcher = Arc::new(SourceFetcher::new(registry, build_downloader()?));
            let publisher = Arc::new(TiupCli::new(mirror.url.clone()));
            let limiter =
                RateLimiter::for_mirrors(Arc::clone(&backends.counters), worker.nightly_window());
            let lock = MirrorLock::new(Arc::clone(&backends.locks), mirror.lock_settings());
            let handler = MirrorHandler::new(
                mirror.name.clone(),
                mirror.url.clone(),
                fetcher,
                publisher,
                limiter,
                lock,
            )
            .with_retry(mirror.retry_policy())
            .with_verify(mirror.verify);
            Ok(WorkerRole::Mirror(handler))
        }
        WorkerKind::Fileserver => {
            let s3 = worker
                .s3
                .as_ref()
                .ok_or_else(|| CliError::new("worker.s3 is required".to_string()))?;
            let store = S3ObjectStore::connect(&s3_settings(s3))
                .await
                .map_err(|err| CliError::new(err.to_string()))?;
            let fetcher = Arc::new(SourceFetcher::new(registry, build_downloader()?));
            Ok(WorkerRole::Fileserver(FileserverHandler::new(fetcher, Arc::new(store))))
        }
        WorkerKind::Image => Ok(WorkerRole::Image(ImageHandler::new(registry))),
    }
}

/// Builds the HTTP downloader used for sources and verification.
fn build_downloader() -> CliResult<HttpDownloader> {
    HttpDownloader::new().map_err(|err| CliError::new(err.to_string()))
}

/// Resolves when the process receives Ctrl-C.
async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}

// ============================================================================
// SECTION: Submission Commands
// ============================================================================

/// Executes the `submit` command.
async fn command_submit(config: &PublisherConfig, command: &SubmitCommand) -> CliResult<ExitCode> {
    let submitter = build_submitter(config).await?;
    let ids = match command.mirror.as_deref() {
        Some(mirror) if command.dry_run => {
            let requests = submitter
                .derive_requests(&command.artifact, mirror, command.version.as_deref())
                .await
                .map_err(|err| CliError::new(err.to_string()))?;
            let rendered = serde_json::to_string_pretty(&requests)
                .map_err(|err| CliError::new(format!("failed to render requests: {err}")))?;
            write_stdout(&rendered)?;
            return Ok(ExitCode::SUCCESS);
        }
        Some(mirror) => submitter
            .submit_tiup(&command.artifact, mirror, command.version.as_deref())
            .await
            .map_err(|err| CliError::new(err.to_string()))?,
        None => submitter
            .submit_by_rules(&command.artifact)
            .await
            .map_err(|err| CliError::new(err.to_string()))?,
    };
    write_request_ids(&ids)
}

/// Executes the `submit-fs` command.
async fn command_submit_fs(
    config: &PublisherConfig,
    command: &SubmitFsCommand,
) -> CliResult<ExitCode> {
    let submitter = build_submitter(config).await?;
    let ids = submitter
        .submit_fs(&command.artifact)
        .await
        .map_err(|err| CliError::new(err.to_string()))?;
    write_request_ids(&ids)
}

/// Executes the `copy-image` command.
async fn command_copy_image(
    config: &PublisherConfig,
    command: &CopyImageCommand,
) -> CliResult<ExitCode> {
    let submitter = build_submitter(config).await?;
    let id = submitter
        .submit_image_copy(&command.source, &command.destination)
        .await
        .map_err(|err| CliError::new(err.to_string()))?;
    write_request_ids(&[id])
}

/// Executes the `collect-image` command.
async fn command_collect_image(
    config: &PublisherConfig,
    command: &CollectImageCommand,
) -> CliResult<ExitCode> {
    let submitter = build_submitter(config).await?;
    let id = submitter
        .submit_multiarch_collect(&command.image, &command.release_tag_suffix)
        .await
        .map_err(|err| CliError::new(err.to_string()))?;
    write_request_ids(&[id])
}

// ============================================================================
// SECTION: Query Commands
// ============================================================================

/// Executes the `status` command.
async fn command_status(config: &PublisherConfig, args: &RequestIdArgs) -> CliResult<ExitCode> {
    let submitter = build_submitter(config).await?;
    let status = submitter
        .status(&parse_request_id(&args.request_id)?)
        .await
        .map_err(|err| CliError::new(err.to_string()))?;
    write_stdout(status.as_str())?;
    Ok(ExitCode::SUCCESS)
}

/// Executes the `result` command.
async fn command_result(config: &PublisherConfig, args: &RequestIdArgs) -> CliResult<ExitCode> {
    let submitter = build_submitter(config).await?;
    let result = submitter
        .result(&parse_request_id(&args.request_id)?)
        .await
        .map_err(|err| CliError::new(err.to_string()))?;
    write_stdout(&result)?;
    Ok(ExitCode::SUCCESS)
}

/// Executes the `reset-rate-limit` command.
async fn command_reset_rate_limit(config: &PublisherConfig) -> CliResult<ExitCode> {
    let backends = connect_backends(&config.redis).await?;
    let window =
        config.worker.as_ref().map_or(DEFAULT_NIGHTLY_WINDOW, WorkerConfig::nightly_window);
    let removed = RateLimiter::for_mirrors(backends.counters, window)
        .reset()
        .await
        .map_err(|err| CliError::new(err.to_string()))?;
    write_stdout(&format!("removed {removed} rate limit counters"))?;
    Ok(ExitCode::SUCCESS)
}

/// Validates a request id argument.
fn parse_request_id(value: &str) -> CliResult<RequestId> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(CliError::new("request id must not be empty".to_string()));
    }
    Ok(RequestId::new(trimmed))
}

// ============================================================================
// SECTION: Output Helpers
// ============================================================================

/// Writes one request id per line.
fn write_request_ids(ids: &[RequestId]) -> CliResult<ExitCode> {
    write_stdout(&render_request_ids(ids))?;
    Ok(ExitCode::SUCCESS)
}

/// Renders request ids one per line.
fn render_request_ids(ids: &[RequestId]) -> String {
    ids.iter().map(RequestId::as_str).collect::<Vec<_>>().join("\n")
}

/// Writes a line to stdout.
fn write_stdout(message: &str) -> CliResult<()> {
    if message.is_empty() {
        return Ok(());
    }
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}")
        .map_err(|err| CliError::new(format!("failed to write stdout: {err}")))
}

/// Writes a line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Emits an error message to stderr and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(message);
    ExitCode::FAILURE
}
