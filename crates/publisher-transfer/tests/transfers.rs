// crates/publisher-transfer/tests/transfers.rs
// ============================================================================
// Module: Transfer Adapter Tests
// Description: HTTP, webhook, fetcher, registry, and mirror CLI adapters end to end.
// Purpose: Exercise adapters against local servers and scripted programs.
// Dependencies: publisher-transfer, publisher-core, oci-client, testcontainers, tiny_http, tokio
// ============================================================================

//! ## Overview
//! Serves fixtures from `tiny_http` on a background thread and drives the
//! adapters through their `publisher-core` interfaces. Registry copies run
//! against `registry:2` containers and are ignored by default because Docker
//! is required.

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

use std::sync::Arc;
use std::sync::mpsc;
use std::thread::JoinHandle;

use bytes::Bytes;
use oci_client::Client;
use oci_client::Reference;
use oci_client::client::ClientConfig;
use oci_client::client::ClientProtocol;
use oci_client::client::Config;
use oci_client::client::ImageLayer;
use oci_client::manifest;
use oci_client::secrets::RegistryAuth;
use publisher_core::ArtifactSource;
use publisher_core::OciSource;
use publisher_core::core::HttpSource;
use publisher_core::core::hex_encode;
use publisher_core::interfaces::ArtifactFetcher;
use publisher_core::interfaces::FailureReport;
use publisher_core::interfaces::ImageRegistry;
use publisher_core::interfaces::Notifier;
use publisher_core::interfaces::TransferError;
use publisher_transfer::HttpDownloader;
use publisher_transfer::OciRegistry;
use publisher_transfer::RegistryCredentials;
use publisher_transfer::SourceFetcher;
use publisher_transfer::WebhookNotifier;
use serde_json::Value;
use serde_json::json;
use sha2::Digest;
use sha2::Sha256;
use tempfile::tempdir;
use testcontainers::ContainerAsync;
use testcontainers::GenericImage;
use testcontainers::core::IntoContainerPort;
use testcontainers::core::WaitFor;
use testcontainers::runners::AsyncRunner;
use tiny_http::Response;
use tiny_http::Server;

// ============================================================================
// SECTION: HTTP Downloads
// ============================================================================

/// Tests downloads land under the URL's file name with the served bytes.
#[tokio::test]
async fn http_download_writes_named_file() {
    let body = vec![7_u8; 200 * 1024];
    let (base, handle) = serve_once(200, body.clone());
    let dir = tempdir().unwrap();
    let downloader = HttpDownloader::new().unwrap();

    let path = downloader
        .download(&format!("{base}/tidb-v8.5.0-linux-amd64.tar.gz"), dir.path())
        .await
        .unwrap();

    assert_eq!(path, dir.path().join("tidb-v8.5.0-linux-amd64.tar.gz"));
    assert_eq!(std::fs::read(&path).unwrap(), body);
    handle.join().unwrap();
}

/// Tests any status other than 200 fails the download.
#[tokio::test]
async fn http_download_rejects_non_ok_status() {
    let (base, handle) = serve_once(404, b"missing".to_vec());
    let dir = tempdir().unwrap();
    let downloader = HttpDownloader::new().unwrap();

    let err = downloader.download(&format!("{base}/gone.tar.gz"), dir.path()).await.unwrap_err();

    assert!(matches!(err, TransferError::Http(_)));
    assert!(err.to_string().contains("unexpected status code: 404"));
    handle.join().unwrap();
}

/// Tests remote checksums match a local hash of the served bytes.
#[tokio::test]
async fn remote_checksum_matches_served_bytes() {
    let body = b"package tarball bytes".to_vec();
    let expected = hex_encode(&Sha256::digest(&body));
    let (base, handle) = serve_once(200, body);
    let fetcher = fetcher();

    let actual = fetcher.remote_sha256(&format!("{base}/tidb.tar.gz")).await.unwrap();

    assert_eq!(actual, expected);
    handle.join().unwrap();
}

/// Tests HTTP sources route through the HTTP downloader.
#[tokio::test]
async fn fetcher_downloads_http_sources() {
    let (base, handle) = serve_once(200, b"tikv".to_vec());
    let dir = tempdir().unwrap();
    let source = ArtifactSource::Http(HttpSource {
        url: format!("{base}/tikv-v8.5.0-linux-arm64.tar.gz"),
    });

    let path = fetcher().download(&source, dir.path()).await.unwrap();

    assert_eq!(std::fs::read(path).unwrap(), b"tikv");
    handle.join().unwrap();
}

/// Tests OCI sources must name a layer file.
#[tokio::test]
async fn fetcher_rejects_oci_source_without_file() {
    let dir = tempdir().unwrap();
    let source = ArtifactSource::Oci(OciSource {
        repo: "hub.example.com/pingcap/tidb/package".to_string(),
        tag: "v8.5.0_linux_amd64".to_string(),
        file: String::new(),
    });

    let err = fetcher().download(&source, dir.path()).await.unwrap_err();

    assert!(matches!(err, TransferError::Invalid(_)));
}

// ============================================================================
// SECTION: Webhook
// ============================================================================

/// Tests failure reports are posted as text messages.
#[tokio::test]
async fn webhook_posts_rendered_report() {
    let (base, bodies, handle) = capture_once(200);
    let notifier = WebhookNotifier::new(format!("{base}/hook")).unwrap();

    notifier.notify(&report()).await.unwrap();

    let body: Value = serde_json::from_str(&bodies.recv().unwrap()).unwrap();
    assert_eq!(body["msg_type"], json!("text"));
    let text = body["content"]["text"].as_str().unwrap();
    assert!(text.starts_with("TiUP Publish Failed\n"));
    assert!(text.contains("- package: tidb"));
    assert!(text.ends_with("- error: sha256 mismatch"));
    handle.join().unwrap();
}

/// Tests a non-OK webhook response is a delivery error.
#[tokio::test]
async fn webhook_non_ok_is_error() {
    let (base, _bodies, handle) = capture_once(500);
    let notifier = WebhookNotifier::new(format!("{base}/hook")).unwrap();

    let err = notifier.notify(&report()).await.unwrap_err();

    assert!(err.to_string().contains("non-OK status: 500"));
    handle.join().unwrap();
}

/// Tests webhook URLs must be HTTP.
#[test]
fn webhook_rejects_non_http_url() {
    assert!(WebhookNotifier::new("ftp://hooks.example.com").is_err());
}

// ============================================================================
// SECTION: Registry Copies
// ============================================================================

/// Tests a two-platform index copied within a registry keeps its digest.
#[tokio::test]
#[ignore = "requires docker"]
async fn copy_within_registry_keeps_index_digest() {
    let fixture = RegistryFixture::start().await.unwrap();
    let host = fixture.host.clone();
    let registry = OciRegistry::new(&fixture.credentials());
    seed_two_platform_index(&fixture, &registry).await;

    registry
        .copy(&format!("{host}/src/app:multi"), &format!("{host}/dst/app:multi"))
        .await
        .unwrap();

    assert_copied_index(&registry, &host, &host).await;
}

/// Tests an index copied across registries streams every blob and keeps its digest.
#[tokio::test]
#[ignore = "requires docker"]
async fn copy_across_registries_keeps_index_digest() {
    let source = RegistryFixture::start().await.unwrap();
    let destination = RegistryFixture::start().await.unwrap();
    let registry = OciRegistry::new(&RegistryCredentials {
        insecure_registries: vec![source.host.clone(), destination.host.clone()],
        ..RegistryCredentials::default()
    });
    seed_two_platform_index(&source, &registry).await;

    registry
        .copy(
            &format!("{}/src/app:multi", source.host),
            &format!("{}/dst/app:multi", destination.host),
        )
        .await
        .unwrap();

    assert_copied_index(&registry, &source.host, &destination.host).await;
}

/// Registry server for one test.
struct RegistryFixture {
    /// Registry host and port.
    host: String,
    /// Container kept alive for the fixture lifetime.
    _container: ContainerAsync<GenericImage>,
}

impl RegistryFixture {
    /// Starts a `registry:2` container.
    async fn start() -> Result<Self, String> {
        ensure_docker_available()?;
        let container = GenericImage::new("registry", "2")
            .with_exposed_port(5000.tcp())
            .with_wait_for(WaitFor::message_on_stderr("listening on"))
            .start()
            .await
            .map_err(|err| format!("failed to start registry container: {err}"))?;
        let port = container
            .get_host_port_ipv4(5000.tcp())
            .await
            .map_err(|err| format!("failed to resolve registry port: {err}"))?;
        Ok(Self {
            host: format!("127.0.0.1:{port}"),
            _container: container,
        })
    }

    /// Credentials reaching this registry over plain HTTP.
    fn credentials(&self) -> RegistryCredentials {
        RegistryCredentials {
            insecure_registries: vec![self.host.clone()],
            ..RegistryCredentials::default()
        }
    }

    /// Raw client used to seed images.
    fn client(&self) -> Client {
        Client::new(ClientConfig {
            protocol: ClientProtocol::HttpsExcept(vec![self.host.clone()]),
            ..Default::default()
        })
    }
}

/// Pushes amd64 and arm64 images and indexes them as `src/app:multi`.
///
/// The arm64 image carries a layer media type outside the usual tar set.
async fn seed_two_platform_index(fixture: &RegistryFixture, registry: &OciRegistry) {
    let host = &fixture.host;
    let client = fixture.client();
    push_platform_image(
        &client,
        &format!("{host}/src/app:amd64"),
        "amd64",
        manifest::IMAGE_LAYER_GZIP_MEDIA_TYPE,
    )
    .await;
    push_platform_image(
        &client,
        &format!("{host}/src/app:arm64"),
        "arm64",
        "application/vnd.example.firmware.v1",
    )
    .await;
    registry
        .push_index(
            &format!("{host}/src/app"),
            &["multi".to_string()],
            &[format!("{host}/src/app:amd64"), format!("{host}/src/app:arm64")],
        )
        .await
        .unwrap();
}

/// Pushes a one-layer image whose config names `architecture`.
async fn push_platform_image(
    client: &Client,
    reference: &str,
    architecture: &str,
    layer_media_type: &str,
) {
    let image: Reference = reference.parse().unwrap();
    let layer = ImageLayer::new(
        Bytes::from(format!("{architecture} payload").into_bytes()),
        layer_media_type.to_string(),
        None,
    );
    let config_json = json!({
        "architecture": architecture,
        "os": "linux",
        "rootfs": {"type": "layers", "diff_ids": []},
    });
    let config = Config::new(
        Bytes::from(serde_json::to_vec(&config_json).unwrap()),
        manifest::IMAGE_CONFIG_MEDIA_TYPE.to_string(),
        None,
    );
    client.push(&image, &[layer], config, &RegistryAuth::Anonymous, None).await.unwrap();
}

/// Asserts `dst/app:multi` matches `src/app:multi` and both platforms resolve.
async fn assert_copied_index(registry: &OciRegistry, source_host: &str, destination_host: &str) {
    let source_repo = format!("{source_host}/src/app");
    let destination_repo = format!("{destination_host}/dst/app");
    let source_index = registry.manifest_digest(&source_repo, "multi").await.unwrap();
    let copied_index = registry.manifest_digest(&destination_repo, "multi").await.unwrap();
    assert!(source_index.is_some());
    assert_eq!(copied_index, source_index);
    for platform in ["amd64", "arm64"] {
        let child = registry.manifest_digest(&source_repo, platform).await.unwrap().unwrap();
        let copied_child = registry.manifest_digest(&destination_repo, &child).await.unwrap();
        assert_eq!(copied_child.as_deref(), Some(child.as_str()));
    }
}

/// Fails fast when Docker is not reachable.
fn ensure_docker_available() -> Result<(), String> {
    let output = std::process::Command::new("docker")
        .arg("info")
        .output()
        .map_err(|err| format!("docker info failed: {err}"))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(format!("docker info failed: {stderr}"));
    }
    Ok(())
}

// ============================================================================
// SECTION: Mirror CLI
// ============================================================================

#[cfg(unix)]
mod mirror_cli {
    //! Scripted stand-ins for the mirror CLI.

    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;
    use std::path::PathBuf;

    use publisher_core::PublishInfo;
    use publisher_core::interfaces::MirrorPublisher;
    use publisher_core::interfaces::TransferError;
    use publisher_transfer::TiupCli;
    use tempfile::tempdir;

    /// Tests the CLI receives publish arguments and the mirror variable.
    #[tokio::test]
    async fn tiup_receives_arguments_and_mirror() {
        let dir = tempdir().unwrap();
        let log = dir.path().join("calls.log");
        let program = script(
            dir.path(),
            &format!("echo \"$TIUP_MIRRORS $*\" > {}\necho published", log.display()),
        );
        let cli = TiupCli::new("https://mirror.example.com").with_program(program);

        cli.publish(Path::new("/tmp/tidb.tar.gz"), &info(true)).await.unwrap();

        let logged = std::fs::read_to_string(log).unwrap();
        assert_eq!(
            logged.trim(),
            "https://mirror.example.com mirror publish tidb v8.5.0 /tmp/tidb.tar.gz tidb-server \
             --os linux --arch amd64 --desc TiDB --standalone"
        );
    }

    /// Tests a failing CLI surfaces its combined output.
    #[tokio::test]
    async fn tiup_failure_carries_output() {
        let dir = tempdir().unwrap();
        let program = script(dir.path(), "echo out\necho 'mirror unreachable' >&2\nexit 3");
        let cli = TiupCli::new("https://mirror.example.com").with_program(program);

        let err = cli.publish(Path::new("/tmp/tidb.tar.gz"), &info(false)).await.unwrap_err();

        assert!(matches!(err, TransferError::Command(_)));
        let message = err.to_string();
        assert!(message.contains("tiup command execute failed"));
        assert!(message.contains("mirror unreachable"));
    }

    /// Tests a missing program is a command error.
    #[tokio::test]
    async fn tiup_missing_program_is_command_error() {
        let cli = TiupCli::new("https://mirror.example.com")
            .with_program("/nonexistent/publisher-tests/tiup");

        let err = cli.publish(Path::new("/tmp/tidb.tar.gz"), &info(false)).await.unwrap_err();

        assert!(matches!(err, TransferError::Command(_)));
    }

    /// Writes an executable shell script.
    fn script(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("tiup");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        let mut permissions = std::fs::metadata(&path).unwrap().permissions();
        permissions.set_mode(0o755);
        std::fs::set_permissions(&path, permissions).unwrap();
        path
    }

    /// Builds publish metadata for `tidb`.
    fn info(standalone: bool) -> PublishInfo {
        PublishInfo {
            name: "tidb".to_string(),
            os: "linux".to_string(),
            arch: "amd64".to_string(),
            version: "v8.5.0".to_string(),
            description: "TiDB".to_string(),
            entry_point: "tidb-server".to_string(),
            standalone,
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Serves one response and returns the base URL.
fn serve_once(status: u16, body: Vec<u8>) -> (String, JoinHandle<()>) {
    let server = Server::http("127.0.0.1:0").expect("http server");
    let addr = server.server_addr();
    let handle = std::thread::spawn(move || {
        if let Ok(request) = server.recv() {
            let response = Response::from_data(body).with_status_code(status);
            request.respond(response).expect("respond");
        }
    });
    (format!("http://{addr}"), handle)
}

/// Captures one request body and answers with `status`.
fn capture_once(status: u16) -> (String, mpsc::Receiver<String>, JoinHandle<()>) {
    let server = Server::http("127.0.0.1:0").expect("http server");
    let addr = server.server_addr();
    let (tx, rx) = mpsc::channel();
    let handle = std::thread::spawn(move || {
        if let Ok(mut request) = server.recv() {
            let mut body = String::new();
            request.as_reader().read_to_string(&mut body).expect("body");
            tx.send(body).expect("send");
            request.respond(Response::empty(status)).expect("respond");
        }
    });
    (format!("http://{addr}"), rx, handle)
}

/// Builds a fetcher with anonymous registry access.
fn fetcher() -> SourceFetcher {
    SourceFetcher::new(
        Arc::new(OciRegistry::new(&RegistryCredentials::default())),
        HttpDownloader::new().unwrap(),
    )
}

/// Builds a mirror failure report.
fn report() -> FailureReport {
    FailureReport {
        title: "TiUP Publish Failed".to_string(),
        fields: vec![
            ("package".to_string(), "tidb".to_string()),
            ("version".to_string(), "v8.5.0".to_string()),
        ],
        error: "sha256 mismatch".to_string(),
    }
}
