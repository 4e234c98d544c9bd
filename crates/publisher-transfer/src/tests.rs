// crates/publisher-transfer/src/tests.rs
// ============================================================================
// Module: Transfer Unit Tests
// Description: Pure helpers behind the transfer adapters.
// Purpose: Pin argument lists, file naming, and wire payloads.
// Dependencies: publisher-transfer, serde_json
// ============================================================================

//! ## Overview
//! Unit tests for transfer helpers that need no network.

// ============================================================================
// SECTION: Lint Configuration
// ============================================================================

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

use std::path::Path;

use publisher_core::PublishInfo;
use serde_json::json;
use url::Url;

use crate::http::file_name_from_url;
use crate::http::parse_http_url;
use crate::notify::TextContent;
use crate::notify::TextMessage;
use crate::oci::PlatformConfig;
use crate::oci::blob_descriptors;
use crate::oci::child_digests;
use crate::oci::classify_manifest;
use crate::oci::index_entry_json;
use crate::oci::join_reference;
use crate::oci::validate_file_name;
use crate::tiup::publish_args;

// ============================================================================
// SECTION: TiUP
// ============================================================================

/// Tests the mirror publish argument order.
#[test]
fn tiup_args_follow_cli_order() {
    let info = PublishInfo {
        name: "tidb".to_string(),
        os: "linux".to_string(),
        arch: "amd64".to_string(),
        version: "v8.5.0".to_string(),
        description: "TiDB server".to_string(),
        entry_point: "tidb-server".to_string(),
        standalone: false,
    };
    let args = publish_args(Path::new("/tmp/tidb-v8.5.0-linux-amd64.tar.gz"), &info);
    assert_eq!(
        args,
        [
            "mirror",
            "publish",
            "tidb",
            "v8.5.0",
            "/tmp/tidb-v8.5.0-linux-amd64.tar.gz",
            "tidb-server",
            "--os",
            "linux",
            "--arch",
            "amd64",
            "--desc",
            "TiDB server",
        ]
    );
}

/// Tests standalone packages get the trailing flag.
#[test]
fn tiup_args_mark_standalone() {
    let info = PublishInfo {
        name: "ctl".to_string(),
        standalone: true,
        ..PublishInfo::default()
    };
    let args = publish_args(Path::new("ctl.tar.gz"), &info);
    assert_eq!(args.last().map(String::as_str), Some("--standalone"));
}

// ============================================================================
// SECTION: HTTP
// ============================================================================

/// Tests download file names come from the last path segment.
#[test]
fn file_names_come_from_url_path() {
    let url = Url::parse("https://mirror.example.com/tidb-v8.5.0-linux-amd64.tar.gz?x=1").unwrap();
    assert_eq!(file_name_from_url(&url), "tidb-v8.5.0-linux-amd64.tar.gz");
    let dir = Url::parse("https://mirror.example.com/packages/").unwrap();
    assert_eq!(file_name_from_url(&dir), "packages");
    let root = Url::parse("https://mirror.example.com/").unwrap();
    assert_eq!(file_name_from_url(&root), "download");
}

/// Tests only HTTP schemes are accepted.
#[test]
fn only_http_urls_are_accepted() {
    assert!(parse_http_url("http://127.0.0.1:8080/a").is_ok());
    assert!(parse_http_url("file:///etc/passwd").is_err());
    assert!(parse_http_url("not a url").is_err());
}

// ============================================================================
// SECTION: OCI
// ============================================================================

/// Tests digests join with `@` and tags with `:`.
#[test]
fn references_join_tags_and_digests() {
    assert_eq!(join_reference("hub.example.com/pingcap/tidb", "v8.5.0"), "hub.example.com/pingcap/tidb:v8.5.0");
    assert_eq!(
        join_reference("hub.example.com/pingcap/tidb", "sha256:abc"),
        "hub.example.com/pingcap/tidb@sha256:abc"
    );
}

/// Tests layer titles cannot escape the download directory.
#[test]
fn layer_titles_are_plain_file_names() {
    assert!(validate_file_name("tidb-v8.5.0-linux-amd64.tar.gz").is_ok());
    assert!(validate_file_name("../etc/passwd").is_err());
    assert!(validate_file_name("a/b").is_err());
    assert!(validate_file_name("..").is_err());
    assert!(validate_file_name("").is_err());
}

/// Tests index entries carry platform and variant.
#[test]
fn index_entries_carry_platform() {
    let platform: PlatformConfig =
        serde_json::from_value(json!({"os": "linux", "architecture": "arm64", "variant": "v8", "rootfs": {}}))
            .unwrap();
    let entry = index_entry_json("application/vnd.oci.image.manifest.v1+json", "sha256:abc", 512, &platform);
    assert_eq!(
        entry,
        json!({
            "mediaType": "application/vnd.oci.image.manifest.v1+json",
            "digest": "sha256:abc",
            "size": 512,
            "platform": {"architecture": "arm64", "os": "linux", "variant": "v8"},
        })
    );
}

/// Tests declared media types decide whether a manifest is an index.
#[test]
fn manifests_classify_by_declared_media_type() {
    let docker_list = json!({
        "schemaVersion": 2,
        "mediaType": "application/vnd.docker.distribution.manifest.list.v2+json",
        "manifests": [],
    });
    let kind = classify_manifest(&serde_json::to_vec(&docker_list).unwrap()).unwrap();
    assert!(kind.is_index);
    assert_eq!(kind.media_type, "application/vnd.docker.distribution.manifest.list.v2+json");

    let docker_image = json!({
        "schemaVersion": 2,
        "mediaType": "application/vnd.docker.distribution.manifest.v2+json",
        "config": {},
        "layers": [],
    });
    let kind = classify_manifest(&serde_json::to_vec(&docker_image).unwrap()).unwrap();
    assert!(!kind.is_index);
    assert_eq!(kind.media_type, "application/vnd.docker.distribution.manifest.v2+json");
}

/// Tests manifests without a media type fall back to the OCI shapes.
#[test]
fn undeclared_manifests_classify_by_shape() {
    let index = classify_manifest(br#"{"schemaVersion": 2, "manifests": []}"#).unwrap();
    assert!(index.is_index);
    assert_eq!(index.media_type, "application/vnd.oci.image.index.v1+json");

    let image = classify_manifest(br#"{"schemaVersion": 2, "config": {}, "layers": []}"#).unwrap();
    assert!(!image.is_index);
    assert_eq!(image.media_type, "application/vnd.oci.image.manifest.v1+json");

    assert!(classify_manifest(b"not json").is_err());
}

/// Tests every index child is listed in order.
#[test]
fn index_children_are_listed_in_order() {
    let index = json!({
        "schemaVersion": 2,
        "mediaType": "application/vnd.oci.image.index.v1+json",
        "manifests": [
            {
                "mediaType": "application/vnd.oci.image.manifest.v1+json",
                "digest": "sha256:aaa",
                "size": 10,
                "platform": {"architecture": "amd64", "os": "linux"},
            },
            {
                "mediaType": "application/vnd.oci.image.manifest.v1+json",
                "digest": "sha256:bbb",
                "size": 12,
                "platform": {"architecture": "arm64", "os": "linux"},
            },
        ],
    });
    let digests = child_digests(&serde_json::to_vec(&index).unwrap()).unwrap();
    assert_eq!(digests, ["sha256:aaa", "sha256:bbb"]);
}

/// Tests the config and every hosted layer are copied, whatever their media type.
#[test]
fn blob_descriptors_cover_config_and_hosted_layers() {
    let image = json!({
        "schemaVersion": 2,
        "mediaType": "application/vnd.oci.image.manifest.v1+json",
        "config": {
            "mediaType": "application/vnd.oci.image.config.v1+json",
            "digest": "sha256:cfg",
            "size": 100,
        },
        "layers": [
            {
                "mediaType": "application/vnd.example.firmware.v1",
                "digest": "sha256:fw",
                "size": 2048,
            },
            {
                "mediaType": "application/vnd.docker.image.rootfs.foreign.diff.tar.gzip",
                "digest": "sha256:foreign",
                "size": 4096,
                "urls": ["https://downloads.example.com/base.tar.gz"],
            },
        ],
    });
    let descriptors = blob_descriptors(&serde_json::to_vec(&image).unwrap()).unwrap();
    let digests: Vec<&str> = descriptors.iter().map(|descriptor| descriptor.digest.as_str()).collect();
    assert_eq!(digests, ["sha256:cfg", "sha256:fw"]);
}

// ============================================================================
// SECTION: Notify
// ============================================================================

/// Tests the webhook body shape.
#[test]
fn webhook_body_is_text_message() {
    let message = TextMessage {
        msg_type: "text",
        content: TextContent {
            text: "TiUP Publish Failed",
        },
    };
    assert_eq!(
        serde_json::to_value(&message).unwrap(),
        json!({"msg_type": "text", "content": {"text": "TiUP Publish Failed"}})
    );
}
