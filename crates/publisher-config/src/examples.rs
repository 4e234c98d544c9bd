// crates/publisher-config/src/examples.rs
// ============================================================================
// Module: Config Examples
// Description: Canonical example configuration payload.
// Purpose: Deterministic example for docs and tooling.
// Dependencies: std
// ============================================================================

//! ## Overview
//! Canonical example for publisher configuration, kept loadable by tests.

/// Returns a canonical example `publisher.toml` configuration.
#[must_use]
pub fn config_toml_example() -> String {
    String::from(
        r#"[redis]
url = "redis://127.0.0.1:6379"
stream = "publisher-jobs"
group = "tiup-staging"
consumer = "worker-1"
block_ms = 5000

[service]
event_source = "publisher"
status_ttl_secs = 43200

[registry]
# username = "robot"
# password = "secret"
insecure_registries = []

[worker]
kind = "mirror"
nightly_interval_secs = 43200

[worker.mirror]
name = "staging"
url = "http://tiup.staging.example.com"
publish_attempts = 3
publish_retry_delay_secs = 60
lock_name = "global/mutex/tiup-publishing"
lock_ttl_secs = 600
lock_tries = 300
lock_retry_delay_ms = 1000
verify = true

[worker.s3]
bucket = "fileserver"
region = "us-east-1"
# endpoint = "http://minio.example.com:9000"
# access_key = "minioadmin"
# secret_key = "minioadmin"
force_path_style = false

[notify]
# webhook_url = "https://open.feishu.cn/open-apis/bot/v2/hook/token"

[[delivery_rules]]
repo = "^hub\\.example\\.com/pingcap/.+/package$"
tags = ["^v\\d+\\.\\d+\\.\\d+_(linux|darwin)_(amd64|arm64)$"]
dest_mirrors = ["staging", "prod"]

[[delivery_rules]]
repo = "^hub\\.example\\.com/pingcap/.+/package$"
tags = ["^(master|main)_(linux|darwin)_(amd64|arm64)$"]
dest_mirrors = ["staging"]
"#,
    )
}
