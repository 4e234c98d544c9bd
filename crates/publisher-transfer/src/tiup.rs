// crates/publisher-transfer/src/tiup.rs
// ============================================================================
// Module: TiUP Mirror Publisher
// Description: Publishes packages by invoking the mirror CLI.
// Purpose: Upload one package tarball to a TiUP mirror.
// Dependencies: publisher-core, tokio, tracing
// ============================================================================

//! ## Overview
//! Runs `tiup mirror publish <name> <version> <file> <entrypoint> --os --arch
//! --desc [--standalone]` with `TIUP_MIRRORS` pointing at the target mirror.
//! Combined output is attached to failures.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;

use async_trait::async_trait;
use publisher_core::PublishInfo;
use publisher_core::interfaces::MirrorPublisher;
use publisher_core::interfaces::TransferError;
use tokio::process::Command;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default mirror CLI program.
pub const DEFAULT_TIUP_PROGRAM: &str = "tiup";
/// Environment variable selecting the mirror.
const MIRRORS_ENV: &str = "TIUP_MIRRORS";

// ============================================================================
// SECTION: Publisher
// ============================================================================

/// Mirror publisher shelling out to the TiUP CLI.
#[derive(Debug, Clone)]
pub struct TiupCli {
    /// Program invoked for publishing.
    program: PathBuf,
    /// Mirror URL exported as `TIUP_MIRRORS`.
    mirror_url: String,
}

impl TiupCli {
    /// Creates a publisher for `mirror_url` using the `tiup` on `PATH`.
    #[must_use]
    pub fn new(mirror_url: impl Into<String>) -> Self {
        Self {
            program: PathBuf::from(DEFAULT_TIUP_PROGRAM),
            mirror_url: mirror_url.into(),
        }
    }

    /// Overrides the program invoked.
    #[must_use]
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }
}

#[async_trait]
impl MirrorPublisher for TiupCli {
    async fn publish(&self, file: &Path, info: &PublishInfo) -> Result<(), TransferError> {
        let args = publish_args(file, info);
        tracing::debug!(program = %self.program.display(), args = %args.join(" "), "running mirror publish");
        let output = Command::new(&self.program)
            .args(&args)
            .env(MIRRORS_ENV, &self.mirror_url)
            .output()
            .await
            .map_err(|err| {
                TransferError::Command(format!("failed to run {}: {err}", self.program.display()))
            })?;
        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        if !output.status.success() {
            tracing::error!(status = %output.status, output = %combined, "mirror publish command failed");
            return Err(TransferError::Command(format!(
                "tiup command execute failed:\n{combined}"
            )));
        }
        tracing::info!(
            mirror = %self.mirror_url,
            package = %info.name,
            version = %info.version,
            output = %combined,
            "tiup package publish success"
        );
        Ok(())
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Builds the `tiup mirror publish` argument list.
pub(crate) fn publish_args(file: &Path, info: &PublishInfo) -> Vec<String> {
    let mut args = vec![
        "mirror".to_string(),
        "publish".to_string(),
        info.name.clone(),
        info.version.clone(),
        file.display().to_string(),
        info.entry_point.clone(),
        "--os".to_string(),
        info.os.clone(),
        "--arch".to_string(),
        info.arch.clone(),
        "--desc".to_string(),
        info.description.clone(),
    ];
    if info.standalone {
        args.push("--standalone".to_string());
    }
    args
}
