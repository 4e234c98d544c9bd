// crates/publisher-core/src/core/hashing.rs
// ============================================================================
// Module: Publisher Content Hashing
// Description: Streaming SHA-256 over local files.
// Purpose: Compare downloaded and published artifacts without loading them whole.
// Dependencies: sha2, tokio
// ============================================================================

//! ## Overview
//! Checksums are lowercase hex SHA-256 digests computed over fixed-size reads,
//! so large tarballs never sit fully in memory.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;

use sha2::Digest;
use sha2::Sha256;
use thiserror::Error;
use tokio::io::AsyncReadExt;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while hashing content.
#[derive(Debug, Error)]
pub enum HashError {
    /// File could not be read.
    #[error("hash io error: {0}")]
    Io(String),
}

// ============================================================================
// SECTION: Hashing Helpers
// ============================================================================

/// Read buffer size for streaming hashes.
const HASH_CHUNK_BYTES: usize = 64 * 1024;

/// Computes the lowercase hex SHA-256 digest of a file.
///
/// # Errors
///
/// Returns [`HashError::Io`] when the file cannot be opened or read.
pub async fn sha256_file(path: &Path) -> Result<String, HashError> {
    let mut file =
        tokio::fs::File::open(path).await.map_err(|err| HashError::Io(err.to_string()))?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0_u8; HASH_CHUNK_BYTES];
    loop {
        let read = file.read(&mut buffer).await.map_err(|err| HashError::Io(err.to_string()))?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[.. read]);
    }
    Ok(hex_encode(&hasher.finalize()))
}

/// Encodes bytes as a lowercase hex string.
#[must_use]
pub fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(HEX[(byte >> 4) as usize] as char);
        out.push(HEX[(byte & 0x0f) as usize] as char);
    }
    out
}
