// Hashing module using BLAKE3
// Used to verify that blob writes landed intact.

use std::fs::File;
use std::io::Read;
use std::path::Path;
use crate::constants::HASH_CHUNK_SIZE;
use crate::error::{PlantScopeError, Result};

/// Compute full BLAKE3 hash of entire file
/// Format: "blake3:full:<hash>"
pub fn compute_full_hash(path: &Path) -> Result<String> {
    let mut file = File::open(path)
        .map_err(|e| PlantScopeError::Other(format!("Failed to open file for hashing: {}", e)))?;

    let mut hasher = blake3::Hasher::new();
    let mut buffer = vec![0u8; HASH_CHUNK_SIZE];

    loop {
        let bytes_read = file.read(&mut buffer)
            .map_err(|e| PlantScopeError::Other(format!("Failed to read for hashing: {}", e)))?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    let hash = hasher.finalize();
    Ok(format!("blake3:full:{}", hash.to_hex()))
}

/// Compute full BLAKE3 hash from an in-memory byte slice.
pub fn compute_full_hash_from_bytes(data: &[u8]) -> String {
    let hash = blake3::hash(data);
    format!("blake3:full:{}", hash.to_hex())
}

/// Verify a file matches an expected hash
pub fn verify_hash(path: &Path, expected_hash: &str) -> Result<bool> {
    Ok(compute_full_hash(path)? == expected_hash)
}
