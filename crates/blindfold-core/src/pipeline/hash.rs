//! BLAKE3 content digests, used to report whether scrubbing changed a file.

use blake3::Hasher as Blake3Hasher;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Computes content digests.
pub struct Hasher;

impl Hasher {
    /// BLAKE3 digest of a file, streamed in 64KB chunks.
    pub fn content_hash(path: &Path) -> std::io::Result<String> {
        let mut reader = BufReader::new(File::open(path)?);
        let mut hasher = Blake3Hasher::new();

        let mut buffer = [0u8; 65536];
        loop {
            let bytes_read = reader.read(&mut buffer)?;
            if bytes_read == 0 {
                break;
            }
            hasher.update(&buffer[..bytes_read]);
        }

        Ok(hasher.finalize().to_hex().to_string())
    }

    /// BLAKE3 digest of an in-memory buffer.
    pub fn content_hash_from_bytes(data: &[u8]) -> String {
        blake3::hash(data).to_hex().to_string()
    }
}

/// Before/after digests of one scrubbed buffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityCheck {
    pub original_hash: String,
    pub new_hash: String,
    /// True when the output bytes differ from the input bytes
    pub identity_changed: bool,
}

impl IdentityCheck {
    pub fn compare(original: &[u8], scrubbed: &[u8]) -> Self {
        let original_hash = Hasher::content_hash_from_bytes(original);
        let new_hash = Hasher::content_hash_from_bytes(scrubbed);
        Self {
            identity_changed: original_hash != new_hash,
            original_hash,
            new_hash,
        }
    }
}
