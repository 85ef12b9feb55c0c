//! SHA-256 checksums truncated to 16 hex characters (spec.md §4.5).

use sha2::{Digest, Sha256};
use std::path::Path;

pub const CHECKSUM_LEN: usize = 16;

pub fn checksum_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let digest = hasher.finalize();
    hex_prefix(&digest, CHECKSUM_LEN)
}

pub fn checksum_file(path: &Path) -> std::io::Result<String> {
    let data = std::fs::read(path)?;
    Ok(checksum_bytes(&data))
}

fn hex_prefix(digest: &[u8], len: usize) -> String {
    let mut out = String::with_capacity(len);
    for byte in digest {
        if out.len() >= len {
            break;
        }
        out.push_str(&format!("{byte:02x}"));
    }
    out.truncate(len);
    out
}
