//! Short content checksums in the `sha256:<16-hex-prefix>` format shared by
//! enriched signals, retrain acknowledgments and audit entries.

use serde::Serialize;
use sha2::{Digest, Sha256};

/// Number of hex characters kept from the digest
pub const CHECKSUM_HEX_LEN: usize = 16;

/// Checksum raw bytes
pub fn checksum_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hex::encode(hasher.finalize());
    format!("sha256:{}", &digest[..CHECKSUM_HEX_LEN])
}

/// Checksum the canonical JSON encoding of a value.
///
/// Canonical here means serde_json output of a struct, whose field order is
/// fixed by the declaration, so equal values always hash equally.
pub fn checksum_of<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let bytes = serde_json::to_vec(value)?;
    Ok(checksum_bytes(&bytes))
}
