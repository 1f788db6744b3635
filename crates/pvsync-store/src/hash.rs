//! Blake3 hashing of configuration snapshots

use pvsync_core::ConfigSnapshot;

/// Hash raw bytes with blake3.
pub fn hash_bytes(data: &[u8]) -> blake3::Hash {
    blake3::hash(data)
}

/// Canonical JSON of a snapshot (field order is the struct's declaration order).
pub fn canonical_json(snapshot: &ConfigSnapshot) -> serde_json::Result<String> {
    serde_json::to_string(snapshot)
}

/// Hash identifying a snapshot's configuration intent.
pub fn snapshot_hash(snapshot: &ConfigSnapshot) -> serde_json::Result<blake3::Hash> {
    Ok(hash_bytes(canonical_json(snapshot)?.as_bytes()))
}

/// Return the first 8 hex characters of a blake3 hash.
pub fn short_hash(hash: &blake3::Hash) -> String {
    hash.to_hex()[..8].to_string()
}
