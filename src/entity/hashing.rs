//! Content addressing for entities and asset files
//!
//! Every stored blob is keyed by a CIDv1 string (raw codec, SHA256
//! multihash, e.g. `bafkrei...`). The CID is computed from the blob's own
//! bytes, so every key is self-verifying: recomputing the hash of the bytes
//! behind a key must reproduce the key.

use cid::Cid;
use multihash_codetable::{Code, MultihashDigest};
use std::str::FromStr;

use crate::types::{FirmamentError, Result};

/// Raw binary codec for CIDv1 (0x55)
const RAW_CODEC: u64 = 0x55;

/// Suffix under which an entity's auth chain is stored next to the entity
pub const AUTH_CHAIN_SUFFIX: &str = ".auth";

/// Compute the content address of a blob as a CIDv1 raw/SHA256 string.
pub fn compute_content_hash(data: &[u8]) -> String {
    let hash = Code::Sha2_256.digest(data);
    Cid::new_v1(RAW_CODEC, hash).to_string()
}

/// Validate that a string parses as a CID carrying a SHA256 multihash.
pub fn validate_content_hash(address: &str) -> Result<()> {
    let cid = Cid::from_str(address).map_err(|e| {
        FirmamentError::StructuralValidation(format!("Invalid content hash '{}': {}", address, e))
    })?;

    // 32 bytes = SHA256; other multihash algorithms are not accepted
    if cid.hash().digest().len() != 32 {
        return Err(FirmamentError::StructuralValidation(format!(
            "Content hash '{}' uses an unsupported hash algorithm (expected SHA256, got {} bytes)",
            address,
            cid.hash().digest().len()
        )));
    }

    Ok(())
}

/// Verify that `data` hashes to `declared`. Returns a `HashMismatch` with
/// both values when it does not.
pub fn verify_content_hash(data: &[u8], declared: &str) -> Result<()> {
    let computed = compute_content_hash(data);
    if computed != declared {
        return Err(FirmamentError::HashMismatch {
            expected: declared.to_string(),
            actual: computed,
        });
    }
    Ok(())
}

/// Storage key for an entity's auth chain companion document.
pub fn auth_chain_key(entity_id: &str) -> String {
    format!("{}{}", entity_id, AUTH_CHAIN_SUFFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_content_hash_is_deterministic() {
        let a = compute_content_hash(b"Hello, Elohim!");
        let b = compute_content_hash(b"Hello, Elohim!");
        assert_eq!(a, b);
        assert!(a.starts_with("baf"));
    }

    #[test]
    fn test_different_bytes_different_hash() {
        assert_ne!(compute_content_hash(b"scene-a"), compute_content_hash(b"scene-b"));
    }

    #[test]
    fn test_validate_content_hash_accepts_own_output() {
        let hash = compute_content_hash(b"some asset bytes");
        assert!(validate_content_hash(&hash).is_ok());
    }

    #[test]
    fn test_validate_content_hash_rejects_garbage() {
        assert!(validate_content_hash("not-a-cid").is_err());
        assert!(validate_content_hash("").is_err());
    }

    #[test]
    fn test_verify_content_hash_mismatch_reports_both_values() {
        let declared = compute_content_hash(b"expected bytes");
        let err = verify_content_hash(b"other bytes", &declared).unwrap_err();
        match err {
            FirmamentError::HashMismatch { expected, actual } => {
                assert_eq!(expected, declared);
                assert_eq!(actual, compute_content_hash(b"other bytes"));
            }
            other => panic!("expected HashMismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_auth_chain_key() {
        assert_eq!(auth_chain_key("bafkreiabc"), "bafkreiabc.auth");
    }
}
