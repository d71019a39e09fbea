//! Structured content digests and their base-58 string form.
//!
//! Wire layout of the decoded string: `[hash_function, size, digest...]`.
//! The digest occupies a full 32-byte word.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::Hash32;

/// Multihash function code for SHA2-256.
pub const SHA2_256: u8 = 0x12;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MultihashError {
    #[error("Invalid base58: {0}")]
    Base58(String),

    #[error("Decoded multihash has {0} bytes, expected 34")]
    Length(usize),

    #[error("Multihash size byte is zero")]
    EmptySize,
}

/// Content digest split into the fields stored on-ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Multihash {
    pub digest: Hash32,
    pub hash_function: u8,
    pub size: u8,
}

impl Multihash {
    pub fn new(digest: Hash32, hash_function: u8, size: u8) -> Self {
        Self {
            digest,
            hash_function,
            size,
        }
    }

    /// A SHA2-256 digest of full length.
    pub fn sha2_256(digest: Hash32) -> Self {
        Self::new(digest, SHA2_256, 32)
    }

    /// Partition a base-58 multihash string into its fields.
    pub fn from_base58(encoded: &str) -> Result<Self, MultihashError> {
        let decoded = bs58::decode(encoded)
            .into_vec()
            .map_err(|e| MultihashError::Base58(e.to_string()))?;
        if decoded.len() != 2 + Hash32::LEN {
            return Err(MultihashError::Length(decoded.len()));
        }
        if decoded[1] == 0 {
            return Err(MultihashError::EmptySize);
        }
        let digest = Hash32::from_slice(&decoded[2..]).ok_or(MultihashError::Length(decoded.len()))?;
        Ok(Self::new(digest, decoded[0], decoded[1]))
    }

    /// Base-58 form, or `None` for an empty (size 0) digest.
    pub fn to_base58(&self) -> Option<String> {
        if self.size == 0 {
            return None;
        }
        let mut bytes = Vec::with_capacity(2 + Hash32::LEN);
        bytes.push(self.hash_function);
        bytes.push(self.size);
        bytes.extend_from_slice(self.digest.as_bytes());
        Some(bs58::encode(bytes).into_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IPFS_PATHS: [&str; 3] = [
        "QmYjtig7VJQ6XsnUjqqJvj7QaMcCAwtrgNdahSiFofrE7o",
        "QmTitSFQFQeBMZRDsGEvzdNgPnwx7coBCQxEYvNzgWPkK8",
        "QmTkzDwWqPbnAh5YiV5VwcTLnGdwSNsNTn2aDxdXBFca7D",
    ];

    #[test]
    fn ipfs_paths_decode_as_sha2_256() {
        for path in IPFS_PATHS {
            let mh = Multihash::from_base58(path).unwrap();
            assert_eq!(mh.hash_function, SHA2_256);
            assert_eq!(mh.size, 32);
            assert_eq!(mh.to_base58().as_deref(), Some(path));
        }
    }

    #[test]
    fn distinct_paths_have_distinct_digests() {
        let a = Multihash::from_base58(IPFS_PATHS[0]).unwrap();
        let b = Multihash::from_base58(IPFS_PATHS[1]).unwrap();
        assert_ne!(a.digest, b.digest);
    }

    #[test]
    fn non_standard_function_id_survives() {
        let mh = Multihash::new(Hash32([0x5a; 32]), 0x1b, 20);
        let s = mh.to_base58().unwrap();
        assert_eq!(Multihash::from_base58(&s), Ok(mh));
    }

    #[test]
    fn empty_size_has_no_string_form() {
        assert_eq!(Multihash::new(Hash32::ZERO, SHA2_256, 0).to_base58(), None);
    }

    #[test]
    fn rejects_bad_input() {
        assert!(matches!(Multihash::from_base58("0OIl"), Err(MultihashError::Base58(_))));
        let short = bs58::encode([SHA2_256, 32, 1, 2, 3]).into_string();
        assert_eq!(Multihash::from_base58(&short), Err(MultihashError::Length(5)));
    }
}
