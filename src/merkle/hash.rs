//! Merkle Hash Primitive
//!
//! Fixed-size SHA-256 digests used for leaves, interior nodes and roots.
//! Digests are compared as raw bytes and rendered as `0x`-prefixed
//! lowercase hex at rest.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

use crate::error::AnchorError;

/// Size of every digest in bytes
pub const HASH_SIZE: usize = 32;

/// A 32-byte SHA-256 digest
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MerkleHash([u8; HASH_SIZE]);

impl MerkleHash {
    pub const fn from_bytes(bytes: [u8; HASH_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; HASH_SIZE] {
        &self.0
    }

    /// Lowercase hex with `0x` prefix, the at-rest representation
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// Parse hex with or without the `0x` prefix, in either case
    pub fn from_hex(s: &str) -> Result<Self, AnchorError> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);

        let bytes = hex::decode(digits)
            .map_err(|e| AnchorError::InvalidDigest(format!("{}: {}", s, e)))?;

        let array: [u8; HASH_SIZE] = bytes.try_into().map_err(|b: Vec<u8>| {
            AnchorError::InvalidDigest(format!(
                "expected {} bytes, got {}",
                HASH_SIZE,
                b.len()
            ))
        })?;

        Ok(Self(array))
    }

    /// Copy with one bit flipped
    pub fn with_bit_flipped(&self, bit: usize) -> Self {
        let mut bytes = self.0;
        bytes[(bit / 8) % HASH_SIZE] ^= 1 << (bit % 8);
        Self(bytes)
    }
}

/// SHA-256 of arbitrary bytes
pub fn hash_bytes(data: &[u8]) -> MerkleHash {
    let digest = Sha256::digest(data);
    MerkleHash(digest.into())
}

/// Interior node: SHA-256 over the raw concatenation `left || right`
pub fn hash_pair(left: &MerkleHash, right: &MerkleHash) -> MerkleHash {
    let mut hasher = Sha256::new();
    hasher.update(left.0);
    hasher.update(right.0);
    MerkleHash(hasher.finalize().into())
}

impl fmt::Display for MerkleHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for MerkleHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MerkleHash({})", self.to_hex())
    }
}

impl FromStr for MerkleHash {
    type Err = AnchorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl From<[u8; HASH_SIZE]> for MerkleHash {
    fn from(bytes: [u8; HASH_SIZE]) -> Self {
        Self(bytes)
    }
}

impl Serialize for MerkleHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for MerkleHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        MerkleHash::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_bytes_known_vector() {
        // SHA-256("abc")
        let digest = hash_bytes(b"abc");
        assert_eq!(
            digest.to_hex(),
            "0xba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_hash_pair_is_raw_concatenation() {
        let left = hash_bytes(b"left");
        let right = hash_bytes(b"right");

        let mut joined = Vec::new();
        joined.extend_from_slice(left.as_bytes());
        joined.extend_from_slice(right.as_bytes());

        assert_eq!(hash_pair(&left, &right), hash_bytes(&joined));
        assert_ne!(hash_pair(&left, &right), hash_pair(&right, &left));
    }

    #[test]
    fn test_hex_parsing() {
        let digest = hash_bytes(b"anchor");
        let hex = digest.to_hex();
        assert!(hex.starts_with("0x"));
        assert_eq!(hex.len(), 66);

        assert_eq!(MerkleHash::from_hex(&hex).unwrap(), digest);
        assert_eq!(MerkleHash::from_hex(&hex[2..]).unwrap(), digest);
        assert_eq!(MerkleHash::from_hex(&hex.to_uppercase().replace("0X", "0x")).unwrap(), digest);

        assert!(MerkleHash::from_hex("0xdeadbeef").is_err());
        assert!(MerkleHash::from_hex("not hex").is_err());
    }

    #[test]
    fn test_serde_uses_prefixed_hex() {
        let digest = hash_bytes(b"serde");
        let json = serde_json::to_string(&digest).unwrap();
        assert_eq!(json, format!("\"{}\"", digest.to_hex()));

        let back: MerkleHash = serde_json::from_str(&json).unwrap();
        assert_eq!(back, digest);
    }

    #[test]
    fn test_bit_flip_changes_digest() {
        let digest = hash_bytes(b"flip");
        for bit in [0, 7, 8, 255] {
            assert_ne!(digest.with_bit_flipped(bit), digest);
        }
    }
}
