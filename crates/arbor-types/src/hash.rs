use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Width of a [`Hash`] in bytes.
pub const HASH_LEN: usize = 32;

/// Set of hashes, used for hints and batched lookups.
pub type HashSet = std::collections::HashSet<Hash>;

/// Content address of a chunk.
///
/// A `Hash` is the BLAKE3 digest of a chunk's bytes. Identical bytes always
/// produce the same `Hash`. Hashes are totally ordered bytewise, which gives
/// the store a deterministic tie-break wherever two chunks compare equal on
/// some other key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Hash([u8; HASH_LEN]);

impl Hash {
    /// Compute the hash of raw bytes.
    pub fn of(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// Create a `Hash` from a pre-computed digest.
    pub const fn from_raw(bytes: [u8; HASH_LEN]) -> Self {
        Self(bytes)
    }

    /// The empty hash (all zeros). Names "no chunk", e.g. the root of a
    /// store that has never been committed to.
    pub const fn empty() -> Self {
        Self([0u8; HASH_LEN])
    }

    /// Returns `true` if this is the empty hash.
    pub fn is_empty(&self) -> bool {
        self.0 == [0u8; HASH_LEN]
    }

    /// The raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }

    /// Hex-encoded string representation.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short hex representation (first 8 characters).
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }

    /// Parse from a hex string.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let bytes = hex::decode(s.trim()).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        Self::from_slice(&bytes)
    }

    /// Build from a byte slice of exactly [`HASH_LEN`] bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, TypeError> {
        let arr: [u8; HASH_LEN] = bytes.try_into().map_err(|_| TypeError::InvalidLength {
            expected: HASH_LEN,
            actual: bytes.len(),
        })?;
        Ok(Self(arr))
    }
}

impl Default for Hash {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", self.short_hex())
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for Hash {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl From<[u8; HASH_LEN]> for Hash {
    fn from(bytes: [u8; HASH_LEN]) -> Self {
        Self(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn of_is_deterministic() {
        assert_eq!(Hash::of(b"hello world"), Hash::of(b"hello world"));
    }

    #[test]
    fn different_data_produces_different_hashes() {
        assert_ne!(Hash::of(b"hello"), Hash::of(b"world"));
    }

    #[test]
    fn empty_is_all_zeros() {
        let empty = Hash::empty();
        assert!(empty.is_empty());
        assert_eq!(empty, Hash::default());
        assert!(!Hash::of(b"").is_empty());
    }

    #[test]
    fn hex_roundtrip() {
        let h = Hash::of(b"test");
        let parsed: Hash = h.to_hex().parse().unwrap();
        assert_eq!(h, parsed);
    }

    #[test]
    fn from_hex_rejects_bad_input() {
        assert!(matches!(Hash::from_hex("zz"), Err(TypeError::InvalidHex(_))));
        assert_eq!(
            Hash::from_hex("abcd"),
            Err(TypeError::InvalidLength { expected: 32, actual: 2 })
        );
    }

    #[test]
    fn display_is_full_hex() {
        let h = Hash::of(b"test");
        assert_eq!(format!("{h}").len(), 64);
        assert_eq!(h.short_hex().len(), 8);
    }

    #[test]
    fn serde_roundtrip() {
        let h = Hash::of(b"serde test");
        let json = serde_json::to_string(&h).unwrap();
        let parsed: Hash = serde_json::from_str(&json).unwrap();
        assert_eq!(h, parsed);
    }

    #[test]
    fn ordering_is_bytewise() {
        let mut low = [0u8; 32];
        low[31] = 1;
        let mut high = [0u8; 32];
        high[0] = 1;
        assert!(Hash::from_raw(low) < Hash::from_raw(high));
    }
}
