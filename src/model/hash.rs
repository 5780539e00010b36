//! Content-addressed hash type using BLAKE3
//!
//! Besides plain content hashing, a `Hash` supports an order-independent
//! combination (`combine`), a bytewise XOR. It is commutative, associative
//! and its own inverse, with `Hash::ZERO` as identity. Directories use it to
//! fold child digests in and out of their own digest in O(1).
//!
//! The fold is an integrity check, not a binding commitment: a crafted set
//! of children can cancel out to any aggregate.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Length of a digest in bytes
pub const HASH_LEN: usize = 32;

/// A 32-byte BLAKE3 hash used for content addressing
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Hash([u8; HASH_LEN]);

impl Hash {
    /// The zero hash (empty digest, identity of `combine`)
    pub const ZERO: Hash = Hash([0u8; HASH_LEN]);

    /// Create a hash from raw bytes
    pub fn from_bytes(bytes: [u8; HASH_LEN]) -> Self {
        Hash(bytes)
    }

    /// Create a hash from a byte slice of exactly `HASH_LEN` bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; HASH_LEN] = bytes.try_into().map_err(|_| Error::InvalidDigestLength {
            expected: HASH_LEN,
            found: bytes.len(),
        })?;
        Ok(Hash(arr))
    }

    /// Hash arbitrary data
    pub fn digest(data: &[u8]) -> Self {
        let hash = blake3::hash(data);
        Hash(*hash.as_bytes())
    }

    /// Hash multiple pieces of data
    pub fn digest_many(parts: &[&[u8]]) -> Self {
        let mut hasher = blake3::Hasher::new();
        for part in parts {
            hasher.update(part);
        }
        Hash(*hasher.finalize().as_bytes())
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }

    /// Copy the raw bytes into a vector
    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }

    /// Fold `other` into this hash
    pub fn combine(&mut self, other: &Hash) {
        for (a, b) in self.0.iter_mut().zip(other.0.iter()) {
            *a ^= b;
        }
    }

    /// Return the combination of this hash and `other`
    pub fn combined(mut self, other: &Hash) -> Hash {
        self.combine(other);
        self
    }

    /// Convert to hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).map_err(|e| Error::MalformedInput(e.to_string()))?;
        Self::from_slice(&bytes)
    }

    /// Get a short prefix for display (first 7 chars, like git)
    pub fn short(&self) -> String {
        self.to_hex()[..7].to_string()
    }

    /// Check if this is the zero hash
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; HASH_LEN]
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", self.short())
    }
}

impl Default for Hash {
    fn default() -> Self {
        Hash::ZERO
    }
}

impl AsRef<[u8]> for Hash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}
