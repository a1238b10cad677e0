//! Content hashes for tree nodes and provenance.

use std::fmt;

/// Size of a content hash in bytes.
pub const HASH_SIZE: usize = 32;

/// A blake3 content hash.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Hash([u8; HASH_SIZE]);

impl Hash {
    /// Wrap raw hash bytes.
    pub const fn new(bytes: [u8; HASH_SIZE]) -> Self {
        Self(bytes)
    }

    /// Hash arbitrary data.
    pub fn of(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// Build a hash from a slice, if it has the right length.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let bytes: [u8; HASH_SIZE] = bytes.try_into().ok()?;
        Some(Self(bytes))
    }

    /// Parse a hex-encoded hash.
    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = hex::decode(s).ok()?;
        Self::from_slice(&bytes)
    }

    /// Raw hash bytes.
    pub fn as_bytes(&self) -> &[u8; HASH_SIZE] {
        &self.0
    }

    /// Hex encoding of the hash.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Whether this is the all-zero hash.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; HASH_SIZE]
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form keeps tree dumps readable
        write!(f, "Hash({})", &self.to_hex()[..12])
    }
}
