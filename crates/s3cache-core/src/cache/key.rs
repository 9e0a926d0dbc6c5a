//! Cache key derivation

use std::fmt;
use std::str::FromStr;

/// Fixed-width cache key derived from a backend address
///
/// The key doubles as the file name of the entry in a disk-backed cache,
/// so it must stay stable across releases.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey([u8; 32]);

impl CacheKey {
    /// Length of the hex form, which is also the on-disk file name length
    pub const HEX_LEN: usize = 64;

    /// Derive the key for `(bucket, key)`
    ///
    /// Bucket names never contain `/`, so hashing `bucket/key` keeps
    /// `("ab", "c")` and `("a", "bc")` apart.
    pub fn derive(bucket: &str, key: &str) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(bucket.as_bytes());
        hasher.update(b"/");
        hasher.update(key.as_bytes());
        Self(*hasher.finalize().as_bytes())
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CacheKey({})", self.to_hex())
    }
}

/// Error type for parsing a cache key from its hex form
#[derive(Debug, Clone)]
pub struct ParseCacheKeyError(String);

impl fmt::Display for ParseCacheKeyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid cache key: {}", self.0)
    }
}

impl std::error::Error for ParseCacheKeyError {}

impl FromStr for CacheKey {
    type Err = ParseCacheKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Uppercase hex would decode fine but never matches a file we wrote
        if s.len() != Self::HEX_LEN || s.bytes().any(|b| b.is_ascii_uppercase()) {
            return Err(ParseCacheKeyError(s.to_string()));
        }

        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes).map_err(|_| ParseCacheKeyError(s.to_string()))?;
        Ok(Self(bytes))
    }
}
