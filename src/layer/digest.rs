//! Content-addressed layer digests

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Number of hex characters used for short digests and image tags
pub const SHORT_LEN: usize = 12;

/// Hex-encoded SHA256 digest identifying layer content or a cache key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LayerDigest(String);

impl LayerDigest {
    /// Digest of a byte slice
    pub fn of(bytes: &[u8]) -> Self {
        Self(hex::encode(Sha256::digest(bytes)))
    }

    /// Hex string (64 chars)
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First `SHORT_LEN` hex chars
    pub fn short(&self) -> &str {
        &self.0[..SHORT_LEN.min(self.0.len())]
    }
}

impl fmt::Display for LayerDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sha256:{}", self.0)
    }
}

/// Incremental digest over length-prefixed fields.
///
/// Prefixing each field with its length keeps `("ab", "c")` and
/// `("a", "bc")` from colliding.
#[derive(Default)]
pub struct DigestBuilder {
    hasher: Sha256,
}

impl DigestBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one field
    pub fn field(mut self, bytes: impl AsRef<[u8]>) -> Self {
        self.update(bytes.as_ref());
        self
    }

    /// Feed one field without consuming the builder
    pub fn update(&mut self, bytes: &[u8]) {
        self.hasher.update((bytes.len() as u64).to_le_bytes());
        self.hasher.update(bytes);
    }

    pub fn finish(self) -> LayerDigest {
        LayerDigest(hex::encode(self.hasher.finalize()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_deterministic() {
        assert_eq!(LayerDigest::of(b"streamlit"), LayerDigest::of(b"streamlit"));
        assert_ne!(LayerDigest::of(b"streamlit"), LayerDigest::of(b"boto3"));
        assert_eq!(LayerDigest::of(b"x").as_str().len(), 64);
    }

    #[test]
    fn short_and_display() {
        let digest = LayerDigest::of(b"layer");
        assert_eq!(digest.short().len(), SHORT_LEN);
        assert!(digest.to_string().starts_with("sha256:"));
        assert!(digest.as_str().starts_with(digest.short()));
    }

    #[test]
    fn fields_are_length_prefixed() {
        let a = DigestBuilder::new().field("ab").field("c").finish();
        let b = DigestBuilder::new().field("a").field("bc").finish();
        assert_ne!(a, b);
    }
}
