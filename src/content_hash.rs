//! Content hashing for stored audio payloads.
//!
//! Every physically stored file is addressed by the SHA-256 digest of its
//! bytes. The hasher is incremental so uploads can be hashed chunk by chunk
//! while they stream into the object store.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// A SHA-256 content hash of a stored payload, 32 raw bytes.
///
/// Serializes as the lowercase hex digest, which is also the form used in
/// object keys (`files/{hash}.{ext}`) and as the primary key of stored-file
/// records.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Compute the hash of a fully materialized buffer. Test helpers and
    /// small payloads only; uploads go through [`StreamingHasher`].
    pub fn compute(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        Self(hasher.finalize().into())
    }

    /// Parse from a 64-char lowercase/uppercase hex string.
    pub fn from_hex(s: &str) -> Option<Self> {
        if s.len() != 64 {
            return None;
        }
        let mut bytes = [0u8; 32];
        for (i, chunk) in s.as_bytes().chunks(2).enumerate() {
            let hex_str = std::str::from_utf8(chunk).ok()?;
            bytes[i] = u8::from_str_radix(hex_str, 16).ok()?;
        }
        Some(Self(bytes))
    }

    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", self.to_hex())
    }
}

impl Serialize for ContentHash {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ContentHash {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        ContentHash::from_hex(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid content hash: {}", s)))
    }
}

/// Incremental SHA-256 accumulator fed one chunk at a time as an upload
/// streams through the ingest pipeline.
pub struct StreamingHasher {
    digest: Sha256,
    bytes_seen: u64,
}

impl StreamingHasher {
    pub fn new() -> Self {
        Self {
            digest: Sha256::new(),
            bytes_seen: 0,
        }
    }

    pub fn update(&mut self, chunk: &[u8]) {
        self.digest.update(chunk);
        self.bytes_seen += chunk.len() as u64;
    }

    pub fn bytes_seen(&self) -> u64 {
        self.bytes_seen
    }

    pub fn finalize(self) -> ContentHash {
        ContentHash(self.digest.finalize().into())
    }
}

impl Default for StreamingHasher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // SHA-256 of the empty input, a well-known vector.
    const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    #[test]
    fn hashes_known_vector() {
        let hash = ContentHash::compute(b"");
        assert_eq!(hash.to_hex(), EMPTY_SHA256);

        let hash = ContentHash::compute(b"abc");
        assert_eq!(
            hash.to_hex(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn streaming_matches_one_shot() {
        let data: Vec<u8> = (0u32..100_000).map(|i| (i % 251) as u8).collect();

        let mut hasher = StreamingHasher::new();
        for chunk in data.chunks(1013) {
            hasher.update(chunk);
        }
        assert_eq!(hasher.bytes_seen(), data.len() as u64);
        assert_eq!(hasher.finalize(), ContentHash::compute(&data));
    }

    #[test]
    fn hex_round_trip() {
        let hash = ContentHash::compute(b"round trip");
        let parsed = ContentHash::from_hex(&hash.to_hex()).unwrap();
        assert_eq!(hash, parsed);
    }

    #[test]
    fn rejects_malformed_hex() {
        assert!(ContentHash::from_hex("").is_none());
        assert!(ContentHash::from_hex("abcd").is_none());
        let not_hex = "zz".repeat(32);
        assert!(ContentHash::from_hex(&not_hex).is_none());
    }
}
