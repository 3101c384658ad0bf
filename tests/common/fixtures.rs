//! Test payload generation
//!
//! Payloads are synthesized in code so every test gets deterministic bytes
//! with a known content hash: a minimal PCM WAV when extraction should
//! succeed, and an arbitrary byte pattern when it should be tolerated as
//! unparseable.

use phonoteca_server::ContentHash;

/// Minimal valid PCM WAV: 44-byte header plus `data_len` bytes of silence,
/// 16-bit mono at `sample_rate`.
pub fn wav_bytes(sample_rate: u32, data_len: u32) -> Vec<u8> {
    let byte_rate = sample_rate * 2;
    let mut out = Vec::with_capacity(44 + data_len as usize);
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes()); // fmt chunk size
    out.extend_from_slice(&1u16.to_le_bytes()); // PCM
    out.extend_from_slice(&1u16.to_le_bytes()); // mono
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&byte_rate.to_le_bytes());
    out.extend_from_slice(&2u16.to_le_bytes()); // block align
    out.extend_from_slice(&16u16.to_le_bytes()); // bits per sample
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    out.resize(44 + data_len as usize, 0);
    out
}

/// Deterministic pseudo-random bytes. Not a valid audio container; metadata
/// extraction fails on it by design and the upload must still succeed.
pub fn deterministic_audio_bytes(len: usize) -> Vec<u8> {
    (0..len).map(|i| ((i * 31 + 7) % 251) as u8).collect()
}

/// Hex content hash of a payload, as the server computes it.
pub fn sha256_hex(data: &[u8]) -> String {
    ContentHash::compute(data).to_hex()
}
