use crate::content_hash::ContentHash;
use serde::{Deserialize, Serialize};

/// Technical audio properties extracted from the payload. Every field is
/// independently optional: extraction may partially fail and the record is
/// still valid.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TechnicalMetadata {
    pub duration_seconds: Option<f64>,
    pub bitrate_kbps: Option<u32>,
    pub sample_rate_hz: Option<u32>,
    pub channel_count: Option<u8>,
}

impl TechnicalMetadata {
    pub fn is_empty(&self) -> bool {
        self.duration_seconds.is_none()
            && self.bitrate_kbps.is_none()
            && self.sample_rate_hz.is_none()
            && self.channel_count.is_none()
    }
}

/// One physically unique stored payload, addressed by its content hash.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredFile {
    pub content_hash: ContentHash,
    /// Location in the object store, `files/{hash}.{ext}`.
    pub object_path: String,
    pub size_bytes: u64,
    pub mime_type: String,
    pub technical_metadata: TechnicalMetadata,
    /// Derived cover object, `covers/{hash}.{ext}`, when one was extracted.
    pub cover_path: Option<String>,
    /// Number of songs pointing at this file. Zero means eligible for
    /// physical deletion and never reachable from a live song.
    pub reference_count: u32,
}

/// User-editable tags on a song, independent of the underlying bytes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SongTags {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub track_number: Option<u32>,
    pub year: Option<u32>,
}

/// A logical library entry referencing exactly one stored file.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Song {
    pub id: String,
    pub library_id: String,
    pub file_hash: ContentHash,
    #[serde(flatten)]
    pub tags: SongTags,
}
