//! In-flight upload state.

use crate::content_hash::ContentHash;
use std::collections::HashMap;

/// The state of one pipeline run, produced by Phase 1 and threaded explicitly
/// through the later phases. Lives only for the duration of one request; the
/// temp object it points at is cleaned up on both success and failure.
#[derive(Debug)]
pub struct UploadSession {
    /// Where the raw payload was written, `temp/{uuid}`.
    pub temp_object_path: String,
    /// Hash of the streamed payload, computed during Phase 1.
    pub content_hash: ContentHash,
    pub size_bytes: u64,
    /// Declared content type, or the generic binary fallback.
    pub mime_type: String,
    pub original_filename: Option<String>,
    /// Non-file form fields, resolved once during multipart parsing.
    pub form_fields: HashMap<String, String>,
}

impl UploadSession {
    /// Sanitized storage extension for the permanent object, derived from the
    /// original filename with a mime-based fallback.
    pub fn storage_extension(&self) -> &'static str {
        if let Some(ext) = self
            .original_filename
            .as_deref()
            .and_then(extension_of)
            .and_then(known_extension)
        {
            return ext;
        }
        extension_for_mime(&self.mime_type)
    }
}

/// Extensions accepted verbatim into object keys. Anything else falls back to
/// a mime-derived extension so keys stay URL-safe.
const KNOWN_EXTENSIONS: &[&str] = &[
    "mp3", "flac", "wav", "ogg", "oga", "opus", "m4a", "aac", "wma", "aiff",
];

fn extension_of(filename: &str) -> Option<String> {
    std::path::Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
}

fn known_extension(ext: String) -> Option<&'static str> {
    KNOWN_EXTENSIONS.iter().find(|k| **k == ext).copied()
}

fn extension_for_mime(mime_type: &str) -> &'static str {
    match mime_type {
        "audio/mpeg" | "audio/mp3" => "mp3",
        "audio/flac" | "audio/x-flac" => "flac",
        "audio/wav" | "audio/x-wav" | "audio/wave" => "wav",
        "audio/ogg" | "application/ogg" => "ogg",
        "audio/opus" => "opus",
        "audio/aac" => "aac",
        "audio/mp4" | "audio/x-m4a" => "m4a",
        _ => "bin",
    }
}
