//! Content-addressed audio ingestion pipeline.
//!
//! Three phases, each suspendable at its I/O boundaries:
//! 1. multipart intake — hash and stream the payload to a temp object,
//! 2. metadata extraction — tolerant probe of the temp object,
//! 3. finalize — dedup promotion to the permanent hash-derived path.
//!
//! [`IngestManager`] threads an [`UploadSession`] value through the phases
//! and owns the error-path guarantee that no temp object survives a failed
//! upload.

mod extract;
mod finalize;
mod manager;
mod multipart;
mod session;

pub use extract::{extract_metadata, CoverArt, ExtractError, Extracted};
pub use finalize::{
    discard_temp, finalize_object, permanent_audio_path, permanent_cover_path, store_cover,
};
pub use manager::{IngestManager, IngestOutcome};
pub use multipart::{receive_upload, resolve_part_role, PartRole, FALLBACK_MIME_TYPE};
pub use session::UploadSession;

use crate::object_store::StorageError;
use thiserror::Error;

/// Upload failure taxonomy. Client input problems and storage problems are
/// kept apart so the HTTP layer can map them to 4xx/5xx without inspecting
/// strings.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("no audio file part in upload")]
    NoAudioFile,

    #[error("malformed multipart body: {0}")]
    Multipart(String),

    #[error("declared hash is not a valid content hash: {0}")]
    InvalidDeclaredHash(String),

    #[error("declared hash does not match uploaded content")]
    HashMismatch,

    #[error("identical content already exists in this library")]
    DuplicateInLibrary,

    #[error("storage quota exceeded")]
    QuotaExceeded,

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("library store error: {0}")]
    Store(#[from] anyhow::Error),
}
