//! Phase 1: multipart intake.
//!
//! The audio part is streamed chunk by chunk through the content hasher and a
//! streaming object-store upload at the same time; the full payload is never
//! resident in memory. The upload's completion is awaited before this phase
//! returns, so later phases can rely on the temp object being durably
//! readable.

use super::UploadError;
use crate::content_hash::StreamingHasher;
use crate::ingest::session::UploadSession;
use crate::object_store::ObjectStore;
use axum::extract::multipart::{Field, Multipart};
use std::collections::HashMap;
use tracing::{debug, warn};
use uuid::Uuid;

pub const FALLBACK_MIME_TYPE: &str = "application/octet-stream";

/// The role a multipart part plays in an upload, resolved once per part
/// instead of sniffed ad hoc downstream.
#[derive(Debug, PartialEq, Eq)]
pub enum PartRole {
    /// The audio payload ("file" or "audio" part with a filename).
    Audio,
    /// A client-supplied cover image part. Recognized and drained; covers are
    /// derived from embedded tag art during extraction.
    Cover,
    /// An ordinary form field.
    FormField(String),
    /// Unnamed or otherwise unusable part.
    Unknown,
}

pub fn resolve_part_role(name: Option<&str>, file_name: Option<&str>) -> PartRole {
    match name {
        Some("file") | Some("audio") => PartRole::Audio,
        Some("cover") => PartRole::Cover,
        Some(name) if !name.is_empty() => {
            if file_name.is_some() {
                // A file part under an unexpected name is not a form field.
                PartRole::Unknown
            } else {
                PartRole::FormField(name.to_string())
            }
        }
        _ => PartRole::Unknown,
    }
}

/// Drive the multipart body to completion, streaming the audio part into
/// `temp/{uuid}` while hashing it. Exactly zero audio parts is an error; the
/// first audio part wins and later ones are drained.
pub async fn receive_upload(
    store: &dyn ObjectStore,
    mut multipart: Multipart,
) -> Result<UploadSession, UploadError> {
    let mut session: Option<UploadSession> = None;
    let mut form_fields: HashMap<String, String> = HashMap::new();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) => return Err(UploadError::Multipart(err.to_string())),
        };

        let role = resolve_part_role(field.name(), field.file_name());
        match role {
            PartRole::Audio => {
                if session.is_some() {
                    warn!("Ignoring extra audio part in upload");
                    drain_field(field).await?;
                    continue;
                }
                session = Some(stream_audio_part(store, field).await?);
            }
            PartRole::Cover | PartRole::Unknown => {
                drain_field(field).await?;
            }
            PartRole::FormField(name) => {
                let value = field
                    .text()
                    .await
                    .map_err(|err| UploadError::Multipart(err.to_string()))?;
                form_fields.insert(name, value);
            }
        }
    }

    match session {
        Some(mut session) => {
            session.form_fields = form_fields;
            Ok(session)
        }
        None => Err(UploadError::NoAudioFile),
    }
}

/// Duplex the audio part: every chunk goes to the hasher and to the
/// object-store upload. On any mid-stream failure the upload is aborted, so
/// no temp object survives.
async fn stream_audio_part(
    store: &dyn ObjectStore,
    mut field: Field<'_>,
) -> Result<UploadSession, UploadError> {
    let original_filename = field.file_name().map(|s| s.to_string());
    let mime_type = field
        .content_type()
        .filter(|ct| !ct.is_empty())
        .unwrap_or(FALLBACK_MIME_TYPE)
        .to_string();

    let temp_object_path = format!("temp/{}", Uuid::new_v4());
    let mut upload = store.put_object_stream(&temp_object_path).await?;
    let mut hasher = StreamingHasher::new();

    loop {
        let chunk = match field.chunk().await {
            Ok(Some(chunk)) => chunk,
            Ok(None) => break,
            Err(err) => {
                if let Err(abort_err) = upload.abort().await {
                    warn!(
                        "Failed to abort upload of {} after multipart error: {}",
                        temp_object_path, abort_err
                    );
                }
                return Err(UploadError::Multipart(err.to_string()));
            }
        };
        hasher.update(&chunk);
        if let Err(err) = upload.write(chunk).await {
            if let Err(abort_err) = upload.abort().await {
                warn!(
                    "Failed to abort upload of {} after write error: {}",
                    temp_object_path, abort_err
                );
            }
            return Err(UploadError::Storage(err));
        }
    }

    // The temp object only counts once the far-end write is confirmed.
    let size_bytes = upload.finish().await?;
    let content_hash = hasher.finalize();
    debug!(
        "Received {} bytes into {} (hash {})",
        size_bytes, temp_object_path, content_hash
    );

    Ok(UploadSession {
        temp_object_path,
        content_hash,
        size_bytes,
        mime_type,
        original_filename,
        form_fields: HashMap::new(),
    })
}

async fn drain_field(mut field: Field<'_>) -> Result<(), UploadError> {
    while let Some(_chunk) = field
        .chunk()
        .await
        .map_err(|err| UploadError::Multipart(err.to_string()))?
    {}
    Ok(())
}
