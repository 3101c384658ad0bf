//! Song upload and record routes.

use super::session::Session;
use super::state::{GuardedIngestManager, GuardedLibraryStore, GuardedObjectStore, ServerState};
use crate::content_hash::ContentHash;
use crate::ingest::UploadError;
use crate::library_store::{LibraryStore, Song, TechnicalMetadata};
use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tracing::warn;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub song_id: String,
    pub hash: ContentHash,
    pub object_name: String,
    pub size: u64,
    pub mime_type: String,
    pub metadata: TechnicalMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover_image: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteSongResponse {
    pub file_hash: ContentHash,
    pub remaining_references: u32,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Stable machine-readable reason.
    pub error: &'static str,
    pub message: String,
}

fn error_response(status: StatusCode, error: &'static str, message: String) -> Response {
    (status, Json(ErrorResponse { error, message })).into_response()
}

fn map_upload_error(err: UploadError) -> Response {
    let message = err.to_string();
    match err {
        UploadError::NoAudioFile => error_response(StatusCode::BAD_REQUEST, "no_audio_file", message),
        UploadError::Multipart(_) => {
            error_response(StatusCode::BAD_REQUEST, "malformed_multipart", message)
        }
        UploadError::InvalidDeclaredHash(_) => {
            error_response(StatusCode::BAD_REQUEST, "invalid_declared_hash", message)
        }
        UploadError::HashMismatch => {
            error_response(StatusCode::BAD_REQUEST, "hash_mismatch", message)
        }
        UploadError::DuplicateInLibrary => {
            error_response(StatusCode::CONFLICT, "duplicate_in_library", message)
        }
        UploadError::QuotaExceeded => {
            error_response(StatusCode::FORBIDDEN, "quota_exceeded", message)
        }
        UploadError::Storage(_) | UploadError::Store(_) => {
            warn!("Upload failed: {}", message);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "storage_failure", message)
        }
    }
}

/// POST /library/{library_id}/songs - multipart upload of one audio file.
async fn upload_song(
    _session: Session,
    State(ingest_manager): State<GuardedIngestManager>,
    Path(library_id): Path<String>,
    multipart: Multipart,
) -> Response {
    match ingest_manager.ingest(&library_id, multipart).await {
        Ok(outcome) => {
            let status = if outcome.created {
                StatusCode::CREATED
            } else {
                StatusCode::OK
            };
            let body = UploadResponse {
                song_id: outcome.song.id,
                hash: outcome.file.content_hash,
                object_name: outcome.file.object_path,
                size: outcome.file.size_bytes,
                mime_type: outcome.file.mime_type,
                metadata: outcome.file.technical_metadata,
                cover_image: outcome.file.cover_path,
            };
            (status, Json(body)).into_response()
        }
        Err(err) => map_upload_error(err),
    }
}

async fn get_song(
    _session: Session,
    State(library_store): State<GuardedLibraryStore>,
    Path(id): Path<String>,
) -> Response {
    match library_store.get_song(&id) {
        Ok(Some(song)) => Json(song).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

async fn list_songs(
    _session: Session,
    State(library_store): State<GuardedLibraryStore>,
    Path(library_id): Path<String>,
) -> Response {
    match library_store.list_songs(&library_id) {
        Ok(songs) => Json(songs).into_response(),
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

/// DELETE /songs/{id} - remove the song and decrement its file's reference
/// count in one transaction. Physical deletion of an orphaned file is the
/// sweeper's job, not this request's.
async fn delete_song(
    _session: Session,
    State(library_store): State<GuardedLibraryStore>,
    Path(id): Path<String>,
) -> Response {
    match library_store.delete_song(&id) {
        Ok(Some(removed)) => Json(DeleteSongResponse {
            file_hash: removed.file_hash,
            remaining_references: removed.remaining_references,
        })
        .into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            warn!("Failed to delete song {}: {}", id, err);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// GET /songs/{id}/cover - the derived cover object, if one was extracted.
async fn get_song_cover(
    _session: Session,
    State(library_store): State<GuardedLibraryStore>,
    State(object_store): State<GuardedObjectStore>,
    Path(id): Path<String>,
) -> Response {
    let song: Song = match library_store.get_song(&id) {
        Ok(Some(song)) => song,
        Ok(None) => return StatusCode::NOT_FOUND.into_response(),
        Err(_) => return StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    };
    let cover_path = match library_store.find_file_by_hash(&song.file_hash) {
        Ok(Some(file)) => match file.cover_path {
            Some(cover_path) => cover_path,
            None => return StatusCode::NOT_FOUND.into_response(),
        },
        Ok(None) => return StatusCode::NOT_FOUND.into_response(),
        Err(_) => return StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    };

    let buffer = match crate::object_store::read_object(object_store.as_ref(), &cover_path).await {
        Ok(buffer) => buffer,
        Err(err) if err.is_not_found() => return StatusCode::NOT_FOUND.into_response(),
        Err(_) => return StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    };

    if let Some(kind) = infer::get(&buffer) {
        if kind.mime_type().starts_with("image/") {
            return Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, kind.mime_type().to_string())
                .body(buffer.to_vec().into())
                .unwrap();
        }
    }
    StatusCode::NOT_FOUND.into_response()
}

pub fn songs_routes(state: ServerState) -> Router<ServerState> {
    // The body limit sits on the whole method router; it only matters for
    // the multipart POST.
    let library_songs = post(upload_song)
        .get(list_songs)
        .layer(DefaultBodyLimit::max(state.config.max_upload_bytes));

    Router::new()
        .route("/library/{library_id}/songs", library_songs)
        .route("/songs/{id}", get(get_song).delete(delete_song))
        .route("/songs/{id}/cover", get(get_song_cover))
        .route("/songs/{id}/stream", get(super::stream::stream_song))
}
