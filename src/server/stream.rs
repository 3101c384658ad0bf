//! Audio streaming with HTTP range support.
//!
//! The object store has no server-side range read, so ranging is done here:
//! the full object stream is windowed chunk by chunk against the requested
//! byte window, and the upstream read is dropped as soon as the window is
//! served instead of draining the tail.

use super::{
    session::Session,
    state::{GuardedLibraryStore, GuardedObjectStore, ServerState},
};
use axum::{
    body::Body,
    extract::{OptionalFromRequestParts, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::convert::Infallible;

use crate::library_store::LibraryStore;
use crate::object_store::{ByteStream, ObjectStore};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use tracing::{debug, warn};

const HEADER_BYTE_RANGE: &str = "Range";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    start_inclusive: Option<u64>,
    end_inclusive: Option<u64>,
}

impl ByteRange {
    pub fn new(start_inclusive: Option<u64>, end_inclusive: Option<u64>) -> ByteRange {
        ByteRange {
            start_inclusive,
            end_inclusive,
        }
    }

    fn parse<S: AsRef<str>>(s: S) -> Option<ByteRange> {
        let v = s.as_ref();
        if !v.starts_with("bytes=") {
            return None;
        }

        let v = &v[6..];
        let parts: Vec<&str> = v.split('-').collect();
        if parts.len() != 2 {
            return None;
        }

        Some(ByteRange {
            start_inclusive: parts[0].parse::<u64>().ok(),
            end_inclusive: parts[1].parse::<u64>().ok(),
        })
    }
}

impl OptionalFromRequestParts<ServerState> for ByteRange {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &ServerState,
    ) -> Result<Option<Self>, Self::Rejection> {
        Ok(parts
            .headers
            .get(HEADER_BYTE_RANGE)
            .map(|x| x.to_str())
            .map(|x| x.ok())
            .and_then(|x| x.and_then(ByteRange::parse)))
    }
}

/// The byte window a request resolves to against an object of known size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResolvedRange {
    /// Serve the whole object with status 200.
    Full,
    /// Serve `[start, end]` inclusive with status 206.
    Window { start: u64, end: u64 },
    /// No satisfiable window: status 416.
    Unsatisfiable,
}

/// Resolve a parsed `Range` header against the object size. Absent and
/// malformed ranges fall back to the full object; an omitted end means
/// `size - 1`; `bytes=-n` is an RFC suffix range (the final n bytes).
fn resolve_range(range: Option<ByteRange>, size: u64) -> ResolvedRange {
    let range = match range {
        None
        | Some(ByteRange {
            start_inclusive: None,
            end_inclusive: None,
        }) => return ResolvedRange::Full,
        Some(range) => range,
    };

    if size == 0 {
        return ResolvedRange::Unsatisfiable;
    }

    match (range.start_inclusive, range.end_inclusive) {
        (Some(start), end) => {
            if start >= size {
                return ResolvedRange::Unsatisfiable;
            }
            let end = end.unwrap_or(size - 1).min(size - 1);
            if start > end {
                // Inverted window: treat like a malformed header.
                return ResolvedRange::Full;
            }
            ResolvedRange::Window { start, end }
        }
        (None, Some(suffix_len)) => {
            if suffix_len == 0 {
                return ResolvedRange::Unsatisfiable;
            }
            ResolvedRange::Window {
                start: size.saturating_sub(suffix_len),
                end: size - 1,
            }
        }
        (None, None) => unreachable!("handled above"),
    }
}

/// Trim an object stream to `[start, end]` inclusive. Chunks before the
/// window are skipped, boundary chunks are sliced, and the upstream stream is
/// dropped as soon as the cursor passes `end`.
fn window_stream(
    mut upstream: ByteStream,
    start: u64,
    end: u64,
) -> impl Stream<Item = Result<Bytes, crate::object_store::StorageError>> + Send {
    async_stream::try_stream! {
        let mut cursor: u64 = 0;
        while let Some(chunk) = upstream.next().await {
            let chunk = chunk?;
            let chunk_start = cursor;
            let chunk_end = cursor + chunk.len() as u64; // exclusive
            cursor = chunk_end;

            if chunk_end <= start {
                continue;
            }
            if chunk_start > end {
                break;
            }

            let from = start.saturating_sub(chunk_start) as usize;
            let to = ((end + 1).min(chunk_end) - chunk_start) as usize;
            if from < to {
                yield chunk.slice(from..to);
            }
            if chunk_end > end {
                // Window satisfied: stop here rather than draining the tail.
                break;
            }
        }
    }
}

pub async fn stream_song(
    _session: Session,
    byte_range: Option<ByteRange>,
    State(library_store): State<GuardedLibraryStore>,
    State(object_store): State<GuardedObjectStore>,
    Path(id): Path<String>,
) -> Response {
    let song = match library_store.get_song(&id) {
        Ok(Some(song)) => song,
        Ok(None) => return StatusCode::NOT_FOUND.into_response(),
        Err(_) => return StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    };

    let file = match library_store.find_file_by_hash(&song.file_hash) {
        Ok(Some(file)) => file,
        Ok(None) => return StatusCode::NOT_FOUND.into_response(),
        Err(_) => return StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    };

    let meta = match object_store.stat_object(&file.object_path).await {
        Ok(meta) => meta,
        Err(err) if err.is_not_found() => {
            warn!("Song {} points at missing object {}", id, file.object_path);
            return StatusCode::NOT_FOUND.into_response();
        }
        Err(_) => return StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    };
    let total_size = meta.size;

    let resolved = resolve_range(byte_range, total_size);
    debug!(
        "Streaming song {} ({} bytes), range {:?} -> {:?}",
        id, total_size, byte_range, resolved
    );

    let (status_code, start, end) = match resolved {
        ResolvedRange::Unsatisfiable => {
            return Response::builder()
                .status(StatusCode::RANGE_NOT_SATISFIABLE)
                .header("Content-Range", format!("bytes */{}", total_size))
                .body(Body::empty())
                .unwrap();
        }
        ResolvedRange::Full => (StatusCode::OK, 0, total_size.saturating_sub(1)),
        ResolvedRange::Window { start, end } => (StatusCode::PARTIAL_CONTENT, start, end),
    };

    let upstream = match object_store.get_object(&file.object_path).await {
        Ok(stream) => stream,
        Err(_) => return StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    };

    let content_length = if total_size == 0 { 0 } else { end - start + 1 };
    let body = Body::from_stream(window_stream(upstream, start, end));

    let mut builder = Response::builder()
        .status(status_code)
        .header("Content-Type", file.mime_type.clone())
        .header("Accept-Ranges", "bytes")
        .header("Content-Length", content_length);
    if status_code == StatusCode::PARTIAL_CONTENT {
        builder = builder.header(
            "Content-Range",
            format!("bytes {}-{}/{}", start, end, total_size),
        );
    }
    builder.body(body).unwrap()
}
