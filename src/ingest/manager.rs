//! Upload pipeline orchestration.

use super::extract::{extract_metadata, Extracted};
use super::finalize::{discard_temp, finalize_object, store_cover};
use super::multipart::receive_upload;
use super::session::UploadSession;
use super::UploadError;
use crate::content_hash::ContentHash;
use crate::library_store::{LibraryStore, Song, SongTags, StoredFile};
use crate::object_store::ObjectStore;
use crate::quota::StorageQuota;
use axum::extract::multipart::Multipart;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Result of a successful upload.
#[derive(Debug)]
pub struct IngestOutcome {
    pub song: Song,
    pub file: StoredFile,
    /// True when this upload stored new content, false when it deduplicated
    /// against an existing stored file.
    pub created: bool,
}

pub struct IngestManager {
    object_store: Arc<dyn ObjectStore>,
    library_store: Arc<dyn LibraryStore>,
    quota: StorageQuota,
}

impl IngestManager {
    pub fn new(
        object_store: Arc<dyn ObjectStore>,
        library_store: Arc<dyn LibraryStore>,
        quota: StorageQuota,
    ) -> Self {
        Self {
            object_store,
            library_store,
            quota,
        }
    }

    /// Run the full pipeline for one multipart request. On any error after
    /// Phase 1 the temp object is discarded before the error propagates;
    /// Phase 1 cleans up after itself.
    pub async fn ingest(
        &self,
        library_id: &str,
        multipart: Multipart,
    ) -> Result<IngestOutcome, UploadError> {
        let session = receive_upload(self.object_store.as_ref(), multipart).await?;
        let temp_object_path = session.temp_object_path.clone();

        match self.run_phases(library_id, session).await {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                // Idempotent: the temp object may already be gone when the
                // failure happened past finalize.
                discard_temp(self.object_store.as_ref(), &temp_object_path).await;
                Err(err)
            }
        }
    }

    async fn run_phases(
        &self,
        library_id: &str,
        session: UploadSession,
    ) -> Result<IngestOutcome, UploadError> {
        check_declared_hash(&session)?;
        let hash = session.content_hash;
        let tags = tags_from_fields(&session.form_fields);

        if self.library_store.find_file_by_hash(&hash)?.is_some() {
            // Known content: skip extraction and finalize entirely, the
            // permanent object and its derived cover already exist.
            if self.library_store.song_exists_with_hash(library_id, &hash)? {
                return Err(UploadError::DuplicateInLibrary);
            }
            discard_temp(self.object_store.as_ref(), &session.temp_object_path).await;
            let song = self.create_song(library_id, &hash, tags)?;
            let file = self.refreshed_file(&hash)?;
            info!(
                "Deduplicated upload of {} into library {} as song {}",
                hash, library_id, song.id
            );
            return Ok(IngestOutcome {
                song,
                file,
                created: false,
            });
        }

        if let Err(rejection) = self
            .quota
            .admit(self.library_store.total_stored_bytes()?, session.size_bytes)
        {
            debug!(
                "Rejecting upload of {} bytes: {} of {} quota bytes used",
                rejection.incoming_bytes, rejection.current_bytes, rejection.max_total_bytes
            );
            return Err(UploadError::QuotaExceeded);
        }

        // Phase 2. Extraction failure is downgraded to an empty result; the
        // upload itself must not fail over missing enrichments.
        let extracted = match extract_metadata(self.object_store.as_ref(), &session.temp_object_path)
            .await
        {
            Ok(extracted) => extracted,
            Err(err) => {
                warn!(
                    "Metadata extraction failed for {}, storing without: {}",
                    session.temp_object_path, err
                );
                Extracted::default()
            }
        };

        // Phase 3.
        let object_path = finalize_object(
            self.object_store.as_ref(),
            &session.temp_object_path,
            &hash,
            session.storage_extension(),
        )
        .await?;

        let cover_path = match &extracted.cover {
            Some(cover) => store_cover(self.object_store.as_ref(), &hash, cover).await,
            None => None,
        };

        let file = StoredFile {
            content_hash: hash,
            object_path,
            size_bytes: session.size_bytes,
            mime_type: session.mime_type.clone(),
            technical_metadata: extracted.technical,
            cover_path,
            reference_count: 0,
        };

        let mut created = true;
        match self.library_store.create_file(&file) {
            Ok(()) => {}
            Err(err) if is_constraint_violation(&err) => {
                // A concurrent upload of the same bytes registered the record
                // between our lookup and now. Its finalize converged on the
                // same permanent object; continue as a dedup hit.
                debug!("Stored file {} was registered concurrently", hash);
                created = false;
            }
            Err(err) => return Err(err.into()),
        }

        if self.library_store.song_exists_with_hash(library_id, &hash)? {
            return Err(UploadError::DuplicateInLibrary);
        }
        let song = self.create_song(library_id, &hash, tags)?;
        let file = self.refreshed_file(&hash)?;
        info!(
            "Ingested {} ({} bytes) into library {} as song {}",
            hash, file.size_bytes, library_id, song.id
        );
        Ok(IngestOutcome {
            song,
            file,
            created,
        })
    }

    fn create_song(
        &self,
        library_id: &str,
        hash: &ContentHash,
        tags: SongTags,
    ) -> Result<Song, UploadError> {
        let song = Song {
            id: Uuid::new_v4().to_string(),
            library_id: library_id.to_string(),
            file_hash: *hash,
            tags,
        };
        match self.library_store.create_song(&song) {
            Ok(()) => Ok(song),
            // The (library, hash) uniqueness backstop fired: a concurrent
            // request inserted the same content into this library first.
            Err(err) if is_constraint_violation(&err) => Err(UploadError::DuplicateInLibrary),
            Err(err) => Err(err.into()),
        }
    }

    fn refreshed_file(&self, hash: &ContentHash) -> Result<StoredFile, UploadError> {
        self.library_store
            .find_file_by_hash(hash)?
            .ok_or_else(|| UploadError::Store(anyhow::anyhow!("stored file {} vanished", hash)))
    }
}

fn check_declared_hash(session: &UploadSession) -> Result<(), UploadError> {
    let declared = match session.form_fields.get("hash") {
        Some(declared) if !declared.is_empty() => declared,
        _ => return Ok(()),
    };
    match ContentHash::from_hex(declared) {
        Some(hash) if hash == session.content_hash => Ok(()),
        Some(_) => Err(UploadError::HashMismatch),
        None => Err(UploadError::InvalidDeclaredHash(declared.clone())),
    }
}

fn tags_from_fields(fields: &HashMap<String, String>) -> SongTags {
    let text = |key: &str| {
        fields
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .map(|v| v.to_string())
    };
    SongTags {
        title: text("title"),
        artist: text("artist"),
        album: text("album"),
        track_number: fields.get("track").and_then(|v| v.trim().parse().ok()),
        year: fields.get("year").and_then(|v| v.trim().parse().ok()),
    }
}

fn is_constraint_violation(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<rusqlite::Error>(),
        Some(rusqlite::Error::SqliteFailure(e, _))
            if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}
