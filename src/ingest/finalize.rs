//! Phase 3: promotion of the temp object to its permanent, hash-derived path.
//!
//! There is no distributed lock. The object store's own existence semantics
//! arbitrate between concurrent uploads of identical content: probe, copy,
//! and on copy failure re-probe — if the permanent object exists by then, a
//! concurrent uploader won the race and that counts as success. The temp
//! object is removed unconditionally afterwards.

use super::extract::CoverArt;
use crate::content_hash::ContentHash;
use crate::object_store::{ObjectStore, StorageResult};
use tracing::{debug, warn};

pub fn permanent_audio_path(hash: &ContentHash, extension: &str) -> String {
    format!("files/{}.{}", hash.to_hex(), extension)
}

pub fn permanent_cover_path(hash: &ContentHash, extension: &str) -> String {
    format!("covers/{}.{}", hash.to_hex(), extension)
}

/// Promote `temp_object_path` to the permanent path for `hash`. Returns the
/// permanent path; on return the temp object is gone (best effort) whether
/// promotion succeeded, deduplicated, or failed.
pub async fn finalize_object(
    store: &dyn ObjectStore,
    temp_object_path: &str,
    hash: &ContentHash,
    extension: &str,
) -> StorageResult<String> {
    let permanent = permanent_audio_path(hash, extension);

    let result = promote(store, temp_object_path, &permanent).await;
    discard_temp(store, temp_object_path).await;
    result?;
    Ok(permanent)
}

async fn promote(store: &dyn ObjectStore, temp: &str, permanent: &str) -> StorageResult<()> {
    match store.stat_object(permanent).await {
        Ok(_) => {
            debug!("Permanent object {} already exists, deduplicating", permanent);
            return Ok(());
        }
        Err(err) if err.is_not_found() => {}
        Err(err) => return Err(err),
    }

    match store.copy_object(permanent, temp).await {
        Ok(()) => {
            debug!("Promoted {} to {}", temp, permanent);
            Ok(())
        }
        Err(copy_err) => {
            // A concurrent upload of the same content may have created the
            // permanent object between the probe and the copy. Re-probe: an
            // existing object means the race resolved in our favor anyway.
            match store.stat_object(permanent).await {
                Ok(_) => {
                    debug!(
                        "Copy to {} lost a dedup race, object exists: treating as success",
                        permanent
                    );
                    Ok(())
                }
                Err(_) => Err(copy_err),
            }
        }
    }
}

/// Best-effort temp removal; a cleanup failure is logged, never surfaced.
pub async fn discard_temp(store: &dyn ObjectStore, temp_object_path: &str) {
    if let Err(err) = store.remove_object(temp_object_path).await {
        warn!("Failed to remove temp object {}: {}", temp_object_path, err);
    }
}

/// Store an extracted cover under its content-addressed path. Already-present
/// covers are left alone, so re-uploads of identical audio never re-store a
/// duplicate. Failures are logged and reported as "no cover" — cover art is
/// an enrichment.
pub async fn store_cover(
    store: &dyn ObjectStore,
    hash: &ContentHash,
    cover: &CoverArt,
) -> Option<String> {
    let path = permanent_cover_path(hash, cover.extension);

    match store.stat_object(&path).await {
        Ok(_) => return Some(path),
        Err(err) if err.is_not_found() => {}
        Err(err) => {
            warn!("Failed to probe cover {}: {}", path, err);
            return None;
        }
    }

    match store
        .put_object(&path, bytes::Bytes::from(cover.data.clone()))
        .await
    {
        Ok(()) => Some(path),
        Err(err) => {
            warn!("Failed to store cover {}: {}", path, err);
            None
        }
    }
}
