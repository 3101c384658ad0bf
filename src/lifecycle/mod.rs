//! Reference-counted lifecycle management.
//!
//! Song deletion decrements a stored file's reference count inside the same
//! transaction, but physical deletion is deferred to this sweeper: orphaned
//! records (`ref_count == 0`) are collected on a fixed interval, together
//! with stale `temp/` objects left behind by crashed uploads. "Eventually
//! collected" is bounded by one sweep interval.

use crate::library_store::LibraryStore;
use crate::object_store::ObjectStore;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

#[derive(Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Orphaned stored files whose records and objects were collected.
    pub files_collected: usize,
    /// Stale temp objects removed.
    pub temp_objects_removed: usize,
}

pub struct OrphanSweeper {
    object_store: Arc<dyn ObjectStore>,
    library_store: Arc<dyn LibraryStore>,
    /// Temp objects older than this are treated as crash debris.
    temp_max_age: Duration,
}

impl OrphanSweeper {
    pub fn new(
        object_store: Arc<dyn ObjectStore>,
        library_store: Arc<dyn LibraryStore>,
        temp_max_age: Duration,
    ) -> Self {
        Self {
            object_store,
            library_store,
            temp_max_age,
        }
    }

    /// Run forever, sweeping every `interval`. The first tick is skipped so a
    /// server restart doesn't immediately race in-flight uploads.
    pub async fn run(self, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match self.sweep_once().await {
                Ok(report) => {
                    if report.files_collected > 0 || report.temp_objects_removed > 0 {
                        info!(
                            "Sweep collected {} orphaned files, {} stale temp objects",
                            report.files_collected, report.temp_objects_removed
                        );
                    }
                }
                Err(err) => error!("Lifecycle sweep failed: {}", err),
            }
        }
    }

    pub async fn sweep_once(&self) -> Result<SweepReport> {
        let mut report = SweepReport::default();
        report.files_collected = self.collect_orphaned_files().await?;
        report.temp_objects_removed = self.remove_stale_temp_objects().await?;
        Ok(report)
    }

    async fn collect_orphaned_files(&self) -> Result<usize> {
        let orphans = self.library_store.list_orphaned_files()?;
        let mut collected = 0;

        for file in orphans {
            // Delete the record first, guarded on the count still being
            // zero; a concurrent upload may have re-referenced the content
            // since the listing, and its objects must then survive.
            if !self.library_store.delete_file_if_orphaned(&file.content_hash)? {
                debug!("Skipping {}: re-referenced since listing", file.content_hash);
                continue;
            }

            let mut keys = vec![file.object_path.clone()];
            if let Some(cover_path) = &file.cover_path {
                keys.push(cover_path.clone());
            }
            if let Err(err) = self.object_store.remove_objects(&keys).await {
                // The record is gone; a leftover object is harmless (it is
                // content-addressed and a future identical upload converges
                // on it) but worth noticing.
                warn!(
                    "Failed to remove objects for collected file {}: {}",
                    file.content_hash, err
                );
            }
            collected += 1;
        }
        Ok(collected)
    }

    async fn remove_stale_temp_objects(&self) -> Result<usize> {
        let now = time::OffsetDateTime::now_utc();
        let keys = self.object_store.list_objects("temp/").await?;
        let mut removed = 0;

        for key in keys {
            let meta = match self.object_store.stat_object(&key).await {
                Ok(meta) => meta,
                // Already gone: an upload finalized it between list and stat.
                Err(err) if err.is_not_found() => continue,
                Err(err) => return Err(err.into()),
            };
            let last_modified = match meta.last_modified {
                Some(last_modified) => last_modified,
                None => continue,
            };
            if now - last_modified >= self.temp_max_age {
                self.object_store.remove_object(&key).await?;
                debug!("Removed stale temp object {}", key);
                removed += 1;
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content_hash::ContentHash;
    use crate::library_store::{
        Song, SongTags, SqliteLibraryStore, StoredFile, TechnicalMetadata,
    };
    use crate::object_store::FilesystemStore;
    use bytes::Bytes;
    use tempfile::TempDir;

    async fn setup() -> (TempDir, Arc<FilesystemStore>, Arc<SqliteLibraryStore>, OrphanSweeper) {
        let dir = TempDir::new().unwrap();
        let object_store = Arc::new(FilesystemStore::new(dir.path().join("objects")).await.unwrap());
        let library_store =
            Arc::new(SqliteLibraryStore::new(dir.path().join("library.db")).unwrap());
        let sweeper = OrphanSweeper::new(
            object_store.clone(),
            library_store.clone(),
            Duration::from_secs(0),
        );
        (dir, object_store, library_store, sweeper)
    }

    async fn stored_file(
        object_store: &FilesystemStore,
        library_store: &SqliteLibraryStore,
        content: &'static [u8],
    ) -> StoredFile {
        use crate::library_store::LibraryStore;

        let hash = ContentHash::compute(content);
        let object_path = format!("files/{}.mp3", hash.to_hex());
        object_store
            .put_object(&object_path, Bytes::from_static(content))
            .await
            .unwrap();
        let file = StoredFile {
            content_hash: hash,
            object_path,
            size_bytes: content.len() as u64,
            mime_type: "audio/mpeg".to_string(),
            technical_metadata: TechnicalMetadata::default(),
            cover_path: None,
            reference_count: 0,
        };
        library_store.create_file(&file).unwrap();
        file
    }

    #[tokio::test]
    async fn collects_orphans_but_not_referenced_files() {
        use crate::library_store::LibraryStore;

        let (_dir, object_store, library_store, sweeper) = setup().await;

        let orphan = stored_file(&object_store, &library_store, b"orphan bytes").await;
        let kept = stored_file(&object_store, &library_store, b"kept bytes").await;
        library_store
            .create_song(&Song {
                id: "s1".to_string(),
                library_id: "lib".to_string(),
                file_hash: kept.content_hash,
                tags: SongTags::default(),
            })
            .unwrap();

        let report = sweeper.sweep_once().await.unwrap();
        assert_eq!(report.files_collected, 1);

        assert!(library_store
            .find_file_by_hash(&orphan.content_hash)
            .unwrap()
            .is_none());
        assert!(object_store.stat_object(&orphan.object_path).await.is_err());

        assert!(library_store
            .find_file_by_hash(&kept.content_hash)
            .unwrap()
            .is_some());
        assert!(object_store.stat_object(&kept.object_path).await.is_ok());
    }

    #[tokio::test]
    async fn removes_stale_temp_objects() {
        let (_dir, object_store, _library_store, sweeper) = setup().await;

        object_store
            .put_object("temp/stale", Bytes::from_static(b"leftover"))
            .await
            .unwrap();

        // temp_max_age is zero, so anything listed is stale.
        let report = sweeper.sweep_once().await.unwrap();
        assert_eq!(report.temp_objects_removed, 1);
        assert!(object_store.list_objects("temp/").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn fresh_temp_objects_survive() {
        let (_dir, object_store, library_store, _sweeper) = setup().await;
        let sweeper = OrphanSweeper::new(
            object_store.clone(),
            library_store.clone(),
            Duration::from_secs(3600),
        );

        object_store
            .put_object("temp/fresh", Bytes::from_static(b"in flight"))
            .await
            .unwrap();

        let report = sweeper.sweep_once().await.unwrap();
        assert_eq!(report.temp_objects_removed, 0);
        assert_eq!(
            object_store.list_objects("temp/").await.unwrap(),
            vec!["temp/fresh".to_string()]
        );
    }
}
