//! Metadata Record Manager: maps content hashes to stored-file records with
//! reference counts, and songs to the files they reference.

mod models;
mod schema;
mod sqlite_library_store;

pub use models::{Song, SongTags, StoredFile, TechnicalMetadata};
pub use sqlite_library_store::SqliteLibraryStore;

use crate::content_hash::ContentHash;
use anyhow::Result;

/// Outcome of a transactional song delete.
#[derive(Debug, Clone)]
pub struct RemovedSong {
    pub file_hash: ContentHash,
    /// The file's reference count after the decrement.
    pub remaining_references: u32,
}

pub trait LibraryStore: Send + Sync {
    fn find_file_by_hash(&self, hash: &ContentHash) -> Result<Option<StoredFile>>;

    /// Insert a new stored-file record. The reference count starts at zero;
    /// only song creation moves it.
    fn create_file(&self, file: &StoredFile) -> Result<()>;

    /// Insert a song and increment its file's reference count in the same
    /// transaction.
    fn create_song(&self, song: &Song) -> Result<()>;

    fn get_song(&self, id: &str) -> Result<Option<Song>>;

    fn list_songs(&self, library_id: &str) -> Result<Vec<Song>>;

    /// True when the library already holds a song backed by this content.
    fn song_exists_with_hash(&self, library_id: &str, hash: &ContentHash) -> Result<bool>;

    /// Delete a song and decrement its file's reference count in the same
    /// transaction. Returns `None` when no such song exists.
    fn delete_song(&self, id: &str) -> Result<Option<RemovedSong>>;

    /// Files whose reference count has reached zero, eligible for physical
    /// deletion by the sweeper.
    fn list_orphaned_files(&self) -> Result<Vec<StoredFile>>;

    /// Delete a stored-file record, guarded on the reference count still
    /// being zero. Returns false when the record was gone or re-referenced.
    fn delete_file_if_orphaned(&self, hash: &ContentHash) -> Result<bool>;

    /// Sum of `size_bytes` over all stored files, for the quota observer.
    fn total_stored_bytes(&self) -> Result<u64>;
}
