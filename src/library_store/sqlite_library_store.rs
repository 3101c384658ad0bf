use super::models::{Song, SongTags, StoredFile, TechnicalMetadata};
use super::schema::LIBRARY_SCHEMA;
use super::{LibraryStore, RemovedSong};
use crate::content_hash::ContentHash;
use anyhow::{bail, Context, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::Mutex;
use tracing::debug;

pub struct SqliteLibraryStore {
    conn: Mutex<Connection>,
}

impl SqliteLibraryStore {
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(db_path.as_ref())
            .with_context(|| format!("Error opening library db at {:?}", db_path.as_ref()))?;
        LIBRARY_SCHEMA.initialize(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn row_to_file(row: &Row) -> rusqlite::Result<StoredFile> {
        let hash_hex: String = row.get("content_hash")?;
        let content_hash = ContentHash::from_hex(&hash_hex).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                format!("invalid content hash in db: {}", hash_hex).into(),
            )
        })?;
        Ok(StoredFile {
            content_hash,
            object_path: row.get("object_path")?,
            size_bytes: row.get::<_, i64>("size_bytes")? as u64,
            mime_type: row.get("mime_type")?,
            technical_metadata: TechnicalMetadata {
                duration_seconds: row.get("duration_seconds")?,
                bitrate_kbps: row.get::<_, Option<i64>>("bitrate_kbps")?.map(|v| v as u32),
                sample_rate_hz: row
                    .get::<_, Option<i64>>("sample_rate_hz")?
                    .map(|v| v as u32),
                channel_count: row.get::<_, Option<i64>>("channel_count")?.map(|v| v as u8),
            },
            cover_path: row.get("cover_path")?,
            reference_count: row.get::<_, i64>("ref_count")?.max(0) as u32,
        })
    }

    fn row_to_song(row: &Row) -> rusqlite::Result<Song> {
        let hash_hex: String = row.get("file_hash")?;
        let file_hash = ContentHash::from_hex(&hash_hex).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                format!("invalid file hash in db: {}", hash_hex).into(),
            )
        })?;
        Ok(Song {
            id: row.get("id")?,
            library_id: row.get("library_id")?,
            file_hash,
            tags: SongTags {
                title: row.get("title")?,
                artist: row.get("artist")?,
                album: row.get("album")?,
                track_number: row.get::<_, Option<i64>>("track_number")?.map(|v| v as u32),
                year: row.get::<_, Option<i64>>("year")?.map(|v| v as u32),
            },
        })
    }
}

const FILE_COLUMNS: &str = "content_hash, object_path, size_bytes, mime_type, duration_seconds, \
                            bitrate_kbps, sample_rate_hz, channel_count, cover_path, ref_count";

const SONG_COLUMNS: &str = "id, library_id, file_hash, title, artist, album, track_number, year";

impl LibraryStore for SqliteLibraryStore {
    fn find_file_by_hash(&self, hash: &ContentHash) -> Result<Option<StoredFile>> {
        let conn = self.conn.lock().unwrap();
        let file = conn
            .query_row(
                &format!("SELECT {FILE_COLUMNS} FROM stored_file WHERE content_hash = ?1"),
                params![hash.to_hex()],
                Self::row_to_file,
            )
            .optional()?;
        Ok(file)
    }

    fn create_file(&self, file: &StoredFile) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO stored_file (content_hash, object_path, size_bytes, mime_type, \
             duration_seconds, bitrate_kbps, sample_rate_hz, channel_count, cover_path, ref_count) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0)",
            params![
                file.content_hash.to_hex(),
                file.object_path,
                file.size_bytes as i64,
                file.mime_type,
                file.technical_metadata.duration_seconds,
                file.technical_metadata.bitrate_kbps.map(|v| v as i64),
                file.technical_metadata.sample_rate_hz.map(|v| v as i64),
                file.technical_metadata.channel_count.map(|v| v as i64),
                file.cover_path,
            ],
        )?;
        debug!("Created stored file record {}", file.content_hash);
        Ok(())
    }

    fn create_song(&self, song: &Song) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO song (id, library_id, file_hash, title, artist, album, track_number, year) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                song.id,
                song.library_id,
                song.file_hash.to_hex(),
                song.tags.title,
                song.tags.artist,
                song.tags.album,
                song.tags.track_number.map(|v| v as i64),
                song.tags.year.map(|v| v as i64),
            ],
        )?;

        let updated = tx.execute(
            "UPDATE stored_file SET ref_count = ref_count + 1 WHERE content_hash = ?1",
            params![song.file_hash.to_hex()],
        )?;
        if updated != 1 {
            bail!("No stored file with hash {} to reference", song.file_hash);
        }

        tx.commit()?;
        Ok(())
    }

    fn get_song(&self, id: &str) -> Result<Option<Song>> {
        let conn = self.conn.lock().unwrap();
        let song = conn
            .query_row(
                &format!("SELECT {SONG_COLUMNS} FROM song WHERE id = ?1"),
                params![id],
                Self::row_to_song,
            )
            .optional()?;
        Ok(song)
    }

    fn list_songs(&self, library_id: &str) -> Result<Vec<Song>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {SONG_COLUMNS} FROM song WHERE library_id = ?1 ORDER BY created, id"
        ))?;
        let songs = stmt
            .query_map(params![library_id], Self::row_to_song)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(songs)
    }

    fn song_exists_with_hash(&self, library_id: &str, hash: &ContentHash) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT count(*) FROM song WHERE library_id = ?1 AND file_hash = ?2",
            params![library_id, hash.to_hex()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn delete_song(&self, id: &str) -> Result<Option<RemovedSong>> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let hash_hex: Option<String> = tx
            .query_row(
                "SELECT file_hash FROM song WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        let hash_hex = match hash_hex {
            Some(hash_hex) => hash_hex,
            None => return Ok(None),
        };
        let file_hash = ContentHash::from_hex(&hash_hex)
            .with_context(|| format!("invalid file hash in db: {}", hash_hex))?;

        tx.execute("DELETE FROM song WHERE id = ?1", params![id])?;
        tx.execute(
            "UPDATE stored_file SET ref_count = ref_count - 1 \
             WHERE content_hash = ?1 AND ref_count > 0",
            params![hash_hex],
        )?;
        let remaining: i64 = tx.query_row(
            "SELECT ref_count FROM stored_file WHERE content_hash = ?1",
            params![hash_hex],
            |row| row.get(0),
        )?;

        tx.commit()?;
        Ok(Some(RemovedSong {
            file_hash,
            remaining_references: remaining.max(0) as u32,
        }))
    }

    fn list_orphaned_files(&self) -> Result<Vec<StoredFile>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {FILE_COLUMNS} FROM stored_file WHERE ref_count = 0"
        ))?;
        let files = stmt
            .query_map([], Self::row_to_file)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(files)
    }

    fn delete_file_if_orphaned(&self, hash: &ContentHash) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute(
            "DELETE FROM stored_file WHERE content_hash = ?1 AND ref_count = 0",
            params![hash.to_hex()],
        )?;
        Ok(deleted > 0)
    }

    fn total_stored_bytes(&self) -> Result<u64> {
        let conn = self.conn.lock().unwrap();
        let total: i64 = conn.query_row(
            "SELECT coalesce(sum(size_bytes), 0) FROM stored_file",
            [],
            |row| row.get(0),
        )?;
        Ok(total.max(0) as u64)
    }
}
