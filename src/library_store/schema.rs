//! SQLite schema for the library database.

use crate::sqlite_column;
use crate::sqlite_persistence::{
    Column, ForeignKey, ForeignKeyOnChange, SqlType, Table, VersionedSchema, DEFAULT_TIMESTAMP,
};

const STORED_FILE_TABLE: Table = Table {
    name: "stored_file",
    columns: &[
        sqlite_column!(
            "content_hash",
            &SqlType::Text,
            is_primary_key = true,
            non_null = true
        ),
        sqlite_column!("object_path", &SqlType::Text, non_null = true),
        sqlite_column!("size_bytes", &SqlType::Integer, non_null = true),
        sqlite_column!("mime_type", &SqlType::Text, non_null = true),
        sqlite_column!("duration_seconds", &SqlType::Real),
        sqlite_column!("bitrate_kbps", &SqlType::Integer),
        sqlite_column!("sample_rate_hz", &SqlType::Integer),
        sqlite_column!("channel_count", &SqlType::Integer),
        sqlite_column!("cover_path", &SqlType::Text),
        sqlite_column!(
            "ref_count",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!(
            "created",
            &SqlType::Integer,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[("idx_stored_file_ref_count", "ref_count")],
    unique_constraints: &[],
};

const SONG_TABLE: Table = Table {
    name: "song",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true, non_null = true),
        sqlite_column!("library_id", &SqlType::Text, non_null = true),
        sqlite_column!(
            "file_hash",
            &SqlType::Text,
            non_null = true,
            foreign_key = Some(&ForeignKey {
                foreign_table: "stored_file",
                foreign_column: "content_hash",
                on_delete: ForeignKeyOnChange::Restrict,
            })
        ),
        sqlite_column!("title", &SqlType::Text),
        sqlite_column!("artist", &SqlType::Text),
        sqlite_column!("album", &SqlType::Text),
        sqlite_column!("track_number", &SqlType::Integer),
        sqlite_column!("year", &SqlType::Integer),
        sqlite_column!(
            "created",
            &SqlType::Integer,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[
        ("idx_song_library_id", "library_id"),
        ("idx_song_file_hash", "file_hash"),
    ],
    // One copy of any given content per library; duplicates are rejected
    // upstream with a 409 and this backstops races.
    unique_constraints: &[&["library_id", "file_hash"]],
};

pub const LIBRARY_SCHEMA: VersionedSchema = VersionedSchema {
    version: 1,
    tables: &[STORED_FILE_TABLE, SONG_TABLE],
};
