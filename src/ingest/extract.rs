//! Phase 2: technical metadata and cover art extraction.
//!
//! The just-written temp object is re-read (never the closed write-side
//! stream) and spooled to a local scratch file so the container parser can
//! seek. Extraction is an enrichment: any failure here is reported in the
//! return type and downgraded by the caller, never fatal to the upload.

use crate::library_store::TechnicalMetadata;
use crate::object_store::{ObjectStore, StorageError};
use futures::StreamExt;
use lofty::file::TaggedFileExt;
use lofty::prelude::*;
use lofty::probe::Probe;
use std::path::Path;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unparseable audio container: {0}")]
    Parse(String),
}

/// An embedded cover image pulled out of the audio container's tags.
#[derive(Debug, Clone)]
pub struct CoverArt {
    pub data: Vec<u8>,
    pub mime_type: String,
    pub extension: &'static str,
}

#[derive(Debug, Default)]
pub struct Extracted {
    pub technical: TechnicalMetadata,
    pub cover: Option<CoverArt>,
}

/// Re-read the temp object and probe it. The scratch file is removed on every
/// exit path, including parser failure.
pub async fn extract_metadata(
    store: &dyn ObjectStore,
    temp_object_path: &str,
) -> Result<Extracted, ExtractError> {
    let scratch = tempfile::NamedTempFile::new()?;
    let scratch_path = scratch.path().to_path_buf();

    spool_object(store, temp_object_path, &scratch_path).await?;

    let parsed = tokio::task::spawn_blocking(move || parse_file(&scratch_path))
        .await
        .map_err(|err| ExtractError::Parse(format!("extraction task failed: {}", err)))??;

    // `scratch` dropped here removes the spool file whether or not parsing
    // succeeded.
    drop(scratch);
    Ok(parsed)
}

async fn spool_object(
    store: &dyn ObjectStore,
    key: &str,
    dest: &Path,
) -> Result<(), ExtractError> {
    let mut stream = store.get_object(key).await?;
    let mut file = tokio::fs::File::create(dest).await?;
    while let Some(chunk) = stream.next().await {
        file.write_all(&chunk?).await?;
    }
    file.flush().await?;
    Ok(())
}

fn parse_file(path: &Path) -> Result<Extracted, ExtractError> {
    let tagged_file = Probe::open(path)
        .map_err(|err| ExtractError::Parse(err.to_string()))?
        .read()
        .map_err(|err| ExtractError::Parse(err.to_string()))?;

    let properties = tagged_file.properties();
    let duration = properties.duration().as_secs_f64();
    let technical = TechnicalMetadata {
        duration_seconds: (duration > 0.0).then_some(duration),
        bitrate_kbps: properties.audio_bitrate(),
        sample_rate_hz: properties.sample_rate(),
        channel_count: properties.channels(),
    };

    let cover = tagged_file
        .primary_tag()
        .or_else(|| tagged_file.first_tag())
        .and_then(|tag| tag.pictures().first())
        .and_then(|picture| {
            let mime = picture.mime_type()?.as_str().to_string();
            let extension = cover_extension(&mime)?;
            Some(CoverArt {
                data: picture.data().to_vec(),
                mime_type: mime,
                extension,
            })
        });

    debug!(
        "Extracted metadata: duration={:?}s bitrate={:?}kbps cover={}",
        technical.duration_seconds,
        technical.bitrate_kbps,
        cover.is_some()
    );

    Ok(Extracted { technical, cover })
}

/// Storage extension for a cover image. Unrecognized image types are skipped
/// rather than stored under a junk extension.
fn cover_extension(mime_type: &str) -> Option<&'static str> {
    match mime_type {
        "image/jpeg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/gif" => Some("gif"),
        "image/bmp" => Some("bmp"),
        "image/tiff" => Some("tiff"),
        _ => None,
    }
}
