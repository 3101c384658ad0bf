//! Object store client abstraction.
//!
//! The server keeps all binary payloads (audio files, derived cover images,
//! in-flight temp uploads) in an external object store. This module defines
//! the capability set the rest of the crate consumes and ships two backends:
//! a local filesystem store and an S3-compatible store for MinIO-style
//! deployments.
//!
//! There is deliberately no server-side range read in the trait: the range
//! retrieval proxy windows the full object stream client-side, and the
//! finalizer relies on `stat_object`/`copy_object` existence semantics as its
//! only concurrency control.

mod filesystem;
mod s3;

pub use filesystem::FilesystemStore;
pub use s3::{S3Settings, S3Store};

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;
use thiserror::Error;

/// Chunk size used by backends for streamed reads.
pub const STREAM_CHUNK_SIZE: usize = 64 * 1024;

/// A boxed stream of object bytes.
pub type ByteStream = Pin<Box<dyn Stream<Item = StorageResult<Bytes>> + Send>>;

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("invalid object key: {0}")]
    InvalidKey(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }
}

/// Metadata returned by `stat_object`.
#[derive(Clone, Debug)]
pub struct ObjectMeta {
    /// Object size in bytes.
    pub size: u64,
    /// Last modification time, when the backend reports one.
    pub last_modified: Option<time::OffsetDateTime>,
}

/// Handle for a streaming upload. Writes go out chunk by chunk; the object
/// only becomes readable after `finish` resolves. Dropping the handle without
/// finishing aborts the upload best-effort, so a client disconnect mid-upload
/// cannot leave a readable partial object behind.
#[async_trait]
pub trait StreamingUpload: Send {
    async fn write(&mut self, chunk: Bytes) -> StorageResult<()>;

    /// Complete the upload. Returns the total bytes written. The caller must
    /// await this before treating the object as durably readable.
    async fn finish(self: Box<Self>) -> StorageResult<u64>;

    /// Abort the upload and discard any bytes already written.
    async fn abort(self: Box<Self>) -> StorageResult<()>;
}

/// The object store capability set consumed by ingestion, retrieval and the
/// lifecycle sweeper.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    async fn bucket_exists(&self) -> StorageResult<bool>;

    async fn make_bucket(&self) -> StorageResult<()>;

    /// Put a fully materialized object. Small payloads (covers) only.
    async fn put_object(&self, key: &str, data: Bytes) -> StorageResult<()>;

    /// Start a streaming upload to `key`.
    async fn put_object_stream(&self, key: &str) -> StorageResult<Box<dyn StreamingUpload>>;

    /// Open a full read stream over an object.
    async fn get_object(&self, key: &str) -> StorageResult<ByteStream>;

    async fn stat_object(&self, key: &str) -> StorageResult<ObjectMeta>;

    /// Server-side copy. Used by the finalizer to promote temp objects.
    async fn copy_object(&self, dest: &str, src: &str) -> StorageResult<()>;

    async fn remove_object(&self, key: &str) -> StorageResult<()>;

    /// Remove a batch of objects. Missing objects are not an error.
    async fn remove_objects(&self, keys: &[String]) -> StorageResult<()>;

    /// List object keys under a prefix.
    async fn list_objects(&self, prefix: &str) -> StorageResult<Vec<String>>;

    /// Static identifier for logging ("filesystem", "s3").
    fn backend_name(&self) -> &'static str;
}

/// Convenience: read a whole object into memory. Covers and test assertions
/// only; audio payloads stay streamed.
pub async fn read_object(store: &dyn ObjectStore, key: &str) -> StorageResult<Bytes> {
    use futures::StreamExt;

    let mut stream = store.get_object(key).await?;
    let mut buf = Vec::new();
    while let Some(chunk) = stream.next().await {
        buf.extend_from_slice(&chunk?);
    }
    Ok(Bytes::from(buf))
}
