//! Local filesystem object store backend.

use super::{
    ByteStream, ObjectMeta, ObjectStore, StorageError, StorageResult, StreamingUpload,
    STREAM_CHUNK_SIZE,
};
use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use uuid::Uuid;

/// Suffix for staging files of in-flight streaming uploads. Staged files are
/// invisible to `list_objects` and never readable as objects.
const PART_SUFFIX: &str = ".part";

/// Object store rooted at a local directory. Keys map to relative paths;
/// the "bucket" is the root directory itself.
pub struct FilesystemStore {
    root: PathBuf,
}

impl FilesystemStore {
    pub async fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    /// Resolve a key to a path under the root, rejecting traversal attempts.
    fn key_path(&self, key: &str) -> StorageResult<PathBuf> {
        if key.is_empty() || key.starts_with('/') || key.starts_with('\\') {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        for component in Path::new(key).components() {
            match component {
                std::path::Component::Normal(_) => {}
                _ => return Err(StorageError::InvalidKey(key.to_string())),
            }
        }
        Ok(self.root.join(key))
    }

    async fn ensure_parent(path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    fn map_open_err(key: &str, err: std::io::Error) -> StorageError {
        if err.kind() == std::io::ErrorKind::NotFound {
            StorageError::NotFound(key.to_string())
        } else {
            StorageError::Io(err)
        }
    }
}

#[async_trait]
impl ObjectStore for FilesystemStore {
    async fn bucket_exists(&self) -> StorageResult<bool> {
        Ok(fs::try_exists(&self.root).await?)
    }

    async fn make_bucket(&self) -> StorageResult<()> {
        fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    async fn put_object(&self, key: &str, data: Bytes) -> StorageResult<()> {
        let path = self.key_path(key)?;
        Self::ensure_parent(&path).await?;

        // Stage under a unique name and rename so readers never observe a
        // half-written object.
        let staging = path.with_extension(format!("stage-{}", Uuid::new_v4()));
        {
            let mut file = fs::File::create(&staging).await?;
            file.write_all(&data).await?;
            file.flush().await?;
            file.sync_all().await?;
        }
        fs::rename(&staging, &path).await?;
        Ok(())
    }

    async fn put_object_stream(&self, key: &str) -> StorageResult<Box<dyn StreamingUpload>> {
        let path = self.key_path(key)?;
        Self::ensure_parent(&path).await?;

        let part_path = PathBuf::from(format!("{}{}", path.display(), PART_SUFFIX));
        let file = fs::File::create(&part_path).await?;
        Ok(Box::new(FsStreamingUpload {
            file: Some(file),
            part_path,
            final_path: path,
            written: 0,
        }))
    }

    async fn get_object(&self, key: &str) -> StorageResult<ByteStream> {
        let path = self.key_path(key)?;
        let file = fs::File::open(&path)
            .await
            .map_err(|e| Self::map_open_err(key, e))?;

        let stream = ReaderStream::with_capacity(file, STREAM_CHUNK_SIZE).map_err(StorageError::Io);
        Ok(Box::pin(stream))
    }

    async fn stat_object(&self, key: &str) -> StorageResult<ObjectMeta> {
        let path = self.key_path(key)?;
        let metadata = fs::metadata(&path)
            .await
            .map_err(|e| Self::map_open_err(key, e))?;
        Ok(ObjectMeta {
            size: metadata.len(),
            last_modified: metadata.modified().ok().map(Into::into),
        })
    }

    async fn copy_object(&self, dest: &str, src: &str) -> StorageResult<()> {
        let src_path = self.key_path(src)?;
        let dest_path = self.key_path(dest)?;
        Self::ensure_parent(&dest_path).await?;
        fs::copy(&src_path, &dest_path)
            .await
            .map_err(|e| Self::map_open_err(src, e))?;
        Ok(())
    }

    async fn remove_object(&self, key: &str) -> StorageResult<()> {
        let path = self.key_path(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            // Deletion is idempotent, matching remote object store semantics.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    async fn remove_objects(&self, keys: &[String]) -> StorageResult<()> {
        for key in keys {
            self.remove_object(key).await?;
        }
        Ok(())
    }

    async fn list_objects(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let mut keys = Vec::new();
        let mut stack = vec![self.root.clone()];

        while let Some(dir) = stack.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(StorageError::Io(e)),
            };
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if path.is_dir() {
                    stack.push(path);
                } else if let Ok(rel) = path.strip_prefix(&self.root) {
                    let key = rel
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy())
                        .collect::<Vec<_>>()
                        .join("/");
                    if key.starts_with(prefix) && !key.ends_with(PART_SUFFIX) {
                        keys.push(key);
                    }
                }
            }
        }

        keys.sort();
        Ok(keys)
    }

    fn backend_name(&self) -> &'static str {
        "filesystem"
    }
}

struct FsStreamingUpload {
    file: Option<fs::File>,
    part_path: PathBuf,
    final_path: PathBuf,
    written: u64,
}

#[async_trait]
impl StreamingUpload for FsStreamingUpload {
    async fn write(&mut self, chunk: Bytes) -> StorageResult<()> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| StorageError::Backend("write after finish/abort".to_string()))?;
        file.write_all(&chunk).await?;
        self.written += chunk.len() as u64;
        Ok(())
    }

    async fn finish(mut self: Box<Self>) -> StorageResult<u64> {
        let mut file = self
            .file
            .take()
            .ok_or_else(|| StorageError::Backend("finish after abort".to_string()))?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&self.part_path, &self.final_path).await?;
        Ok(self.written)
    }

    async fn abort(mut self: Box<Self>) -> StorageResult<()> {
        self.file.take();
        match fs::remove_file(&self.part_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io(e)),
        }
    }
}

impl Drop for FsStreamingUpload {
    fn drop(&mut self) {
        // Dropped without finish(): the task driving the upload was cancelled
        // (client disconnect). Discard the staging file so no partial object
        // survives.
        if self.file.take().is_some() {
            let _ = std::fs::remove_file(&self.part_path);
        }
    }
}
