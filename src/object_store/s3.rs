//! S3-compatible object store backend (AWS SDK, MinIO-friendly).

use super::{
    ByteStream, ObjectMeta, ObjectStore, StorageError, StorageResult, StreamingUpload,
    STREAM_CHUNK_SIZE,
};
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::config::Credentials;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream as AwsByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart, Delete, ObjectIdentifier};
use aws_sdk_s3::Client;
use bytes::Bytes;
use futures::TryStreamExt;
use serde::Deserialize;
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

/// S3 requires every part except the last to be at least 5 MiB.
const MIN_PART_SIZE: usize = 5 * 1024 * 1024;

/// Maximum number of keys per DeleteObjects request.
const DELETE_BATCH_SIZE: usize = 1000;

/// Connection settings for an S3-compatible endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct S3Settings {
    /// Custom endpoint URL, e.g. `http://minio:9000`. Omit for AWS.
    pub endpoint_url: Option<String>,
    #[serde(default = "default_region")]
    pub region: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

pub struct S3Store {
    client: Client,
    bucket: String,
}

impl S3Store {
    pub fn new(settings: &S3Settings) -> Self {
        let credentials = Credentials::new(
            settings.access_key.clone(),
            settings.secret_key.clone(),
            None,
            None,
            "phonoteca-config",
        );

        let mut builder = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(settings.region.clone()))
            .credentials_provider(credentials)
            // MinIO and most self-hosted stores only speak path-style.
            .force_path_style(true);
        if let Some(endpoint) = &settings.endpoint_url {
            builder = builder.endpoint_url(endpoint.clone());
        }

        Self {
            client: Client::from_conf(builder.build()),
            bucket: settings.bucket.clone(),
        }
    }

    fn backend_error<E: std::error::Error + 'static>(
        err: aws_sdk_s3::error::SdkError<E>,
    ) -> StorageError {
        StorageError::Backend(format!("{}", DisplayErrorContext(&err)))
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn bucket_exists(&self) -> StorageResult<bool> {
        match self
            .client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(err) => {
                let service_err = err.into_service_error();
                if service_err.is_not_found() {
                    Ok(false)
                } else {
                    Err(StorageError::Backend(format!(
                        "{}",
                        DisplayErrorContext(&service_err)
                    )))
                }
            }
        }
    }

    async fn make_bucket(&self) -> StorageResult<()> {
        match self
            .client
            .create_bucket()
            .bucket(&self.bucket)
            .send()
            .await
        {
            Ok(_) => Ok(()),
            Err(err) => {
                let service_err = err.into_service_error();
                if service_err.is_bucket_already_owned_by_you()
                    || service_err.is_bucket_already_exists()
                {
                    Ok(())
                } else {
                    Err(StorageError::Backend(format!(
                        "{}",
                        DisplayErrorContext(&service_err)
                    )))
                }
            }
        }
    }

    async fn put_object(&self, key: &str, data: Bytes) -> StorageResult<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(AwsByteStream::from(data))
            .send()
            .await
            .map_err(Self::backend_error)?;
        Ok(())
    }

    async fn put_object_stream(&self, key: &str) -> StorageResult<Box<dyn StreamingUpload>> {
        let create = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(Self::backend_error)?;

        let upload_id = create
            .upload_id()
            .ok_or_else(|| StorageError::Backend("multipart upload without id".to_string()))?
            .to_string();

        Ok(Box::new(S3StreamingUpload {
            client: self.client.clone(),
            bucket: self.bucket.clone(),
            key: key.to_string(),
            upload_id,
            buffer: Vec::with_capacity(MIN_PART_SIZE),
            parts: Vec::new(),
            next_part_number: 1,
            written: 0,
            open: true,
        }))
    }

    async fn get_object(&self, key: &str) -> StorageResult<ByteStream> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| {
                let service_err = err.into_service_error();
                if service_err.is_no_such_key() {
                    StorageError::NotFound(key.to_string())
                } else {
                    StorageError::Backend(format!("{}", DisplayErrorContext(&service_err)))
                }
            })?;

        let reader = output.body.into_async_read();
        let stream = ReaderStream::with_capacity(reader, STREAM_CHUNK_SIZE).map_err(StorageError::Io);
        Ok(Box::pin(stream))
    }

    async fn stat_object(&self, key: &str) -> StorageResult<ObjectMeta> {
        let output = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| {
                let service_err = err.into_service_error();
                if service_err.is_not_found() {
                    StorageError::NotFound(key.to_string())
                } else {
                    StorageError::Backend(format!("{}", DisplayErrorContext(&service_err)))
                }
            })?;

        let size = output.content_length().unwrap_or(0).max(0) as u64;
        let last_modified = output
            .last_modified()
            .and_then(|dt| time::OffsetDateTime::from_unix_timestamp(dt.secs()).ok());

        Ok(ObjectMeta {
            size,
            last_modified,
        })
    }

    async fn copy_object(&self, dest: &str, src: &str) -> StorageResult<()> {
        // Keys are hash-derived and URL-safe by construction, so the copy
        // source needs no percent-encoding.
        self.client
            .copy_object()
            .bucket(&self.bucket)
            .key(dest)
            .copy_source(format!("{}/{}", self.bucket, src))
            .send()
            .await
            .map_err(Self::backend_error)?;
        Ok(())
    }

    async fn remove_object(&self, key: &str) -> StorageResult<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(Self::backend_error)?;
        Ok(())
    }

    async fn remove_objects(&self, keys: &[String]) -> StorageResult<()> {
        for batch in keys.chunks(DELETE_BATCH_SIZE) {
            let mut identifiers = Vec::with_capacity(batch.len());
            for key in batch {
                let id = ObjectIdentifier::builder()
                    .key(key)
                    .build()
                    .map_err(|e| StorageError::Backend(e.to_string()))?;
                identifiers.push(id);
            }
            let delete = Delete::builder()
                .set_objects(Some(identifiers))
                .build()
                .map_err(|e| StorageError::Backend(e.to_string()))?;

            self.client
                .delete_objects()
                .bucket(&self.bucket)
                .delete(delete)
                .send()
                .await
                .map_err(Self::backend_error)?;
        }
        Ok(())
    }

    async fn list_objects(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix);
            if let Some(token) = &continuation {
                request = request.continuation_token(token.clone());
            }

            let output = request.send().await.map_err(Self::backend_error)?;
            for object in output.contents() {
                if let Some(key) = object.key() {
                    keys.push(key.to_string());
                }
            }

            match output.next_continuation_token() {
                Some(token) => continuation = Some(token.to_string()),
                None => break,
            }
        }

        Ok(keys)
    }

    fn backend_name(&self) -> &'static str {
        "s3"
    }
}

struct S3StreamingUpload {
    client: Client,
    bucket: String,
    key: String,
    upload_id: String,
    buffer: Vec<u8>,
    parts: Vec<CompletedPart>,
    next_part_number: i32,
    written: u64,
    open: bool,
}

impl S3StreamingUpload {
    async fn flush_part(&mut self) -> StorageResult<()> {
        let body = std::mem::take(&mut self.buffer);
        let part_number = self.next_part_number;
        self.next_part_number += 1;

        let response = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(&self.key)
            .upload_id(&self.upload_id)
            .part_number(part_number)
            .body(AwsByteStream::from(body))
            .send()
            .await
            .map_err(S3Store::backend_error)?;

        self.parts.push(
            CompletedPart::builder()
                .part_number(part_number)
                .e_tag(response.e_tag().unwrap_or_default())
                .build(),
        );
        Ok(())
    }
}

#[async_trait]
impl StreamingUpload for S3StreamingUpload {
    async fn write(&mut self, chunk: Bytes) -> StorageResult<()> {
        self.written += chunk.len() as u64;
        self.buffer.extend_from_slice(&chunk);
        if self.buffer.len() >= MIN_PART_SIZE {
            self.flush_part().await?;
        }
        Ok(())
    }

    async fn finish(mut self: Box<Self>) -> StorageResult<u64> {
        // The final part may be under the part-size minimum, and a zero-byte
        // object still needs one (empty) part to complete the upload.
        if !self.buffer.is_empty() || self.parts.is_empty() {
            self.flush_part().await?;
        }

        let completed = CompletedMultipartUpload::builder()
            .set_parts(Some(std::mem::take(&mut self.parts)))
            .build();

        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(&self.key)
            .upload_id(&self.upload_id)
            .multipart_upload(completed)
            .send()
            .await
            .map_err(S3Store::backend_error)?;

        self.open = false;
        Ok(self.written)
    }

    async fn abort(mut self: Box<Self>) -> StorageResult<()> {
        self.open = false;
        self.client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(&self.key)
            .upload_id(&self.upload_id)
            .send()
            .await
            .map_err(S3Store::backend_error)?;
        debug!("Aborted multipart upload for {}", self.key);
        Ok(())
    }
}

impl Drop for S3StreamingUpload {
    fn drop(&mut self) {
        if !self.open {
            return;
        }
        // Cancelled mid-upload: abort in the background so the store can
        // reclaim the parts. Losing the race here only leaves an incomplete
        // multipart upload, never a readable object.
        let client = self.client.clone();
        let bucket = self.bucket.clone();
        let key = self.key.clone();
        let upload_id = self.upload_id.clone();
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                if let Err(err) = client
                    .abort_multipart_upload()
                    .bucket(&bucket)
                    .key(&key)
                    .upload_id(&upload_id)
                    .send()
                    .await
                {
                    warn!(
                        "Failed to abort dangling multipart upload for {}: {}",
                        key,
                        DisplayErrorContext(&err)
                    );
                }
            });
        }
    }
}
