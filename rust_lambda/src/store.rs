use aws_sdk_s3::Client as S3Client;
use aws_sdk_s3::error::DisplayErrorContext;
use std::future::Future;
use std::path::Path;
use thiserror::Error;
use tokio::io::AsyncWriteExt;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to list objects in {bucket}: {message}")]
    List { bucket: String, message: String },
    #[error("failed to read metadata of {bucket}/{key}: {message}")]
    Head {
        bucket: String,
        key: String,
        message: String,
    },
    #[error("failed to download {bucket}/{key}: {message}")]
    Download {
        bucket: String,
        key: String,
        message: String,
    },
    #[error("failed to write download to disk: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedObject {
    pub key: String,
    pub size: Option<u64>,
}

/// One page of a bucket listing. `next` is `None` on the last page.
#[derive(Debug, Default)]
pub struct ListPage {
    pub objects: Vec<ListedObject>,
    pub next: Option<String>,
}

/// Where a listing starts or continues from.
#[derive(Debug, Clone, Default)]
pub struct ListCursor<'a> {
    pub prefix: Option<&'a str>,
    pub start_after: Option<&'a str>,
    pub continuation: Option<String>,
}

/// The object storage calls a scan needs.
pub trait ObjectStore {
    fn list_page(
        &self,
        bucket: &str,
        cursor: &ListCursor<'_>,
    ) -> impl Future<Output = Result<ListPage, StoreError>> + Send;

    fn object_size(
        &self,
        bucket: &str,
        key: &str,
    ) -> impl Future<Output = Result<u64, StoreError>> + Send;

    /// Streams the object body into `dest`, returning the number of bytes written.
    fn download(
        &self,
        bucket: &str,
        key: &str,
        dest: &Path,
    ) -> impl Future<Output = Result<u64, StoreError>> + Send;
}

impl ObjectStore for S3Client {
    async fn list_page(
        &self,
        bucket: &str,
        cursor: &ListCursor<'_>,
    ) -> Result<ListPage, StoreError> {
        let resp = self
            .list_objects_v2()
            .bucket(bucket)
            .set_prefix(cursor.prefix.map(str::to_owned))
            .set_start_after(cursor.start_after.map(str::to_owned))
            .set_continuation_token(cursor.continuation.clone())
            .send()
            .await
            .map_err(|e| StoreError::List {
                bucket: bucket.to_owned(),
                message: DisplayErrorContext(e).to_string(),
            })?;

        let objects = resp
            .contents()
            .iter()
            .filter_map(|object| {
                object.key().map(|key| ListedObject {
                    key: key.to_owned(),
                    size: object.size().and_then(|size| u64::try_from(size).ok()),
                })
            })
            .collect();

        let next = match resp.is_truncated() {
            Some(true) => resp.next_continuation_token().map(str::to_owned),
            _ => None,
        };

        Ok(ListPage { objects, next })
    }

    async fn object_size(&self, bucket: &str, key: &str) -> Result<u64, StoreError> {
        let head_error = |message: String| StoreError::Head {
            bucket: bucket.to_owned(),
            key: key.to_owned(),
            message,
        };
        let resp = self
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| head_error(DisplayErrorContext(e).to_string()))?;

        resp.content_length()
            .and_then(|size| u64::try_from(size).ok())
            .ok_or_else(|| head_error("response carried no content length".to_owned()))
    }

    async fn download(&self, bucket: &str, key: &str, dest: &Path) -> Result<u64, StoreError> {
        let download_error = |message: String| StoreError::Download {
            bucket: bucket.to_owned(),
            key: key.to_owned(),
            message,
        };
        let resp = self
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| download_error(DisplayErrorContext(e).to_string()))?;

        let mut body = resp.body;
        let mut file = tokio::fs::File::create(dest).await?;
        let mut written = 0u64;
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| download_error(e.to_string()))?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        Ok(written)
    }
}
