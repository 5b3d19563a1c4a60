use std::time::Duration;

use async_trait::async_trait;
use http::HeaderMap;
use http::header::{CONTENT_LENGTH, CONTENT_TYPE, HeaderValue};
use s3::bucket::Bucket;
use s3::creds::Credentials;
use s3::error::S3Error;
use s3::region::Region;
use tokio::io::AsyncReadExt;

use super::error::StorageError;
use super::key::ObjectKey;
use super::traits::{BoxReader, ObjectMeta, ObjectStore};

/// Connection settings for an S3-compatible bucket.
#[derive(Debug, Clone)]
pub struct S3Options {
    pub bucket: String,
    pub region: String,
    /// Custom endpoint for MinIO, R2 and friends. `None` means AWS.
    pub endpoint: Option<String>,
    pub access_key: String,
    pub secret_key: String,
    pub path_style: bool,
}

/// Object store backed by an S3-compatible bucket.
pub struct S3ObjectStore {
    bucket: Box<Bucket>,
}

impl S3ObjectStore {
    pub fn new(options: &S3Options) -> Result<Self, StorageError> {
        let region = match &options.endpoint {
            Some(endpoint) => Region::Custom {
                region: options.region.clone(),
                endpoint: endpoint.clone(),
            },
            None => options
                .region
                .parse::<Region>()
                .map_err(|e| StorageError::Backend(format!("invalid region: {e}")))?,
        };

        let credentials = Credentials::new(
            Some(options.access_key.as_str()),
            Some(options.secret_key.as_str()),
            None,
            None,
            None,
        )
        .map_err(|e| StorageError::Backend(format!("invalid credentials: {e}")))?;

        let mut bucket = Bucket::new(&options.bucket, region, credentials)
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        if options.path_style {
            bucket = bucket.with_path_style();
        }

        Ok(Self { bucket })
    }
}

fn expiry_secs(ttl: Duration) -> u32 {
    u32::try_from(ttl.as_secs()).unwrap_or(u32::MAX)
}

fn is_success(code: u16) -> bool {
    (200..300).contains(&code)
}

/// Map a rust-s3 error, treating HTTP 404 as a missing object.
fn map_s3_error(key: &ObjectKey, err: S3Error) -> StorageError {
    match err {
        S3Error::HttpFailWithBody(404, _) => StorageError::NotFound(key.to_string()),
        other => StorageError::Backend(other.to_string()),
    }
}

/// Map a non-2xx status code from a request that did not error at the transport level.
fn status_error(key: &ObjectKey, op: &str, code: u16) -> StorageError {
    if code == 404 {
        StorageError::NotFound(key.to_string())
    } else {
        StorageError::Backend(format!("{op} returned HTTP {code}"))
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn presign_put(
        &self,
        key: &ObjectKey,
        content_type: &str,
        max_bytes: u64,
        ttl: Duration,
    ) -> Result<String, StorageError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_str(content_type)
                .map_err(|e| StorageError::Presign(format!("bad content type: {e}")))?,
        );
        headers.insert(CONTENT_LENGTH, HeaderValue::from(max_bytes));

        self.bucket
            .presign_put(key.as_str(), expiry_secs(ttl), Some(headers), None)
            .await
            .map_err(|e| StorageError::Presign(e.to_string()))
    }

    async fn presign_get(&self, key: &ObjectKey, ttl: Duration) -> Result<String, StorageError> {
        self.bucket
            .presign_get(key.as_str(), expiry_secs(ttl), None)
            .await
            .map_err(|e| StorageError::Presign(e.to_string()))
    }

    async fn head(&self, key: &ObjectKey) -> Result<ObjectMeta, StorageError> {
        let (result, code) = self
            .bucket
            .head_object(key.as_str())
            .await
            .map_err(|e| map_s3_error(key, e))?;
        if !is_success(code) {
            return Err(status_error(key, "HEAD", code));
        }

        Ok(ObjectMeta {
            size: result
                .content_length
                .and_then(|len| u64::try_from(len).ok())
                .unwrap_or(0),
            content_type: result.content_type,
        })
    }

    async fn put(
        &self,
        key: &ObjectKey,
        data: &[u8],
        content_type: &str,
    ) -> Result<(), StorageError> {
        let response = self
            .bucket
            .put_object_with_content_type(key.as_str(), data, content_type)
            .await
            .map_err(|e| map_s3_error(key, e))?;
        let code = response.status_code();
        if !is_success(code) {
            return Err(status_error(key, "PUT", code));
        }
        Ok(())
    }

    async fn put_stream(
        &self,
        key: &ObjectKey,
        mut reader: BoxReader,
        content_type: &str,
    ) -> Result<(), StorageError> {
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await?;
        self.put(key, &buf, content_type).await
    }

    async fn get(&self, key: &ObjectKey) -> Result<Vec<u8>, StorageError> {
        let response = self
            .bucket
            .get_object(key.as_str())
            .await
            .map_err(|e| map_s3_error(key, e))?;
        let code = response.status_code();
        if !is_success(code) {
            return Err(status_error(key, "GET", code));
        }
        Ok(response.bytes().to_vec())
    }

    async fn get_stream(&self, key: &ObjectKey) -> Result<BoxReader, StorageError> {
        let data = self.get(key).await?;
        Ok(Box::new(std::io::Cursor::new(data)))
    }

    /// S3 does not report whether the key existed, so a successful call
    /// always returns `true`.
    async fn delete(&self, key: &ObjectKey) -> Result<bool, StorageError> {
        match self.bucket.delete_object(key.as_str()).await {
            Ok(response) if is_success(response.status_code()) => Ok(true),
            Ok(response) if response.status_code() == 404 => Ok(false),
            Ok(response) => Err(status_error(key, "DELETE", response.status_code())),
            Err(S3Error::HttpFailWithBody(404, _)) => Ok(false),
            Err(e) => Err(StorageError::Backend(e.to_string())),
        }
    }
}
