use std::io::Cursor;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};

use super::error::StorageError;
use super::key::ObjectKey;

/// Type alias for a boxed async reader.
pub type BoxReader = Box<dyn AsyncRead + Unpin + Send>;

/// Metadata returned by a `head` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMeta {
    pub size: u64,
    pub content_type: Option<String>,
}

/// Key-addressed object storage with presigned URL issuance.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Issue a time-limited URL that lets a client PUT one object directly.
    async fn presign_put(
        &self,
        key: &ObjectKey,
        content_type: &str,
        max_bytes: u64,
        ttl: Duration,
    ) -> Result<String, StorageError>;

    /// Issue a time-limited URL that lets a client GET one object directly.
    async fn presign_get(&self, key: &ObjectKey, ttl: Duration) -> Result<String, StorageError>;

    /// Fetch object metadata. Fails with `StorageError::NotFound` if absent.
    async fn head(&self, key: &ObjectKey) -> Result<ObjectMeta, StorageError>;

    /// Store bytes under `key`, replacing any existing object.
    async fn put(
        &self,
        key: &ObjectKey,
        data: &[u8],
        content_type: &str,
    ) -> Result<(), StorageError> {
        let reader: BoxReader = Box::new(Cursor::new(data.to_vec()));
        self.put_stream(key, reader, content_type).await
    }

    /// Store data from an async reader under `key`.
    async fn put_stream(
        &self,
        key: &ObjectKey,
        reader: BoxReader,
        content_type: &str,
    ) -> Result<(), StorageError>;

    /// Retrieve all bytes of an object.
    async fn get(&self, key: &ObjectKey) -> Result<Vec<u8>, StorageError> {
        let mut reader = self.get_stream(key).await?;
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await?;
        Ok(buf)
    }

    /// Retrieve an object as a streaming async reader.
    async fn get_stream(&self, key: &ObjectKey) -> Result<BoxReader, StorageError>;

    /// Delete an object.
    ///
    /// Returns `true` if the object was deleted, `false` if it did not exist.
    async fn delete(&self, key: &ObjectKey) -> Result<bool, StorageError>;
}
