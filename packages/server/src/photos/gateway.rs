use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use common::storage::{ObjectKey, ObjectMeta, ObjectStore, StorageError};

/// Deadline-bounded access to the configured object store.
///
/// Every call is wrapped in `tokio::time::timeout`; an elapsed deadline
/// surfaces as `StorageError::Timeout`.
#[derive(Clone)]
pub struct BlobGateway {
    store: Arc<dyn ObjectStore>,
    timeout: Duration,
}

impl BlobGateway {
    pub fn new(store: Arc<dyn ObjectStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    async fn bounded<T, F>(&self, op: &'static str, fut: F) -> Result<T, StorageError>
    where
        F: Future<Output = Result<T, StorageError>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(StorageError::Timeout(op)),
        }
    }

    pub async fn presign_upload(
        &self,
        key: &ObjectKey,
        content_type: &str,
        max_bytes: u64,
        ttl: Duration,
    ) -> Result<String, StorageError> {
        self.bounded(
            "presign_put",
            self.store.presign_put(key, content_type, max_bytes, ttl),
        )
        .await
    }

    pub async fn presign_read(
        &self,
        key: &ObjectKey,
        ttl: Duration,
    ) -> Result<String, StorageError> {
        self.bounded("presign_get", self.store.presign_get(key, ttl)).await
    }

    pub async fn head(&self, key: &ObjectKey) -> Result<ObjectMeta, StorageError> {
        self.bounded("head", self.store.head(key)).await
    }

    pub async fn get(&self, key: &ObjectKey) -> Result<Vec<u8>, StorageError> {
        self.bounded("get", self.store.get(key)).await
    }

    pub async fn put(
        &self,
        key: &ObjectKey,
        data: &[u8],
        content_type: &str,
    ) -> Result<(), StorageError> {
        self.bounded("put", self.store.put(key, data, content_type)).await
    }

    /// Delete an object. A missing object counts as deleted.
    pub async fn delete(&self, key: &ObjectKey) -> Result<(), StorageError> {
        self.bounded("delete", self.store.delete(key)).await?;
        Ok(())
    }
}
