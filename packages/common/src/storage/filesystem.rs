use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};

use super::error::StorageError;
use super::key::ObjectKey;
use super::signer::{SignedMethod, UrlSigner};
use super::traits::{BoxReader, ObjectMeta, ObjectStore};

/// Filesystem-backed object store.
///
/// Objects live at `{base_path}/{key}`. Writes go through a temp file under
/// `{base_path}/.tmp` and are renamed into place, so readers never observe a
/// partially written object. Presigned URLs point at this server's `/blobs`
/// routes and are signed with the store's `UrlSigner`.
pub struct FilesystemObjectStore {
    base_path: PathBuf,
    max_size: u64,
    signer: UrlSigner,
}

impl FilesystemObjectStore {
    /// Create a new filesystem object store.
    pub async fn new(
        base_path: PathBuf,
        max_size: u64,
        signer: UrlSigner,
    ) -> Result<Self, StorageError> {
        fs::create_dir_all(&base_path).await?;
        fs::create_dir_all(base_path.join(".tmp")).await?;
        Ok(Self {
            base_path,
            max_size,
            signer,
        })
    }

    /// The signer used for presigned URLs; needed to verify incoming requests.
    pub fn signer(&self) -> &UrlSigner {
        &self.signer
    }

    /// Store data from `reader` under `key`, rejecting it once more than
    /// `limit` bytes arrive. The store's own size limit still applies.
    ///
    /// An over-limit body never reaches `key`: whatever object was stored
    /// there before is left untouched.
    pub async fn put_stream_limited(
        &self,
        key: &ObjectKey,
        mut reader: BoxReader,
        limit: u64,
    ) -> Result<(), StorageError> {
        let limit = limit.min(self.max_size);
        let temp_path = self.temp_path();
        let mut total_bytes: u64 = 0;

        let mut buf = vec![0u8; 64 * 1024]; // 64KB read buffer
        let mut temp_file = fs::File::create(&temp_path).await?;

        loop {
            let n = match reader.read(&mut buf).await {
                Ok(n) => n,
                Err(e) => {
                    drop(temp_file);
                    let _ = fs::remove_file(&temp_path).await;
                    return Err(e.into());
                }
            };
            if n == 0 {
                break;
            }

            total_bytes += n as u64;
            if total_bytes > limit {
                drop(temp_file);
                let _ = fs::remove_file(&temp_path).await;
                return Err(StorageError::SizeLimitExceeded {
                    actual: total_bytes,
                    limit,
                });
            }

            temp_file.write_all(&buf[..n]).await?;
        }

        temp_file.flush().await?;
        drop(temp_file);

        let object_path = self.object_path(key);
        if let Some(parent) = object_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        if let Err(e) = fs::rename(&temp_path, &object_path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        Ok(())
    }

    /// Compute the filesystem path for a given key.
    fn object_path(&self, key: &ObjectKey) -> PathBuf {
        key.segments()
            .fold(self.base_path.clone(), |path, segment| path.join(segment))
    }

    /// Path for a temporary file during writes.
    fn temp_path(&self) -> PathBuf {
        self.base_path
            .join(".tmp")
            .join(uuid::Uuid::new_v4().to_string())
    }
}

#[async_trait]
impl ObjectStore for FilesystemObjectStore {
    async fn presign_put(
        &self,
        key: &ObjectKey,
        content_type: &str,
        max_bytes: u64,
        ttl: Duration,
    ) -> Result<String, StorageError> {
        Ok(self.signer.presign(
            SignedMethod::Put,
            key,
            Some(content_type),
            Some(max_bytes),
            ttl,
        ))
    }

    async fn presign_get(&self, key: &ObjectKey, ttl: Duration) -> Result<String, StorageError> {
        Ok(self.signer.presign(SignedMethod::Get, key, None, None, ttl))
    }

    async fn head(&self, key: &ObjectKey) -> Result<ObjectMeta, StorageError> {
        match fs::metadata(self.object_path(key)).await {
            Ok(meta) if meta.is_file() => Ok(ObjectMeta {
                size: meta.len(),
                content_type: mime_guess::from_path(key.file_name())
                    .first()
                    .map(|m| m.to_string()),
            }),
            Ok(_) => Err(StorageError::NotFound(key.to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn put_stream(
        &self,
        key: &ObjectKey,
        reader: BoxReader,
        _content_type: &str,
    ) -> Result<(), StorageError> {
        self.put_stream_limited(key, reader, self.max_size).await
    }

    async fn get_stream(&self, key: &ObjectKey) -> Result<BoxReader, StorageError> {
        match fs::File::open(self.object_path(key)).await {
            Ok(file) => Ok(Box::new(BufReader::new(file))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, key: &ObjectKey) -> Result<bool, StorageError> {
        match fs::remove_file(self.object_path(key)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
