use chrono::{DateTime, Utc};
use common::storage::{ObjectKey, StorageError};
use sea_orm::SqlErr;
use tokio::task::JoinError;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::association::{self, TargetRef};
use super::keys;
use super::records::{Derived, NewPhoto, PhotoRecords};
use super::thumbnail::{THUMBNAIL_CONTENT_TYPE, ThumbnailError, generate_thumbnail};
use super::{ALLOWED_MIME_TYPES, PhotoPipeline, PipelineSettings};
use crate::entity::photo;
use crate::error::AppError;

const MAX_FILE_NAME_CHARS: usize = 255;

/// Validated input of `begin_upload`.
#[derive(Debug, Clone)]
pub struct BeginUpload {
    pub file_name: String,
    pub file_type: String,
    pub file_size: u64,
    pub target: Option<TargetRef>,
    pub taken_at: Option<DateTime<Utc>>,
}

impl BeginUpload {
    pub fn validate(&self, settings: &PipelineSettings) -> Result<(), AppError> {
        let name = self.file_name.trim();
        if name.is_empty() || name.chars().count() > MAX_FILE_NAME_CHARS {
            return Err(AppError::Validation(format!(
                "file_name must be 1-{MAX_FILE_NAME_CHARS} characters"
            )));
        }
        if !ALLOWED_MIME_TYPES.contains(&self.file_type.as_str()) {
            return Err(AppError::Validation(format!(
                "file_type must be one of: {}",
                ALLOWED_MIME_TYPES.join(", ")
            )));
        }
        if self.file_size == 0 || self.file_size > settings.max_upload_bytes {
            return Err(AppError::Validation(format!(
                "file_size must be between 1 and {} bytes",
                settings.max_upload_bytes
            )));
        }
        Ok(())
    }
}

/// Result of `begin_upload`: where and how the client uploads the bytes.
#[derive(Debug, Clone)]
pub struct UploadTicket {
    pub photo_id: Uuid,
    pub upload_url: String,
    pub object_key: ObjectKey,
}

/// Why a thumbnail could not be derived. Never surfaced from `confirm_upload`.
#[derive(Debug, thiserror::Error)]
pub enum DerivationError {
    #[error("fetching original failed: {0}")]
    Fetch(#[source] StorageError),
    #[error(transparent)]
    Generate(#[from] ThumbnailError),
    #[error("thumbnail task aborted: {0}")]
    Join(#[from] JoinError),
    #[error("invalid thumbnail key: {0}")]
    Key(#[source] StorageError),
    #[error("uploading thumbnail failed: {0}")]
    Upload(#[source] StorageError),
}

fn stored_key(raw: &str) -> Result<ObjectKey, AppError> {
    ObjectKey::parse(raw).map_err(|e| AppError::Internal(format!("stored object key: {e}")))
}

impl PhotoPipeline {
    /// Create a `pending` record and issue a presigned PUT URL for it.
    #[instrument(
        skip(self, request),
        fields(file_type = %request.file_type, file_size = request.file_size)
    )]
    pub async fn begin_upload(
        &self,
        owner_id: i32,
        request: BeginUpload,
    ) -> Result<UploadTicket, AppError> {
        request.validate(&self.settings)?;

        if let Some(target) = request.target {
            association::ensure_target_owned(&self.db, owner_id, target).await?;
        }

        let original_key = keys::allocate(owner_id, request.file_name.trim(), Utc::now())
            .map_err(|e| AppError::Internal(format!("key allocation: {e}")))?;
        let size_bytes = i64::try_from(request.file_size)
            .map_err(|_| AppError::Validation("file_size is too large".into()))?;

        let record = PhotoRecords::new(&self.db)
            .insert(NewPhoto {
                owner_id,
                original_key: original_key.clone(),
                mime_type: request.file_type.clone(),
                size_bytes,
                taken_at: request.taken_at.unwrap_or_else(Utc::now),
                target: request.target,
            })
            .await
            .map_err(|e| match e.sql_err() {
                Some(SqlErr::UniqueConstraintViolation(_)) => {
                    AppError::Conflict("Object key already allocated, please retry".into())
                }
                _ => AppError::from(e),
            })?;

        // The pending record outlives a signing failure; the client starts over.
        let upload_url = self
            .blobs
            .presign_upload(
                &original_key,
                &request.file_type,
                request.file_size,
                self.settings.upload_url_ttl,
            )
            .await
            .map_err(|e| AppError::PresignFailed(e.to_string()))?;

        info!(photo_id = %record.id, key = %original_key, "Upload session started");
        Ok(UploadTicket {
            photo_id: record.id,
            upload_url,
            object_key: original_key,
        })
    }

    /// Verify the uploaded object, derive a thumbnail and mark the record
    /// `confirmed`. Idempotent: a confirmed record is returned as stored
    /// without touching the object store.
    #[instrument(skip(self))]
    pub async fn confirm_upload(
        &self,
        owner_id: i32,
        photo_id: Uuid,
    ) -> Result<photo::Model, AppError> {
        let records = PhotoRecords::new(&self.db);
        let record = self.photo(owner_id, photo_id).await?;
        if record.status.is_confirmed() {
            debug!("Already confirmed");
            return Ok(record);
        }

        let original = stored_key(&record.object_key_original)?;
        match self.blobs.head(&original).await {
            Ok(meta) => debug!(size = meta.size, "Uploaded object present"),
            Err(e) if e.is_not_found() => {
                return Err(AppError::PreconditionFailed(
                    "Uploaded object not found in store".into(),
                ));
            }
            Err(e) => return Err(AppError::StoreUnavailable(e.to_string())),
        }

        let derived = match self.derive_thumbnail(&original).await {
            Ok(derived) => Some(derived),
            Err(e) => {
                warn!(%photo_id, error = %e, "Thumbnail generation failed, confirming without it");
                None
            }
        };

        let transitioned = records.mark_confirmed(photo_id, derived.as_ref()).await?;
        let current = self.photo(owner_id, photo_id).await?;
        if !transitioned {
            debug!("Concurrent confirm won, returning stored state");
            return Ok(current);
        }

        info!(%photo_id, has_thumbnail = derived.is_some(), "Photo confirmed");

        if let Some(target) = TargetRef::of(&current) {
            match association::associate(&self.db, owner_id, photo_id, target).await {
                Ok(()) => {}
                Err(AppError::NotFound(msg)) => {
                    warn!(%photo_id, ?target, "Skipping association: {msg}");
                }
                Err(e) => return Err(e),
            }
            return self.photo(owner_id, photo_id).await;
        }

        Ok(current)
    }

    /// Retry thumbnail derivation for a confirmed photo that has none.
    #[instrument(skip(self))]
    pub async fn regenerate_thumbnail(
        &self,
        owner_id: i32,
        photo_id: Uuid,
    ) -> Result<photo::Model, AppError> {
        let record = self.photo(owner_id, photo_id).await?;
        if !record.status.is_confirmed() {
            return Err(AppError::PreconditionFailed(
                "Photo upload has not been confirmed".into(),
            ));
        }
        if record.object_key_thumb.is_some() {
            return Ok(record);
        }

        let original = stored_key(&record.object_key_original)?;
        let derived = self.derive_thumbnail(&original).await.map_err(|e| {
            warn!(%photo_id, error = %e, "Thumbnail regeneration failed");
            AppError::ThumbnailUnavailable
        })?;

        if PhotoRecords::new(&self.db)
            .attach_thumbnail(photo_id, &derived)
            .await?
        {
            info!(%photo_id, "Thumbnail regenerated");
        }
        self.photo(owner_id, photo_id).await
    }

    /// Fetch the original, generate the thumbnail off the async runtime and
    /// store it next to the original.
    async fn derive_thumbnail(&self, original: &ObjectKey) -> Result<Derived, DerivationError> {
        let bytes = self
            .blobs
            .get(original)
            .await
            .map_err(DerivationError::Fetch)?;

        let spec = self.settings.thumbnail;
        let thumb =
            tokio::task::spawn_blocking(move || generate_thumbnail(&bytes, &spec)).await??;

        let thumb_key = keys::thumb_key_for(original).map_err(DerivationError::Key)?;
        self.blobs
            .put(&thumb_key, &thumb.bytes, THUMBNAIL_CONTENT_TYPE)
            .await
            .map_err(DerivationError::Upload)?;

        Ok(Derived {
            width: i32::try_from(thumb.width).unwrap_or(i32::MAX),
            height: i32::try_from(thumb.height).unwrap_or(i32::MAX),
            thumb_key,
        })
    }
}
