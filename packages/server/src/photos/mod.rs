//! Photo ingestion pipeline.
//!
//! Clients obtain a presigned upload URL (`begin_upload`), PUT the bytes
//! straight to the object store, then call `confirm_upload`, which verifies
//! the object, derives a WebP thumbnail and flips the record to `confirmed`.
//! Reads go through short-lived presigned GET URLs.

pub mod association;
pub mod deletion;
pub mod gateway;
pub mod keys;
pub mod records;
pub mod session;
pub mod thumbnail;
pub mod urls;

use std::time::Duration;

use sea_orm::DatabaseConnection;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::entity::photo;
use crate::error::AppError;
use association::TargetRef;
use gateway::BlobGateway;
use records::PhotoRecords;
use thumbnail::ThumbnailSpec;

pub use deletion::DeleteOutcome;
pub use session::{BeginUpload, UploadTicket};
pub use urls::{PhotoSize, ReadTarget};

/// MIME types accepted for upload.
pub const ALLOWED_MIME_TYPES: &[&str] = &["image/jpeg", "image/png", "image/webp", "image/heic"];

/// Limits and TTLs applied by the pipeline.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub max_upload_bytes: u64,
    pub thumbnail: ThumbnailSpec,
    pub max_batch: usize,
    pub upload_url_ttl: Duration,
    pub read_url_ttl: Duration,
}

impl PipelineSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            max_upload_bytes: config.photos.max_upload_bytes,
            thumbnail: ThumbnailSpec {
                max_dimension: config.photos.thumbnail_max_dimension,
            },
            max_batch: config.photos.max_batch,
            upload_url_ttl: config.storage.upload_url_ttl(),
            read_url_ttl: config.storage.read_url_ttl(),
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            max_upload_bytes: 10 * 1024 * 1024,
            thumbnail: ThumbnailSpec::default(),
            max_batch: 100,
            upload_url_ttl: Duration::from_secs(600),
            read_url_ttl: Duration::from_secs(3600),
        }
    }
}

/// The pipeline's collaborators, built once at startup and shared.
#[derive(Clone)]
pub struct PhotoPipeline {
    pub db: DatabaseConnection,
    pub blobs: BlobGateway,
    pub settings: PipelineSettings,
}

impl PhotoPipeline {
    pub fn new(db: DatabaseConnection, blobs: BlobGateway, settings: PipelineSettings) -> Self {
        Self {
            db,
            blobs,
            settings,
        }
    }

    /// Owner-scoped record lookup. Missing and foreign photos are both `NotFound`.
    pub async fn photo(&self, owner_id: i32, photo_id: Uuid) -> Result<photo::Model, AppError> {
        PhotoRecords::new(&self.db)
            .find_owned(owner_id, photo_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Photo not found".into()))
    }

    /// Attach a photo to a plant or check-in.
    pub async fn associate(
        &self,
        owner_id: i32,
        photo_id: Uuid,
        target: TargetRef,
    ) -> Result<(), AppError> {
        association::associate(&self.db, owner_id, photo_id, target).await
    }
}
