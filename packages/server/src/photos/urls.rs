use std::collections::{BTreeSet, HashMap};

use common::storage::{ObjectKey, StorageError};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};
use uuid::Uuid;

use super::PhotoPipeline;
use super::records::PhotoRecords;
use crate::entity::photo;
use crate::error::AppError;

/// Which rendition a read URL should point at.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum PhotoSize {
    /// The thumbnail when one exists, otherwise the original.
    #[default]
    Thumb,
    Original,
}

/// The readable objects of one photo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadTarget {
    Original { original: ObjectKey },
    WithThumb { original: ObjectKey, thumb: ObjectKey },
}

impl ReadTarget {
    pub fn from_record(record: &photo::Model) -> Result<Self, StorageError> {
        let original = ObjectKey::parse(record.object_key_original.as_str())?;
        Ok(match &record.object_key_thumb {
            Some(thumb) => Self::WithThumb {
                original,
                thumb: ObjectKey::parse(thumb.as_str())?,
            },
            None => Self::Original { original },
        })
    }

    /// Key to serve for `size`. Falls back to the original when no thumbnail exists.
    pub fn key_for(&self, size: PhotoSize) -> &ObjectKey {
        match (self, size) {
            (Self::WithThumb { thumb, .. }, PhotoSize::Thumb) => thumb,
            (Self::WithThumb { original, .. }, PhotoSize::Original) => original,
            (Self::Original { original }, _) => original,
        }
    }
}

impl PhotoPipeline {
    /// Presigned GET URLs for the caller's photos among `photo_ids`.
    ///
    /// Unknown and foreign ids are omitted, as are ids whose URL could not be
    /// issued. Duplicate ids collapse.
    #[instrument(skip(self, photo_ids), fields(count = photo_ids.len()))]
    pub async fn resolve_read_urls(
        &self,
        owner_id: i32,
        photo_ids: &[Uuid],
        size: PhotoSize,
    ) -> Result<HashMap<Uuid, String>, AppError> {
        if photo_ids.is_empty() || photo_ids.len() > self.settings.max_batch {
            return Err(AppError::Validation(format!(
                "photo_ids must contain 1-{} ids",
                self.settings.max_batch
            )));
        }
        let unique: Vec<Uuid> = photo_ids
            .iter()
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let records = PhotoRecords::new(&self.db)
            .find_many_owned(owner_id, &unique)
            .await?;

        let ttl = self.settings.read_url_ttl;
        let presigns = records.iter().map(|record| async move {
            let target = ReadTarget::from_record(record)?;
            let url = self.blobs.presign_read(target.key_for(size), ttl).await?;
            Ok::<_, StorageError>((record.id, url))
        });

        let mut urls = HashMap::with_capacity(records.len());
        for (record, result) in records.iter().zip(join_all(presigns).await) {
            match result {
                Ok((id, url)) => {
                    urls.insert(id, url);
                }
                Err(e) => warn!(photo_id = %record.id, error = %e, "Dropping read URL"),
            }
        }
        Ok(urls)
    }

    /// Presigned GET URL for a single photo.
    #[instrument(skip(self))]
    pub async fn resolve_read_url(
        &self,
        owner_id: i32,
        photo_id: Uuid,
        size: PhotoSize,
    ) -> Result<String, AppError> {
        let record = self.photo(owner_id, photo_id).await?;
        let target = ReadTarget::from_record(&record)
            .map_err(|e| AppError::Internal(format!("stored object key: {e}")))?;
        self.blobs
            .presign_read(target.key_for(size), self.settings.read_url_ttl)
            .await
            .map_err(|e| AppError::PresignFailed(e.to_string()))
    }
}
