use common::storage::ObjectKey;
use futures::future::join_all;
use sea_orm::TransactionTrait;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::PhotoPipeline;
use super::keys::thumb_key_for;
use super::records::PhotoRecords;
use crate::error::AppError;

/// How completely a photo was removed. The record is gone in both cases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    Complete,
    /// Some blobs could not be removed and are now orphaned in the store.
    Partial { orphaned_keys: Vec<String> },
}

impl PhotoPipeline {
    /// Remove a photo's blobs, then its record.
    ///
    /// Blob removal is best-effort: failures are reported through
    /// `DeleteOutcome::Partial` rather than aborting. Display pointers at the
    /// photo are cleared in the same transaction that deletes the row.
    #[instrument(skip(self))]
    pub async fn delete_photo(
        &self,
        owner_id: i32,
        photo_id: Uuid,
    ) -> Result<DeleteOutcome, AppError> {
        let record = self.photo(owner_id, photo_id).await?;

        let original = ObjectKey::parse(record.object_key_original.as_str())
            .map_err(|e| AppError::Internal(format!("stored object key: {e}")))?;
        // Derived rather than read from the record: an unrecorded thumbnail may exist.
        let mut keys = vec![original.clone()];
        match thumb_key_for(&original) {
            Ok(thumb) => keys.push(thumb),
            Err(e) => warn!(%photo_id, error = %e, "No derivable thumbnail key"),
        }

        let results = join_all(keys.iter().map(|key| self.blobs.delete(key))).await;
        let orphaned_keys: Vec<String> = keys
            .iter()
            .zip(results)
            .filter_map(|(key, result)| match result {
                Ok(()) => None,
                Err(e) => {
                    warn!(%photo_id, %key, error = %e, "Failed to delete blob");
                    Some(key.to_string())
                }
            })
            .collect();

        let txn = self.db.begin().await?;
        let records = PhotoRecords::new(&txn);
        records.clear_target_pointers(photo_id).await?;
        records.delete(photo_id).await?;
        txn.commit().await?;

        if orphaned_keys.is_empty() {
            info!(%photo_id, "Photo deleted");
            Ok(DeleteOutcome::Complete)
        } else {
            warn!(%photo_id, orphaned = orphaned_keys.len(), "Photo deleted with orphaned blobs");
            Ok(DeleteOutcome::Partial { orphaned_keys })
        }
    }
}
