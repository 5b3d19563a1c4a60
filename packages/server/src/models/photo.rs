use std::collections::HashMap;

use chrono::{DateTime, Utc};
use common::PhotoStatus;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entity::photo::{self, TargetKind};
use crate::error::AppError;
use crate::photos::association::TargetRef;
use crate::photos::{BeginUpload, PhotoSize, UploadTicket};

/// A plant or check-in, as it appears on the wire.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, utoipa::ToSchema)]
pub struct TargetBody {
    #[serde(rename = "type")]
    #[schema(example = "plant")]
    pub kind: TargetKind,
    #[schema(example = 7)]
    pub id: i32,
}

impl From<TargetBody> for TargetRef {
    fn from(body: TargetBody) -> Self {
        match body.kind {
            TargetKind::Plant => TargetRef::Plant(body.id),
            TargetKind::CheckIn => TargetRef::CheckIn(body.id),
        }
    }
}

impl From<TargetRef> for TargetBody {
    fn from(target: TargetRef) -> Self {
        Self {
            kind: target.kind(),
            id: target.id(),
        }
    }
}

/// Request body for starting an upload.
#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct PresignRequest {
    /// Client-side file name; only its extension is kept.
    #[schema(example = "monstera.jpg")]
    pub file_name: String,
    /// One of `image/jpeg`, `image/png`, `image/webp`, `image/heic`.
    #[schema(example = "image/jpeg")]
    pub file_type: String,
    /// Declared size in bytes. The upload URL enforces it.
    #[schema(example = 2_400_000)]
    pub file_size: u64,
    /// Shorthand for `target: {"type": "plant", "id": ...}`.
    #[schema(example = 7)]
    pub plant_id: Option<i32>,
    pub target: Option<TargetBody>,
    /// When the photo was taken. Defaults to now.
    pub taken_at: Option<DateTime<Utc>>,
}

impl PresignRequest {
    pub fn into_begin_upload(self) -> Result<BeginUpload, AppError> {
        let target = match (self.plant_id, self.target) {
            (Some(_), Some(_)) => {
                return Err(AppError::Validation(
                    "Specify either plant_id or target, not both".into(),
                ));
            }
            (Some(id), None) => Some(TargetRef::Plant(id)),
            (None, target) => target.map(TargetRef::from),
        };
        Ok(BeginUpload {
            file_name: self.file_name,
            file_type: self.file_type,
            file_size: self.file_size,
            target,
            taken_at: self.taken_at,
        })
    }
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct PresignResponse {
    #[schema(example = "01936f0e-1234-7abc-8000-000000000001")]
    pub photo_id: Uuid,
    /// Presigned PUT URL. Send the bytes with the declared `Content-Type`.
    pub upload_url: String,
    #[schema(example = "users/42/photos/2026-10/3f0c9a52-8d1e-4b0a-9c55-2f1d7e6b1a90.jpg")]
    pub object_key: String,
}

impl From<UploadTicket> for PresignResponse {
    fn from(ticket: UploadTicket) -> Self {
        Self {
            photo_id: ticket.photo_id,
            upload_url: ticket.upload_url,
            object_key: ticket.object_key.to_string(),
        }
    }
}

#[derive(Deserialize, utoipa::ToSchema)]
pub struct ConfirmRequest {
    pub photo_id: Uuid,
}

/// Photo state after a confirm or thumbnail regeneration.
#[derive(Serialize, utoipa::ToSchema)]
pub struct PhotoStateResponse {
    pub photo_id: Uuid,
    pub status: PhotoStatus,
    /// Oriented width of the original, known once a thumbnail was derived.
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub has_thumbnail: bool,
}

impl From<photo::Model> for PhotoStateResponse {
    fn from(model: photo::Model) -> Self {
        Self {
            photo_id: model.id,
            status: model.status,
            width: model.width,
            height: model.height,
            has_thumbnail: model.object_key_thumb.is_some(),
        }
    }
}

#[derive(Deserialize, utoipa::ToSchema)]
pub struct BatchUrlsRequest {
    pub photo_ids: Vec<Uuid>,
    #[serde(default)]
    pub size: PhotoSize,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct BatchUrlsResponse {
    /// Presigned GET URLs keyed by photo id. Unknown or foreign ids are absent.
    pub urls: HashMap<Uuid, String>,
}

#[derive(Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct UrlQuery {
    /// `thumb` (default) or `original`.
    #[serde(default)]
    #[param(value_type = Option<PhotoSize>)]
    pub size: PhotoSize,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct UrlResponse {
    pub url: String,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct PhotoResponse {
    pub id: Uuid,
    pub status: PhotoStatus,
    #[schema(example = "image/jpeg")]
    pub mime_type: String,
    pub size_bytes: i64,
    pub taken_at: DateTime<Utc>,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub has_thumbnail: bool,
    pub target: Option<TargetBody>,
    pub created_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
}

impl From<photo::Model> for PhotoResponse {
    fn from(model: photo::Model) -> Self {
        let target = TargetRef::of(&model).map(TargetBody::from);
        Self {
            id: model.id,
            status: model.status,
            mime_type: model.mime_type,
            size_bytes: model.size_bytes,
            taken_at: model.taken_at,
            width: model.width,
            height: model.height,
            has_thumbnail: model.object_key_thumb.is_some(),
            target,
            created_at: model.created_at,
            confirmed_at: model.confirmed_at,
        }
    }
}

/// Returned with 200 when the record was deleted but some blobs were not.
#[derive(Serialize, utoipa::ToSchema)]
pub struct PartialDeleteResponse {
    #[schema(example = "partial")]
    pub status: String,
    pub orphaned_keys: Vec<String>,
}
