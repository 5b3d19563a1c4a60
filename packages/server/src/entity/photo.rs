use common::PhotoStatus;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Kind of entity a photo is attached to.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
    utoipa::ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    #[sea_orm(string_value = "plant")]
    Plant,
    #[sea_orm(string_value = "check_in")]
    CheckIn,
}

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "photo")]
pub struct Model {
    /// UUIDv7 primary key.
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub owner_id: i32,
    #[sea_orm(belongs_to, from = "owner_id", to = "id")]
    pub owner: HasOne<super::user::Entity>,

    /// Back-reference to the attached plant or check-in. Both set or both NULL.
    pub target_type: Option<TargetKind>,
    pub target_id: Option<i32>,

    /// Immutable once assigned.
    #[sea_orm(unique)]
    pub object_key_original: String,
    /// Set only after a thumbnail has been written.
    pub object_key_thumb: Option<String>,

    pub mime_type: String,
    pub size_bytes: i64,
    pub taken_at: DateTimeUtc,

    pub status: PhotoStatus,
    pub width: Option<i32>,
    pub height: Option<i32>,

    pub created_at: DateTimeUtc,
    pub confirmed_at: Option<DateTimeUtc>,
}

impl ActiveModelBehavior for ActiveModel {}
