use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Daily care log for a plant. At most one per plant per day.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "check_in")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub plant_id: i32,
    #[sea_orm(belongs_to, from = "plant_id", to = "id")]
    pub plant: HasOne<super::plant::Entity>,

    pub date: Date,
    /// Free-form care status, e.g. "watered", "healthy".
    pub status: String,
    pub notes: Option<String>,

    pub photo_id: Option<Uuid>,

    pub created_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
