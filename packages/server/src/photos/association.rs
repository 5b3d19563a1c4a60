use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter, TransactionTrait,
};
use tracing::info;
use uuid::Uuid;

use super::records::PhotoRecords;
use crate::entity::photo::TargetKind;
use crate::entity::{check_in, photo, plant};
use crate::error::AppError;

/// An entity a photo can be attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetRef {
    Plant(i32),
    CheckIn(i32),
}

impl TargetRef {
    pub fn kind(&self) -> TargetKind {
        match self {
            Self::Plant(_) => TargetKind::Plant,
            Self::CheckIn(_) => TargetKind::CheckIn,
        }
    }

    pub fn id(&self) -> i32 {
        match self {
            Self::Plant(id) | Self::CheckIn(id) => *id,
        }
    }

    /// Rebuild from the nullable column pair on `photo`.
    pub fn from_parts(kind: Option<TargetKind>, id: Option<i32>) -> Option<Self> {
        match (kind?, id?) {
            (TargetKind::Plant, id) => Some(Self::Plant(id)),
            (TargetKind::CheckIn, id) => Some(Self::CheckIn(id)),
        }
    }

    pub fn of(record: &photo::Model) -> Option<Self> {
        Self::from_parts(record.target_type, record.target_id)
    }
}

/// Fail with `NotFound` unless `target` exists and belongs to `owner_id`.
///
/// A check-in is owned by the owner of its plant.
pub async fn ensure_target_owned<C: ConnectionTrait>(
    conn: &C,
    owner_id: i32,
    target: TargetRef,
) -> Result<(), AppError> {
    let plant_id = match target {
        TargetRef::Plant(id) => id,
        TargetRef::CheckIn(id) => {
            check_in::Entity::find_by_id(id)
                .one(conn)
                .await?
                .ok_or_else(|| AppError::NotFound("Check-in not found".into()))?
                .plant_id
        }
    };

    let owned = plant::Entity::find_by_id(plant_id)
        .filter(plant::Column::UserId.eq(owner_id))
        .one(conn)
        .await?
        .is_some();

    match (owned, target) {
        (true, _) => Ok(()),
        (false, TargetRef::Plant(_)) => Err(AppError::NotFound("Plant not found".into())),
        (false, TargetRef::CheckIn(_)) => Err(AppError::NotFound("Check-in not found".into())),
    }
}

/// Make `target` display `photo_id`, keeping both link directions consistent.
///
/// Any other target still pointing at the photo is cleared, as is the
/// back-reference of any photo previously shown by `target`. The previously
/// shown photo itself is left untouched.
pub async fn associate(
    db: &DatabaseConnection,
    owner_id: i32,
    photo_id: Uuid,
    target: TargetRef,
) -> Result<(), AppError> {
    ensure_target_owned(db, owner_id, target).await?;

    PhotoRecords::new(db)
        .find_owned(owner_id, photo_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Photo not found".into()))?;

    let txn = db.begin().await?;
    let records = PhotoRecords::new(&txn);

    records.clear_target_pointers(photo_id).await?;

    photo::Entity::update_many()
        .col_expr(photo::Column::TargetType, Expr::value(Option::<TargetKind>::None))
        .col_expr(photo::Column::TargetId, Expr::value(Option::<i32>::None))
        .filter(photo::Column::TargetType.eq(target.kind()))
        .filter(photo::Column::TargetId.eq(target.id()))
        .filter(photo::Column::Id.ne(photo_id))
        .exec(&txn)
        .await?;

    match target {
        TargetRef::Plant(id) => {
            plant::Entity::update_many()
                .col_expr(plant::Column::PhotoId, Expr::value(Some(photo_id)))
                .filter(plant::Column::Id.eq(id))
                .exec(&txn)
                .await?;
        }
        TargetRef::CheckIn(id) => {
            check_in::Entity::update_many()
                .col_expr(check_in::Column::PhotoId, Expr::value(Some(photo_id)))
                .filter(check_in::Column::Id.eq(id))
                .exec(&txn)
                .await?;
        }
    }

    records.set_target(photo_id, Some(target)).await?;
    txn.commit().await?;

    info!(%photo_id, ?target, "Photo associated");
    Ok(())
}
