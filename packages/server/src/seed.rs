use sea_orm::sea_query::{Index, IndexCreateStatement};
use sea_orm::{ConnectionTrait, DbErr};
use tracing::info;

use crate::entity::{check_in, photo, plant};

/// Ensure required database indexes exist.
///
/// Entity-derived DDL has no composite keys, so they are created here on
/// startup. The check-in index is unique: one check-in per plant per day.
pub async fn ensure_indexes<C: ConnectionTrait>(db: &C) -> Result<(), DbErr> {
    let check_in_day = Index::create()
        .if_not_exists()
        .unique()
        .name("idx_check_in_plant_date")
        .table(check_in::Entity)
        .col(check_in::Column::PlantId)
        .col(check_in::Column::Date)
        .to_owned();
    // Required; fail startup if it cannot be created.
    create_index(db, "idx_check_in_plant_date", &check_in_day).await?;

    // Batch URL lookups: WHERE id IN (..) AND owner_id = ?
    let photo_owner = Index::create()
        .if_not_exists()
        .name("idx_photo_owner_created")
        .table(photo::Entity)
        .col(photo::Column::OwnerId)
        .col(photo::Column::CreatedAt)
        .to_owned();
    try_create_index(db, "idx_photo_owner_created", &photo_owner).await;

    // Re-association clears the previous holder of a target.
    let photo_target = Index::create()
        .if_not_exists()
        .name("idx_photo_target")
        .table(photo::Entity)
        .col(photo::Column::TargetType)
        .col(photo::Column::TargetId)
        .to_owned();
    try_create_index(db, "idx_photo_target", &photo_target).await;

    let plant_photo = Index::create()
        .if_not_exists()
        .name("idx_plant_photo")
        .table(plant::Entity)
        .col(plant::Column::PhotoId)
        .to_owned();
    try_create_index(db, "idx_plant_photo", &plant_photo).await;

    let check_in_photo = Index::create()
        .if_not_exists()
        .name("idx_check_in_photo")
        .table(check_in::Entity)
        .col(check_in::Column::PhotoId)
        .to_owned();
    try_create_index(db, "idx_check_in_photo", &check_in_photo).await;

    Ok(())
}

async fn create_index<C: ConnectionTrait>(
    db: &C,
    name: &str,
    stmt: &IndexCreateStatement,
) -> Result<(), DbErr> {
    let backend = db.get_database_backend();
    db.execute_raw(backend.build(stmt)).await?;
    info!("Ensured index {} exists", name);
    Ok(())
}

async fn try_create_index<C: ConnectionTrait>(db: &C, name: &str, stmt: &IndexCreateStatement) {
    if let Err(e) = create_index(db, name, stmt).await {
        tracing::warn!("Failed to create index {}: {}", name, e);
    }
}
