use chrono::{DateTime, Utc};
use common::PhotoStatus;
use common::storage::ObjectKey;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, Set,
};
use uuid::Uuid;

use super::association::TargetRef;
use crate::entity::{check_in, photo, plant};

/// Fields of a photo record created by `begin_upload`.
#[derive(Debug, Clone)]
pub struct NewPhoto {
    pub owner_id: i32,
    pub original_key: ObjectKey,
    pub mime_type: String,
    pub size_bytes: i64,
    pub taken_at: DateTime<Utc>,
    pub target: Option<TargetRef>,
}

/// Output of a successful thumbnail derivation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Derived {
    pub width: i32,
    pub height: i32,
    pub thumb_key: ObjectKey,
}

/// Typed access to the `photo` table. Every read is scoped to an owner.
pub struct PhotoRecords<'a, C: ConnectionTrait> {
    conn: &'a C,
}

impl<'a, C: ConnectionTrait> PhotoRecords<'a, C> {
    pub fn new(conn: &'a C) -> Self {
        Self { conn }
    }

    /// Insert a `pending` record with a fresh UUIDv7 id.
    pub async fn insert(&self, new: NewPhoto) -> Result<photo::Model, DbErr> {
        let now = Utc::now();
        let model = photo::ActiveModel {
            id: Set(Uuid::now_v7()),
            owner_id: Set(new.owner_id),
            target_type: Set(new.target.map(|t| t.kind())),
            target_id: Set(new.target.map(|t| t.id())),
            object_key_original: Set(new.original_key.into_string()),
            object_key_thumb: Set(None),
            mime_type: Set(new.mime_type),
            size_bytes: Set(new.size_bytes),
            taken_at: Set(new.taken_at),
            status: Set(PhotoStatus::Pending),
            width: Set(None),
            height: Set(None),
            created_at: Set(now),
            confirmed_at: Set(None),
        };
        model.insert(self.conn).await
    }

    /// Fetch a record if it exists and belongs to `owner_id`.
    pub async fn find_owned(
        &self,
        owner_id: i32,
        id: Uuid,
    ) -> Result<Option<photo::Model>, DbErr> {
        photo::Entity::find_by_id(id)
            .filter(photo::Column::OwnerId.eq(owner_id))
            .one(self.conn)
            .await
    }

    /// Fetch all records among `ids` that belong to `owner_id`, in one query.
    pub async fn find_many_owned(
        &self,
        owner_id: i32,
        ids: &[Uuid],
    ) -> Result<Vec<photo::Model>, DbErr> {
        photo::Entity::find()
            .filter(photo::Column::Id.is_in(ids.to_vec()))
            .filter(photo::Column::OwnerId.eq(owner_id))
            .all(self.conn)
            .await
    }

    /// Transition `pending → confirmed`, storing derived fields when present.
    ///
    /// Returns `false` when the record was no longer pending, i.e. another
    /// confirm won the race.
    pub async fn mark_confirmed(
        &self,
        id: Uuid,
        derived: Option<&Derived>,
    ) -> Result<bool, DbErr> {
        let mut update = photo::Entity::update_many()
            .col_expr(photo::Column::Status, Expr::value(PhotoStatus::Confirmed))
            .col_expr(photo::Column::ConfirmedAt, Expr::value(Some(Utc::now())));
        if let Some(derived) = derived {
            update = update
                .col_expr(photo::Column::Width, Expr::value(Some(derived.width)))
                .col_expr(photo::Column::Height, Expr::value(Some(derived.height)))
                .col_expr(
                    photo::Column::ObjectKeyThumb,
                    Expr::value(Some(derived.thumb_key.as_str().to_owned())),
                );
        }

        let result = update
            .filter(photo::Column::Id.eq(id))
            .filter(photo::Column::Status.eq(PhotoStatus::Pending))
            .exec(self.conn)
            .await?;
        Ok(result.rows_affected > 0)
    }

    /// Attach derived fields to a confirmed record that has no thumbnail yet.
    pub async fn attach_thumbnail(&self, id: Uuid, derived: &Derived) -> Result<bool, DbErr> {
        let result = photo::Entity::update_many()
            .col_expr(photo::Column::Width, Expr::value(Some(derived.width)))
            .col_expr(photo::Column::Height, Expr::value(Some(derived.height)))
            .col_expr(
                photo::Column::ObjectKeyThumb,
                Expr::value(Some(derived.thumb_key.as_str().to_owned())),
            )
            .filter(photo::Column::Id.eq(id))
            .filter(photo::Column::Status.eq(PhotoStatus::Confirmed))
            .filter(photo::Column::ObjectKeyThumb.is_null())
            .exec(self.conn)
            .await?;
        Ok(result.rows_affected > 0)
    }

    /// Overwrite the back-reference of one photo.
    pub async fn set_target(&self, id: Uuid, target: Option<TargetRef>) -> Result<(), DbErr> {
        photo::Entity::update_many()
            .col_expr(photo::Column::TargetType, Expr::value(target.map(|t| t.kind())))
            .col_expr(photo::Column::TargetId, Expr::value(target.map(|t| t.id())))
            .filter(photo::Column::Id.eq(id))
            .exec(self.conn)
            .await?;
        Ok(())
    }

    /// Null out every plant and check-in display pointer at `id`.
    pub async fn clear_target_pointers(&self, id: Uuid) -> Result<(), DbErr> {
        plant::Entity::update_many()
            .col_expr(plant::Column::PhotoId, Expr::value(Option::<Uuid>::None))
            .filter(plant::Column::PhotoId.eq(id))
            .exec(self.conn)
            .await?;
        check_in::Entity::update_many()
            .col_expr(check_in::Column::PhotoId, Expr::value(Option::<Uuid>::None))
            .filter(check_in::Column::PhotoId.eq(id))
            .exec(self.conn)
            .await?;
        Ok(())
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), DbErr> {
        photo::Entity::delete_by_id(id).exec(self.conn).await?;
        Ok(())
    }
}
