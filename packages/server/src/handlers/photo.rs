use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::instrument;
use uuid::Uuid;

use crate::error::{AppError, ErrorBody};
use crate::extractors::auth::AuthUser;
use crate::extractors::json::{AppJson, AppQuery};
use crate::models::photo::{
    BatchUrlsRequest, BatchUrlsResponse, ConfirmRequest, PartialDeleteResponse, PhotoResponse,
    PhotoStateResponse, PresignRequest, PresignResponse, TargetBody, UrlQuery, UrlResponse,
};
use crate::photos::DeleteOutcome;
use crate::state::AppState;

#[utoipa::path(
    post,
    path = "/presign",
    tag = "Photos",
    operation_id = "presignUpload",
    summary = "Start an upload",
    description = "Creates a pending photo record and returns a presigned PUT URL. \
        Upload the bytes to `upload_url` with the declared `Content-Type`, then call `/confirm`. \
        An optional `plant_id` or `target` is checked for ownership now and linked on confirm.",
    request_body = PresignRequest,
    responses(
        (status = 201, description = "Upload URL issued", body = PresignResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 404, description = "Target not found (NOT_FOUND)", body = ErrorBody),
        (status = 502, description = "URL could not be signed (PRESIGN_FAILED)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload), fields(user_id = auth_user.user_id))]
pub async fn presign_upload(
    auth_user: AuthUser,
    State(state): State<AppState>,
    AppJson(payload): AppJson<PresignRequest>,
) -> Result<impl IntoResponse, AppError> {
    let request = payload.into_begin_upload()?;
    let ticket = state
        .photos
        .begin_upload(auth_user.user_id, request)
        .await?;

    Ok((StatusCode::CREATED, Json(PresignResponse::from(ticket))))
}

#[utoipa::path(
    post,
    path = "/confirm",
    tag = "Photos",
    operation_id = "confirmUpload",
    summary = "Confirm an upload",
    description = "Verifies the uploaded object, derives a thumbnail and marks the photo \
        `confirmed`. Thumbnail failures do not fail the confirm. Repeating the call returns \
        the stored state.",
    request_body = ConfirmRequest,
    responses(
        (status = 200, description = "Photo confirmed", body = PhotoStateResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 404, description = "Photo not found (NOT_FOUND)", body = ErrorBody),
        (status = 409, description = "Object not uploaded yet (PRECONDITION_FAILED)", body = ErrorBody),
        (status = 503, description = "Storage unavailable (STORE_UNAVAILABLE)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload), fields(user_id = auth_user.user_id, photo_id = %payload.photo_id))]
pub async fn confirm_upload(
    auth_user: AuthUser,
    State(state): State<AppState>,
    AppJson(payload): AppJson<ConfirmRequest>,
) -> Result<Json<PhotoStateResponse>, AppError> {
    let record = state
        .photos
        .confirm_upload(auth_user.user_id, payload.photo_id)
        .await?;
    Ok(Json(record.into()))
}

#[utoipa::path(
    post,
    path = "/urls",
    tag = "Photos",
    operation_id = "batchReadUrls",
    summary = "Presigned read URLs for several photos",
    description = "Unknown ids and ids owned by other users are omitted from the result. \
        `size=thumb` falls back to the original for photos without a thumbnail.",
    request_body = BatchUrlsRequest,
    responses(
        (status = 200, description = "URLs by photo id", body = BatchUrlsResponse),
        (status = 400, description = "Empty or oversized batch (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload), fields(user_id = auth_user.user_id, count = payload.photo_ids.len()))]
pub async fn batch_read_urls(
    auth_user: AuthUser,
    State(state): State<AppState>,
    AppJson(payload): AppJson<BatchUrlsRequest>,
) -> Result<Json<BatchUrlsResponse>, AppError> {
    let urls = state
        .photos
        .resolve_read_urls(auth_user.user_id, &payload.photo_ids, payload.size)
        .await?;
    Ok(Json(BatchUrlsResponse { urls }))
}

#[utoipa::path(
    get,
    path = "/{id}",
    tag = "Photos",
    operation_id = "getPhoto",
    summary = "Get a photo record",
    params(("id" = Uuid, Path, description = "Photo ID")),
    responses(
        (status = 200, description = "Photo record", body = PhotoResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 404, description = "Photo not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(user_id = auth_user.user_id))]
pub async fn get_photo(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<PhotoResponse>, AppError> {
    let record = state.photos.photo(auth_user.user_id, id).await?;
    Ok(Json(record.into()))
}

#[utoipa::path(
    get,
    path = "/{id}/url",
    tag = "Photos",
    operation_id = "getPhotoUrl",
    summary = "Presigned read URL for one photo",
    params(("id" = Uuid, Path, description = "Photo ID"), UrlQuery),
    responses(
        (status = 200, description = "Read URL", body = UrlResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 404, description = "Photo not found (NOT_FOUND)", body = ErrorBody),
        (status = 502, description = "URL could not be signed (PRESIGN_FAILED)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, query), fields(user_id = auth_user.user_id))]
pub async fn get_photo_url(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    AppQuery(query): AppQuery<UrlQuery>,
) -> Result<Json<UrlResponse>, AppError> {
    let url = state
        .photos
        .resolve_read_url(auth_user.user_id, id, query.size)
        .await?;
    Ok(Json(UrlResponse { url }))
}

#[utoipa::path(
    post,
    path = "/{id}/thumbnail",
    tag = "Photos",
    operation_id = "regenerateThumbnail",
    summary = "Retry thumbnail generation",
    description = "Derives the thumbnail of a confirmed photo that has none. \
        A photo that already has a thumbnail is returned unchanged.",
    params(("id" = Uuid, Path, description = "Photo ID")),
    responses(
        (status = 200, description = "Current photo state", body = PhotoStateResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 404, description = "Photo not found (NOT_FOUND)", body = ErrorBody),
        (status = 409, description = "Photo not confirmed (PRECONDITION_FAILED)", body = ErrorBody),
        (status = 422, description = "Image cannot be thumbnailed (THUMBNAIL_UNAVAILABLE)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(user_id = auth_user.user_id))]
pub async fn regenerate_thumbnail(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<PhotoStateResponse>, AppError> {
    let record = state
        .photos
        .regenerate_thumbnail(auth_user.user_id, id)
        .await?;
    Ok(Json(record.into()))
}

#[utoipa::path(
    put,
    path = "/{id}/target",
    tag = "Photos",
    operation_id = "associatePhoto",
    summary = "Attach a photo to a plant or check-in",
    description = "Makes the target display this photo. Any other target that displayed the \
        photo is cleared.",
    params(("id" = Uuid, Path, description = "Photo ID")),
    request_body = TargetBody,
    responses(
        (status = 204, description = "Associated"),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 404, description = "Photo or target not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload), fields(user_id = auth_user.user_id))]
pub async fn associate_photo(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    AppJson(payload): AppJson<TargetBody>,
) -> Result<StatusCode, AppError> {
    state
        .photos
        .associate(auth_user.user_id, id, payload.into())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    delete,
    path = "/{id}",
    tag = "Photos",
    operation_id = "deletePhoto",
    summary = "Delete a photo",
    description = "Deletes the original, the thumbnail and the record. If some blobs could \
        not be removed the record is still deleted and the orphaned keys are returned with 200.",
    params(("id" = Uuid, Path, description = "Photo ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 200, description = "Deleted with orphaned blobs", body = PartialDeleteResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 404, description = "Photo not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(user_id = auth_user.user_id))]
pub async fn delete_photo(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    let response = match state.photos.delete_photo(auth_user.user_id, id).await? {
        DeleteOutcome::Complete => StatusCode::NO_CONTENT.into_response(),
        DeleteOutcome::Partial { orphaned_keys } => Json(PartialDeleteResponse {
            status: "partial".into(),
            orphaned_keys,
        })
        .into_response(),
    };
    Ok(response)
}
