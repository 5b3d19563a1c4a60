//! Signed-URL endpoints backing the local object store.
//!
//! Presigned URLs issued by `FilesystemObjectStore` point here. Requests carry
//! no bearer token; the HMAC signature in the query string is the credential.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use common::storage::filesystem::FilesystemObjectStore;
use common::storage::{
    BoxReader, ObjectKey, ObjectStore, SignatureError, SignedMethod, SignedQuery,
};
use futures::TryStreamExt;
use tokio_util::io::{ReaderStream, StreamReader};
use tracing::{debug, instrument, warn};

use crate::error::AppError;
use crate::state::AppState;

fn local_store(state: &AppState) -> Result<&Arc<FilesystemObjectStore>, AppError> {
    state
        .local_blobs
        .as_ref()
        .ok_or_else(|| AppError::NotFound("Not found".into()))
}

fn verified(
    store: &FilesystemObjectStore,
    method: SignedMethod,
    raw_key: String,
    query: Result<Query<SignedQuery>, QueryRejection>,
) -> Result<(ObjectKey, SignedQuery), AppError> {
    let Query(query) = query.map_err(|_| AppError::SignatureRejected)?;
    let key = ObjectKey::parse(raw_key).map_err(|_| AppError::SignatureRejected)?;
    store
        .signer()
        .verify(method, &key, &query)
        .map_err(|e| {
            match e {
                SignatureError::Expired => debug!(%key, "Signed URL expired"),
                SignatureError::Invalid => warn!(%key, "Signed URL rejected"),
            }
            AppError::SignatureRejected
        })?;
    Ok((key, query))
}

/// Receive an upload issued by `presign_put`.
///
/// The `Content-Type` header must match the signed one, and the body may not
/// exceed the signed `max_bytes`.
#[instrument(skip(state, headers, query, body))]
pub async fn put_blob(
    State(state): State<AppState>,
    Path(raw_key): Path<String>,
    query: Result<Query<SignedQuery>, QueryRejection>,
    headers: HeaderMap,
    body: Body,
) -> Result<StatusCode, AppError> {
    let store = local_store(&state)?;
    let (key, query) = verified(store, SignedMethod::Put, raw_key, query)?;

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if let Some(signed) = query.content_type.as_deref()
        && signed != content_type
    {
        debug!(%key, signed, content_type, "Content-Type does not match signature");
        return Err(AppError::SignatureRejected);
    }

    let limit = query.max_bytes.unwrap_or(u64::MAX);
    let declared = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    if declared.is_some_and(|len| len > limit) {
        return Err(AppError::PayloadTooLarge(limit));
    }

    let stream = body.into_data_stream().map_err(std::io::Error::other);
    let reader: BoxReader = Box::new(StreamReader::new(stream));
    store.put_stream_limited(&key, reader, limit).await?;

    debug!(%key, "Blob stored");
    Ok(StatusCode::OK)
}

/// Serve a download issued by `presign_get`.
#[instrument(skip(state, query))]
pub async fn get_blob(
    State(state): State<AppState>,
    Path(raw_key): Path<String>,
    query: Result<Query<SignedQuery>, QueryRejection>,
) -> Result<impl IntoResponse, AppError> {
    let store = local_store(&state)?;
    let (key, _) = verified(store, SignedMethod::Get, raw_key, query)?;

    let meta = store.head(&key).await?;
    let reader = store.get_stream(&key).await?;
    let mime = mime_guess::from_path(key.file_name()).first_or_octet_stream();

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, mime.as_ref())
        .header(header::CONTENT_LENGTH, meta.size.to_string())
        .header(header::CACHE_CONTROL, "private, max-age=3600")
        .body(Body::from_stream(ReaderStream::new(reader)))
        .map_err(|e| AppError::Internal(format!("Failed to build response: {e}")))
}
