mod v1;

use axum::Router;
use axum::routing::put;
use utoipa_axum::router::OpenApiRouter;

use crate::handlers;
use crate::state::AppState;

pub fn api_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().nest("/v1", v1::routes())
}

/// Signed-URL routes of the local object store. Not part of the documented API.
pub fn blob_routes() -> Router<AppState> {
    Router::new().route(
        "/blobs/{*key}",
        put(handlers::blob::put_blob).get(handlers::blob::get_blob),
    )
}
