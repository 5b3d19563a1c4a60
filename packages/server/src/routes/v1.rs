use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;

use crate::handlers::{auth, photo};
use crate::state::AppState;

pub fn routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .nest("/auth", auth_routes())
        .nest("/photos", photo_routes())
}

fn auth_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(auth::register))
        .routes(routes!(auth::login))
        .routes(routes!(auth::me))
}

fn photo_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(photo::presign_upload))
        .routes(routes!(photo::confirm_upload))
        .routes(routes!(photo::batch_read_urls))
        .routes(routes!(photo::get_photo, photo::delete_photo))
        .routes(routes!(photo::get_photo_url))
        .routes(routes!(photo::regenerate_thumbnail))
        .routes(routes!(photo::associate_photo))
}
