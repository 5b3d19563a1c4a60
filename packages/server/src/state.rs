use std::sync::Arc;

use common::storage::filesystem::FilesystemObjectStore;
use sea_orm::DatabaseConnection;

use crate::config::AppConfig;
use crate::photos::PhotoPipeline;

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub config: Arc<AppConfig>,
    pub photos: PhotoPipeline,
    /// Set when the local backend is active; backs the signed `/blobs` routes.
    pub local_blobs: Option<Arc<FilesystemObjectStore>>,
}
