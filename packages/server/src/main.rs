use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use common::storage::filesystem::FilesystemObjectStore;
use common::storage::s3::{S3ObjectStore, S3Options};
use common::storage::{ObjectStore, UrlSigner};
use tracing::info;
use tracing_subscriber::EnvFilter;

use server::config::{AppConfig, StorageBackend};
use server::database::init_db;
use server::photos::gateway::BlobGateway;
use server::photos::{PhotoPipeline, PipelineSettings};
use server::seed::ensure_indexes;
use server::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::load().context("Failed to load configuration")?;

    let db = init_db(&config.database.url)
        .await
        .context("Failed to connect to database")?;
    ensure_indexes(&db)
        .await
        .context("Failed to create database indexes")?;

    let (store, local_blobs) = match config.storage.backend {
        StorageBackend::Local => {
            let local = &config.storage.local;
            let signer = UrlSigner::new(&local.signing_secret, local.public_base_url.clone());
            let fs = Arc::new(
                FilesystemObjectStore::new(
                    PathBuf::from(&local.root),
                    local.max_object_size,
                    signer,
                )
                .await
                .context("Failed to initialize local object store")?,
            );
            info!(root = %local.root, "Using local object store");
            let shared: Arc<dyn ObjectStore> = fs.clone();
            (shared, Some(fs))
        }
        StorageBackend::S3 => {
            let s3 = &config.storage.s3;
            let store = S3ObjectStore::new(&S3Options {
                bucket: s3.bucket.clone(),
                region: s3.region.clone(),
                endpoint: s3.endpoint.clone(),
                access_key: s3.access_key.clone(),
                secret_key: s3.secret_key.clone(),
                path_style: s3.path_style,
            })
            .context("Failed to initialize S3 object store")?;
            info!(bucket = %s3.bucket, "Using S3 object store");
            (Arc::new(store) as Arc<dyn ObjectStore>, None)
        }
    };

    let blobs = BlobGateway::new(store, config.storage.request_timeout());
    let photos = PhotoPipeline::new(db.clone(), blobs, PipelineSettings::from_config(&config));

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = AppState {
        db,
        config: Arc::new(config),
        photos,
        local_blobs,
    };
    let app = server::build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Server running at http://{}", addr);
    info!("Swagger UI at http://{}/swagger-ui", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}
