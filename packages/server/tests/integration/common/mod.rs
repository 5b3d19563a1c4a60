use std::io::Cursor;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use ::common::storage::filesystem::FilesystemObjectStore;
use ::common::storage::{ObjectKey, ObjectStore, UrlSigner};
use image::{ImageFormat, Rgb, RgbImage};
use reqwest::Client;
use sea_orm::{ActiveModelTrait, ConnectOptions, Database, DatabaseConnection, Set};
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use uuid::Uuid;

use server::config::{
    AppConfig, AuthConfig, CorsConfig, DatabaseConfig, LocalStorageConfig, PhotoConfig,
    S3StorageConfig, ServerConfig, StorageBackend, StorageConfig,
};
use server::entity::{check_in, plant};
use server::photos::gateway::BlobGateway;
use server::photos::{PhotoPipeline, PipelineSettings};
use server::state::AppState;

pub const JWT_SECRET: &str = "test-secret-for-integration-tests";
const SIGNING_SECRET: &str = "test-signing-secret";

pub mod routes {
    pub const REGISTER: &str = "/api/v1/auth/register";
    pub const LOGIN: &str = "/api/v1/auth/login";
    pub const ME: &str = "/api/v1/auth/me";

    pub const PRESIGN: &str = "/api/v1/photos/presign";
    pub const CONFIRM: &str = "/api/v1/photos/confirm";
    pub const URLS: &str = "/api/v1/photos/urls";

    pub fn photo(id: impl std::fmt::Display) -> String {
        format!("/api/v1/photos/{id}")
    }

    pub fn photo_url(id: impl std::fmt::Display, size: &str) -> String {
        format!("/api/v1/photos/{id}/url?size={size}")
    }

    pub fn photo_thumbnail(id: impl std::fmt::Display) -> String {
        format!("/api/v1/photos/{id}/thumbnail")
    }

    pub fn photo_target(id: impl std::fmt::Display) -> String {
        format!("/api/v1/photos/{id}/target")
    }
}

/// A running test server backed by a SQLite file and a local object store.
pub struct TestApp {
    pub addr: SocketAddr,
    pub client: Client,
    pub db: DatabaseConnection,
    /// The store behind the pipeline, for direct inspection.
    pub blobs: Arc<FilesystemObjectStore>,
    pub photos: PhotoPipeline,
    _dir: TempDir,
}

/// Parsed HTTP response for test assertions.
pub struct TestResponse {
    pub status: u16,
    /// Raw response body as text.
    pub text: String,
    /// Parsed JSON body, or `Null` if the response is not valid JSON.
    pub body: Value,
}

/// A registered, logged-in user.
pub struct TestUser {
    pub id: i32,
    pub token: String,
}

fn test_config(db_url: &str, blob_root: &str, base_url: &str) -> AppConfig {
    AppConfig {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            cors: CorsConfig {
                allow_origins: vec![],
                max_age: 3600,
            },
        },
        database: DatabaseConfig {
            url: db_url.to_string(),
        },
        auth: AuthConfig {
            jwt_secret: JWT_SECRET.to_string(),
            token_ttl_hours: 1,
        },
        storage: StorageConfig {
            backend: StorageBackend::Local,
            upload_url_ttl_secs: 600,
            read_url_ttl_secs: 3600,
            request_timeout_secs: 5,
            local: LocalStorageConfig {
                root: blob_root.to_string(),
                public_base_url: base_url.to_string(),
                signing_secret: SIGNING_SECRET.to_string(),
                max_object_size: 10 * 1024 * 1024,
            },
            s3: S3StorageConfig {
                bucket: "unused".to_string(),
                region: "us-east-1".to_string(),
                endpoint: None,
                access_key: String::new(),
                secret_key: String::new(),
                path_style: true,
            },
        },
        photos: PhotoConfig::default(),
    }
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with_store(|fs| fs as Arc<dyn ObjectStore>).await
    }

    /// Spawn with the pipeline's store wrapped by `wrap`. The signed `/blobs`
    /// routes keep using the unwrapped filesystem store.
    pub async fn spawn_with_store<F>(wrap: F) -> Self
    where
        F: FnOnce(Arc<FilesystemObjectStore>) -> Arc<dyn ObjectStore>,
    {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let db_url = format!("sqlite://{}?mode=rwc", dir.path().join("test.db").display());

        let mut opts = ConnectOptions::new(&db_url);
        opts.max_connections(5).min_connections(1);
        let db = Database::connect(opts)
            .await
            .expect("Failed to connect to test database");
        server::database::create_tables(&db)
            .await
            .expect("Failed to create tables");
        server::seed::ensure_indexes(&db)
            .await
            .expect("Failed to create indexes");

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{addr}");

        let blob_root = dir.path().join("blobs");
        let config = test_config(&db_url, &blob_root.display().to_string(), &base_url);

        let fs = Arc::new(
            FilesystemObjectStore::new(
                blob_root,
                config.storage.local.max_object_size,
                UrlSigner::new(SIGNING_SECRET, base_url.clone()),
            )
            .await
            .expect("Failed to create object store"),
        );
        let blobs = BlobGateway::new(wrap(fs.clone()), Duration::from_secs(5));
        let photos = PhotoPipeline::new(db.clone(), blobs, PipelineSettings::from_config(&config));

        let state = AppState {
            db: db.clone(),
            config: Arc::new(config),
            photos: photos.clone(),
            local_blobs: Some(fs.clone()),
        };
        let app = server::build_router(state);

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            client: Client::new(),
            db,
            blobs: fs,
            photos,
            _dir: dir,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn post_with_token(&self, path: &str, body: &Value, token: &str) -> TestResponse {
        let res = self
            .client
            .post(self.url(path))
            .header("Authorization", format!("Bearer {token}"))
            .json(body)
            .send()
            .await
            .expect("Failed to send POST request");

        TestResponse::from_response(res).await
    }

    pub async fn post_without_token(&self, path: &str, body: &Value) -> TestResponse {
        let res = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .expect("Failed to send POST request");

        TestResponse::from_response(res).await
    }

    pub async fn get_with_token(&self, path: &str, token: &str) -> TestResponse {
        let res = self
            .client
            .get(self.url(path))
            .header("Authorization", format!("Bearer {token}"))
            .send()
            .await
            .expect("Failed to send GET request");

        TestResponse::from_response(res).await
    }

    pub async fn get_without_token(&self, path: &str) -> TestResponse {
        let res = self
            .client
            .get(self.url(path))
            .send()
            .await
            .expect("Failed to send GET request");

        TestResponse::from_response(res).await
    }

    pub async fn put_with_token(&self, path: &str, body: &Value, token: &str) -> TestResponse {
        let res = self
            .client
            .put(self.url(path))
            .header("Authorization", format!("Bearer {token}"))
            .json(body)
            .send()
            .await
            .expect("Failed to send PUT request");

        TestResponse::from_response(res).await
    }

    pub async fn delete_with_token(&self, path: &str, token: &str) -> TestResponse {
        let res = self
            .client
            .delete(self.url(path))
            .header("Authorization", format!("Bearer {token}"))
            .send()
            .await
            .expect("Failed to send DELETE request");

        TestResponse::from_response(res).await
    }

    /// PUT raw bytes to a presigned URL, the way a client would.
    pub async fn put_signed(&self, url: &str, bytes: Vec<u8>, content_type: &str) -> u16 {
        self.client
            .put(url)
            .header("Content-Type", content_type)
            .body(bytes)
            .send()
            .await
            .expect("Failed to send signed PUT")
            .status()
            .as_u16()
    }

    /// PUT to a presigned URL with a chunked body, so the server sees no
    /// `Content-Length` and has to count bytes as they arrive.
    pub async fn put_signed_chunked(&self, url: &str, bytes: &[u8], content_type: &str) -> u16 {
        let target = url
            .strip_prefix(&format!("http://{}", self.addr))
            .expect("signed URL points at another host");
        let mut request = format!(
            "PUT {target} HTTP/1.1\r\nHost: {}\r\nContent-Type: {content_type}\r\n\
             Transfer-Encoding: chunked\r\nConnection: close\r\n\r\n{:x}\r\n",
            self.addr,
            bytes.len()
        )
        .into_bytes();
        request.extend_from_slice(bytes);
        request.extend_from_slice(b"\r\n0\r\n\r\n");

        let mut stream = TcpStream::connect(self.addr)
            .await
            .expect("Failed to connect");
        // The server may answer and hang up before reading the whole body.
        let _ = stream.write_all(&request).await;
        let mut response = Vec::new();
        let _ = stream.read_to_end(&mut response).await;

        let response = String::from_utf8_lossy(&response);
        response
            .split_whitespace()
            .nth(1)
            .and_then(|code| code.parse().ok())
            .expect("malformed HTTP response")
    }

    /// GET a presigned URL, returning the status and body bytes.
    pub async fn fetch_signed(&self, url: &str) -> (u16, Vec<u8>) {
        let res = self
            .client
            .get(url)
            .send()
            .await
            .expect("Failed to send signed GET");
        let status = res.status().as_u16();
        let bytes = res.bytes().await.unwrap_or_default().to_vec();
        (status, bytes)
    }

    /// Register a user and log in, returning the auth token.
    pub async fn create_authenticated_user(&self, username: &str, password: &str) -> String {
        let body = json!({
            "username": username,
            "password": password,
        });

        let reg = self.post_without_token(routes::REGISTER, &body).await;
        assert_eq!(reg.status, 201, "Registration failed: {}", reg.text);

        let res = self.post_without_token(routes::LOGIN, &body).await;
        assert_eq!(res.status, 200, "Login failed: {}", res.text);

        res.body["token"]
            .as_str()
            .expect("Login response should contain a token")
            .to_string()
    }

    /// Register and log in `username`, returning its id and token.
    pub async fn create_user(&self, username: &str) -> TestUser {
        let token = self.create_authenticated_user(username, "securepass").await;
        let me = self.get_with_token(routes::ME, &token).await;
        assert_eq!(me.status, 200, "me failed: {}", me.text);
        TestUser { id: me.id(), token }
    }

    /// Insert a plant directly; plants have no API of their own here.
    pub async fn insert_plant(&self, user_id: i32, name: &str) -> i32 {
        plant::ActiveModel {
            user_id: Set(user_id),
            name: Set(name.to_string()),
            photo_id: Set(None),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&self.db)
        .await
        .expect("Failed to insert plant")
        .id
    }

    pub async fn insert_check_in(&self, plant_id: i32, date: NaiveDate) -> i32 {
        check_in::ActiveModel {
            plant_id: Set(plant_id),
            date: Set(date),
            status: Set("watered".to_string()),
            notes: Set(None),
            photo_id: Set(None),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&self.db)
        .await
        .expect("Failed to insert check-in")
        .id
    }

    /// Presign with `extra` merged into the request body, returning the response.
    pub async fn presign(
        &self,
        token: &str,
        bytes: &[u8],
        file_name: &str,
        file_type: &str,
        extra: Value,
    ) -> TestResponse {
        let mut body = json!({
            "file_name": file_name,
            "file_type": file_type,
            "file_size": bytes.len(),
        });
        if let (Some(body), Some(extra)) = (body.as_object_mut(), extra.as_object()) {
            body.extend(extra.clone());
        }
        self.post_with_token(routes::PRESIGN, &body, token).await
    }

    /// Presign, upload and confirm a photo; returns the confirm response.
    pub async fn upload_photo(&self, token: &str, bytes: Vec<u8>, extra: Value) -> TestResponse {
        let presign = self
            .presign(token, &bytes, "leaf.png", "image/png", extra)
            .await;
        assert_eq!(presign.status, 201, "presign failed: {}", presign.text);

        let upload_url = presign.body["upload_url"].as_str().unwrap();
        let status = self.put_signed(upload_url, bytes, "image/png").await;
        assert_eq!(status, 200, "signed upload failed");

        let res = self
            .post_with_token(
                routes::CONFIRM,
                &json!({"photo_id": presign.body["photo_id"]}),
                token,
            )
            .await;
        assert_eq!(res.status, 200, "confirm failed: {}", res.text);
        res
    }

    pub async fn object_exists(&self, key: &str) -> bool {
        let key = ObjectKey::parse(key).expect("invalid key");
        match self.blobs.head(&key).await {
            Ok(_) => true,
            Err(e) if e.is_not_found() => false,
            Err(e) => panic!("head failed: {e}"),
        }
    }
}

impl TestResponse {
    pub async fn from_response(res: reqwest::Response) -> Self {
        let status = res.status().as_u16();
        let text = res.text().await.unwrap_or_default();
        let body = serde_json::from_str(&text).unwrap_or(Value::Null);
        Self { status, text, body }
    }

    pub fn id(&self) -> i32 {
        self.body["id"]
            .as_i64()
            .expect("response body should contain 'id'") as i32
    }

    pub fn photo_id(&self) -> Uuid {
        self.body["photo_id"]
            .as_str()
            .and_then(|s| s.parse().ok())
            .expect("response body should contain 'photo_id'")
    }
}

/// Encode a `width` x `height` image with a vertical gradient.
pub fn sample_image(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, 120])
    });
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, format).expect("Failed to encode image");
    out.into_inner()
}

pub fn sample_png(width: u32, height: u32) -> Vec<u8> {
    sample_image(width, height, ImageFormat::Png)
}
