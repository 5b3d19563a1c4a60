//! Pipeline behavior under a store that counts calls and injects failures.

use std::sync::{Arc, OnceLock};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use ::common::storage::filesystem::FilesystemObjectStore;
use ::common::storage::{BoxReader, ObjectKey, ObjectMeta, ObjectStore, StorageError};
use async_trait::async_trait;
use chrono::Utc;
use image::ImageFormat;
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};
use tokio::sync::Barrier;
use serde_json::json;

use crate::common::{TestApp, routes, sample_image, sample_png};
use server::entity::{photo, plant};
use server::photos::{BeginUpload, PhotoSize};

#[derive(Default)]
struct Counters {
    head: AtomicU32,
    get: AtomicU32,
    put: AtomicU32,
    delete: AtomicU32,
}

/// Wraps the filesystem store, counting calls and failing on request.
struct ScriptedStore {
    inner: Arc<FilesystemObjectStore>,
    calls: Counters,
    /// Number of upcoming `put`s to fail.
    failing_puts: AtomicU32,
    fail_deletes: AtomicBool,
    fail_presign: AtomicBool,
    /// When set, every `head` waits here until the barrier is full.
    head_rendezvous: OnceLock<Barrier>,
}

impl ScriptedStore {
    fn new(inner: Arc<FilesystemObjectStore>) -> Self {
        Self {
            inner,
            calls: Counters::default(),
            failing_puts: AtomicU32::new(0),
            fail_deletes: AtomicBool::new(false),
            fail_presign: AtomicBool::new(false),
            head_rendezvous: OnceLock::new(),
        }
    }

    fn count(counter: &AtomicU32) -> u32 {
        counter.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectStore for ScriptedStore {
    async fn presign_put(
        &self,
        key: &ObjectKey,
        content_type: &str,
        max_bytes: u64,
        ttl: Duration,
    ) -> Result<String, StorageError> {
        if self.fail_presign.load(Ordering::SeqCst) {
            return Err(StorageError::Presign("credentials expired".into()));
        }
        self.inner.presign_put(key, content_type, max_bytes, ttl).await
    }

    async fn presign_get(&self, key: &ObjectKey, ttl: Duration) -> Result<String, StorageError> {
        if self.fail_presign.load(Ordering::SeqCst) {
            return Err(StorageError::Presign("credentials expired".into()));
        }
        self.inner.presign_get(key, ttl).await
    }

    async fn head(&self, key: &ObjectKey) -> Result<ObjectMeta, StorageError> {
        self.calls.head.fetch_add(1, Ordering::SeqCst);
        if let Some(barrier) = self.head_rendezvous.get() {
            barrier.wait().await;
        }
        self.inner.head(key).await
    }

    async fn put_stream(
        &self,
        key: &ObjectKey,
        reader: BoxReader,
        content_type: &str,
    ) -> Result<(), StorageError> {
        self.calls.put.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failing_puts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(StorageError::Backend("injected put failure".into()));
        }
        self.inner.put_stream(key, reader, content_type).await
    }

    async fn get_stream(&self, key: &ObjectKey) -> Result<BoxReader, StorageError> {
        self.calls.get.fetch_add(1, Ordering::SeqCst);
        self.inner.get_stream(key).await
    }

    async fn delete(&self, key: &ObjectKey) -> Result<bool, StorageError> {
        self.calls.delete.fetch_add(1, Ordering::SeqCst);
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(StorageError::Backend("injected delete failure".into()));
        }
        self.inner.delete(key).await
    }
}

async fn spawn_scripted() -> (TestApp, Arc<ScriptedStore>) {
    let mut handle = None;
    let app = TestApp::spawn_with_store(|fs| {
        let store = Arc::new(ScriptedStore::new(fs));
        handle = Some(store.clone());
        store as Arc<dyn ObjectStore>
    })
    .await;
    (app, handle.expect("store wrapper installed"))
}

/// Presign and upload through the signed URL without confirming.
async fn staged_upload(app: &TestApp, token: &str, bytes: Vec<u8>) -> uuid::Uuid {
    let presign = app
        .presign(token, &bytes, "leaf.png", "image/png", json!({}))
        .await;
    assert_eq!(presign.status, 201, "{}", presign.text);
    let status = app
        .put_signed(presign.body["upload_url"].as_str().unwrap(), bytes, "image/png")
        .await;
    assert_eq!(status, 200);
    presign.photo_id()
}

async fn confirm(app: &TestApp, token: &str, id: uuid::Uuid) -> crate::common::TestResponse {
    app.post_with_token(routes::CONFIRM, &json!({"photo_id": id}), token)
        .await
}

#[tokio::test]
async fn repeated_confirm_touches_the_store_once() {
    let (app, store) = spawn_scripted().await;
    let token = app.create_authenticated_user("alice", "securepass").await;
    let id = staged_upload(&app, &token, sample_png(100, 100)).await;

    for _ in 0..3 {
        let res = confirm(&app, &token, id).await;
        assert_eq!(res.status, 200, "{}", res.text);
    }

    assert_eq!(ScriptedStore::count(&store.calls.head), 1);
    assert_eq!(ScriptedStore::count(&store.calls.get), 1);
    assert_eq!(ScriptedStore::count(&store.calls.put), 1);
}

#[tokio::test]
async fn racing_confirms_agree_and_associate_once() {
    let (app, store) = spawn_scripted().await;
    let alice = app.create_user("alice").await;
    let plant_id = app.insert_plant(alice.id, "Calathea").await;
    let bytes = sample_png(320, 240);
    let presign = app
        .presign(
            &alice.token,
            &bytes,
            "leaf.png",
            "image/png",
            json!({"plant_id": plant_id}),
        )
        .await;
    let status = app
        .put_signed(presign.body["upload_url"].as_str().unwrap(), bytes, "image/png")
        .await;
    assert_eq!(status, 200);
    let id = presign.photo_id();

    // Both calls read the record as pending before either writes.
    let _ = store.head_rendezvous.set(Barrier::new(2));
    let (a, b) = tokio::join!(
        app.photos.confirm_upload(alice.id, id),
        app.photos.confirm_upload(alice.id, id),
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(ScriptedStore::count(&store.calls.head), 2);
    assert!(a.status.is_confirmed() && b.status.is_confirmed());
    assert_eq!((a.width, a.height), (Some(320), Some(240)));
    assert_eq!((a.width, a.height), (b.width, b.height));
    assert_eq!(a.object_key_thumb, b.object_key_thumb);
    // A second transition would have rewritten confirmed_at.
    assert_eq!(a.confirmed_at, b.confirmed_at);

    let plant = plant::Entity::find_by_id(plant_id)
        .one(&app.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(plant.photo_id, Some(id));
    let holders = photo::Entity::find()
        .filter(photo::Column::TargetId.eq(plant_id))
        .count(&app.db)
        .await
        .unwrap();
    assert_eq!(holders, 1);
}

#[tokio::test]
async fn undecodable_upload_confirms_without_thumbnail() {
    let (app, _store) = spawn_scripted().await;
    let token = app.create_authenticated_user("alice", "securepass").await;
    let id = staged_upload(&app, &token, b"definitely not a png".to_vec()).await;

    let res = confirm(&app, &token, id).await;

    assert_eq!(res.status, 200, "{}", res.text);
    assert_eq!(res.body["status"], "confirmed");
    assert_eq!(res.body["has_thumbnail"], false);
    assert!(res.body["width"].is_null());

    let retry = app
        .post_with_token(&routes::photo_thumbnail(id), &json!({}), &token)
        .await;
    assert_eq!(retry.status, 422);
    assert_eq!(retry.body["code"], "THUMBNAIL_UNAVAILABLE");
}

#[tokio::test]
async fn failed_thumbnail_write_can_be_regenerated() {
    let (app, store) = spawn_scripted().await;
    let token = app.create_authenticated_user("alice", "securepass").await;
    let id = staged_upload(&app, &token, sample_png(900, 300)).await;
    store.failing_puts.store(1, Ordering::SeqCst);

    let confirmed = confirm(&app, &token, id).await;
    assert_eq!(confirmed.status, 200);
    assert_eq!(confirmed.body["has_thumbnail"], false);

    let res = app
        .post_with_token(&routes::photo_thumbnail(id), &json!({}), &token)
        .await;

    assert_eq!(res.status, 200, "{}", res.text);
    assert_eq!(res.body["has_thumbnail"], true);
    assert_eq!(res.body["width"], 900);
    assert_eq!(res.body["height"], 300);

    let again = app
        .post_with_token(&routes::photo_thumbnail(id), &json!({}), &token)
        .await;
    assert_eq!(again.body, res.body);
    assert_eq!(ScriptedStore::count(&store.calls.put), 2);
}

#[tokio::test]
async fn regenerate_on_pending_photo_is_precondition_failed() {
    let (app, _store) = spawn_scripted().await;
    let token = app.create_authenticated_user("alice", "securepass").await;
    let id = staged_upload(&app, &token, sample_png(10, 10)).await;

    let res = app
        .post_with_token(&routes::photo_thumbnail(id), &json!({}), &token)
        .await;

    assert_eq!(res.status, 409);
    assert_eq!(res.body["code"], "PRECONDITION_FAILED");
}

#[tokio::test]
async fn delete_reports_orphaned_blobs_but_removes_record() {
    let (app, store) = spawn_scripted().await;
    let token = app.create_authenticated_user("alice", "securepass").await;
    let id = staged_upload(&app, &token, sample_png(50, 50)).await;
    assert_eq!(confirm(&app, &token, id).await.status, 200);
    let stored = photo::Entity::find_by_id(id)
        .one(&app.db)
        .await
        .unwrap()
        .unwrap();
    store.fail_deletes.store(true, Ordering::SeqCst);

    let res = app.delete_with_token(&routes::photo(id), &token).await;

    assert_eq!(res.status, 200, "{}", res.text);
    assert_eq!(res.body["status"], "partial");
    let orphaned: Vec<&str> = res.body["orphaned_keys"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|k| k.as_str())
        .collect();
    assert!(orphaned.contains(&stored.object_key_original.as_str()));
    assert!(orphaned.contains(&stored.object_key_thumb.as_deref().unwrap()));
    assert!(photo::Entity::find_by_id(id).one(&app.db).await.unwrap().is_none());
}

#[tokio::test]
async fn delete_attempts_original_and_derived_thumb_key() {
    let (app, store) = spawn_scripted().await;
    let token = app.create_authenticated_user("alice", "securepass").await;
    let presign = app
        .presign(&token, b"abc", "a.png", "image/png", json!({}))
        .await;

    let res = app
        .delete_with_token(&routes::photo(presign.photo_id()), &token)
        .await;

    assert_eq!(res.status, 204);
    assert_eq!(ScriptedStore::count(&store.calls.delete), 2);
}

#[tokio::test]
async fn presign_failure_is_reported_as_bad_gateway_and_keeps_the_record() {
    let (app, store) = spawn_scripted().await;
    let token = app.create_authenticated_user("alice", "securepass").await;
    store.fail_presign.store(true, Ordering::SeqCst);

    let res = app
        .presign(&token, b"abc", "a.png", "image/png", json!({}))
        .await;

    assert_eq!(res.status, 502);
    assert_eq!(res.body["code"], "PRESIGN_FAILED");
    let records = photo::Entity::find().all(&app.db).await.unwrap();
    assert_eq!(records.len(), 1);
    assert!(!records[0].status.is_confirmed());
}

#[tokio::test]
async fn batch_drops_entries_whose_url_cannot_be_signed() {
    let (app, store) = spawn_scripted().await;
    let token = app.create_authenticated_user("alice", "securepass").await;
    let id = staged_upload(&app, &token, sample_png(10, 10)).await;
    store.fail_presign.store(true, Ordering::SeqCst);

    let res = app
        .post_with_token(routes::URLS, &json!({"photo_ids": [id]}), &token)
        .await;

    assert_eq!(res.status, 200, "{}", res.text);
    assert!(res.body["urls"].as_object().unwrap().is_empty());
}

#[tokio::test]
async fn pipeline_is_usable_without_http() {
    let (app, _store) = spawn_scripted().await;
    let token = app.create_authenticated_user("alice", "securepass").await;
    let me = app.get_with_token(routes::ME, &token).await;
    let id = staged_upload(&app, &token, sample_png(40, 20)).await;

    let record = app.photos.confirm_upload(me.id(), id).await.unwrap();

    assert!(record.status.is_confirmed());
    assert_eq!((record.width, record.height), (Some(40), Some(20)));
}

#[tokio::test]
async fn end_to_end_with_bytes_written_straight_into_the_store() {
    let (app, _store) = spawn_scripted().await;
    let alice = app.create_user("alice").await;

    let ticket = app
        .photos
        .begin_upload(
            alice.id,
            BeginUpload {
                file_name: "leaf.jpg".into(),
                file_type: "image/jpeg".into(),
                file_size: 500_000,
                target: None,
                taken_at: None,
            },
        )
        .await
        .unwrap();

    let prefix = format!("users/{}/photos/{}/", alice.id, Utc::now().format("%Y-%m"));
    let key = ticket.object_key.as_str();
    assert!(key.starts_with(&prefix) && key.ends_with(".jpg"), "{key}");
    let record = app.photos.photo(alice.id, ticket.photo_id).await.unwrap();
    assert!(!record.status.is_confirmed());

    app.blobs
        .put(
            &ticket.object_key,
            &sample_image(1200, 900, ImageFormat::Jpeg),
            "image/jpeg",
        )
        .await
        .unwrap();

    let confirmed = app
        .photos
        .confirm_upload(alice.id, ticket.photo_id)
        .await
        .unwrap();
    assert!(confirmed.status.is_confirmed());
    assert_eq!((confirmed.width, confirmed.height), (Some(1200), Some(900)));
    let thumb_key = key.replace(".jpg", "_thumb.webp");
    assert_eq!(confirmed.object_key_thumb.as_deref(), Some(thumb_key.as_str()));
    assert!(app.object_exists(&thumb_key).await);

    let urls = app
        .photos
        .resolve_read_urls(alice.id, &[ticket.photo_id], PhotoSize::Thumb)
        .await
        .unwrap();
    assert_eq!(urls.len(), 1);
    assert!(urls[&ticket.photo_id].contains(&thumb_key));
}
