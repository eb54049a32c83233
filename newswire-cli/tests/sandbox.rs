//! Sandbox child-process behavior and the full image-cache flow, driven
//! against the real `newswire` binary.

use std::collections::HashSet;
use std::io::Cursor;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use image::{DynamicImage, RgbImage};
use newswire_core::error::Result;
use newswire_core::fetch::HttpFetcher;
use newswire_core::image_cache::ImageCache;
use newswire_core::sandbox::ThumbnailSandbox;
use newswire_core::store::ObjectStore;
use wiremock::matchers::{method, path as url_path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn worker_exe() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_newswire"))
}

fn png_bytes() -> Vec<u8> {
    let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(64, 48, image::Rgb([10, 120, 200])));
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    bytes
}

fn run_worker(input: &[u8], cache_path: &Path) -> std::process::ExitStatus {
    let mut child = Command::new(worker_exe())
        .args([
            "thumbnail-worker",
            "--width",
            "320",
            "--height",
            "180",
            "--out-size",
            "60000",
            "--cache-path",
        ])
        .arg(cache_path)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();
    child.stdin.take().unwrap().write_all(input).unwrap();
    child.wait().unwrap()
}

#[test]
fn worker_writes_a_fixed_size_pad_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let cache_path = dir.path().join("thumb.jpg");

    let status = run_worker(&png_bytes(), &cache_path);
    assert!(status.success());

    let pad = std::fs::read(dir.path().join("thumb.jpg.pad")).unwrap();
    assert_eq!(pad.len(), 60_000);
    assert!(!dir.path().join("thumb.jpg.failed").exists());
}

#[test]
fn worker_preserves_undecodable_input_as_failed() {
    let dir = tempfile::tempdir().unwrap();
    let cache_path = dir.path().join("thumb.jpg");
    let garbage = b"not an image at all";

    let status = run_worker(garbage, &cache_path);
    assert!(!status.success());

    let failed = std::fs::read(dir.path().join("thumb.jpg.failed")).unwrap();
    assert_eq!(failed, garbage);
    assert!(!dir.path().join("thumb.jpg.pad").exists());
}

#[tokio::test]
async fn sandbox_contains_decoder_failures() {
    let dir = tempfile::tempdir().unwrap();
    let sandbox = ThumbnailSandbox::with_worker(worker_exe());

    let ok = sandbox
        .resize_and_pad(&png_bytes(), &dir.path().join("good.jpg"))
        .await
        .unwrap();
    assert!(ok);
    assert!(dir.path().join("good.jpg.pad").exists());

    let ok = sandbox
        .resize_and_pad(b"garbage", &dir.path().join("bad.jpg"))
        .await
        .unwrap();
    assert!(!ok);
    assert!(dir.path().join("bad.jpg.failed").exists());
    assert!(!dir.path().join("bad.jpg.pad").exists());
}

/// In-memory store recording uploads, for probe-before-upload assertions.
#[derive(Debug, Default)]
struct MemoryStore {
    objects: Mutex<HashSet<String>>,
    uploads: AtomicUsize,
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn exists(&self, _bucket: &str, key: &str) -> Result<bool> {
        Ok(self.objects.lock().unwrap().contains(key))
    }

    async fn upload(&self, _local_path: &Path, _bucket: &str, key: &str) -> Result<()> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        self.objects.lock().unwrap().insert(key.to_string());
        Ok(())
    }
}

#[tokio::test]
async fn cache_image_is_idempotent_and_uploads_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(url_path("/photo.jpg"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(png_bytes()))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let store = std::sync::Arc::new(MemoryStore::default());
    let cache = ImageCache::new(
        dir.path().into(),
        HttpFetcher::new().unwrap(),
        ThumbnailSandbox::with_worker(worker_exe()),
        Some(store.clone()),
        "private-bucket".into(),
    );

    let url = format!("{}/photo.jpg", server.uri());
    let first = cache.cache_image(&url).await.unwrap();
    assert!(first.ends_with(".jpg"));
    assert!(dir.path().join(format!("{first}.pad")).exists());
    assert_eq!(store.uploads.load(Ordering::SeqCst), 1);

    // Same URL again: the local artifact short-circuits everything.
    let second = cache.cache_image(&url).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(store.uploads.load(Ordering::SeqCst), 1);
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn cache_image_trusts_a_remote_hit_without_downloading() {
    let server = MockServer::start().await;
    // No GET mock: any fetch attempt would fail the test via None.

    let dir = tempfile::tempdir().unwrap();
    let store = std::sync::Arc::new(MemoryStore::default());
    let url = format!("{}/already-cached.jpg", server.uri());

    use sha2::{Digest, Sha256};
    let cache_fn = format!("{}.jpg", hex::encode(Sha256::digest(url.as_bytes())));
    store
        .objects
        .lock()
        .unwrap()
        .insert(format!("brave-today/cache/{cache_fn}.pad"));

    let cache = ImageCache::new(
        dir.path().into(),
        HttpFetcher::new().unwrap(),
        ThumbnailSandbox::with_worker(worker_exe()),
        Some(store.clone()),
        "private-bucket".into(),
    );

    assert_eq!(cache.cache_image(&url).await.unwrap(), cache_fn);
    assert_eq!(store.uploads.load(Ordering::SeqCst), 0);
    assert!(server.received_requests().await.unwrap().is_empty());
}
