//! Full-pipeline image flow against the real sandbox binary: a declared
//! thumbnail is verified, resized out of process, and rewritten to its CDN
//! form; a poisoned image degrades to an empty one without losing the item.

use std::collections::HashMap;
use std::io::Cursor;
use std::path::PathBuf;

use chrono::{Duration, Utc};
use image::{DynamicImage, RgbImage};
use newswire_core::aggregate::{FeedPipeline, PipelineOptions};
use newswire_core::registry::{PublisherRecord, publisher_id};
use sha2::{Digest, Sha256};
use wiremock::matchers::{method, path as url_path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn worker_exe() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_newswire"))
}

fn publisher(feed_url: &str) -> PublisherRecord {
    PublisherRecord {
        category: "Top News".into(),
        default: true,
        publisher_name: "Example News".into(),
        content_type: "article".into(),
        publisher_domain: "127.0.0.1".into(),
        publisher_id: publisher_id(feed_url),
        max_entries: 20,
        og_images: false,
        creative_instance_id: String::new(),
        feed_url: feed_url.into(),
        destination_domains: vec!["127.0.0.1".into()],
        filter_images: false,
    }
}

fn options(cache_dir: PathBuf) -> PipelineOptions {
    PipelineOptions {
        concurrency: 2,
        pcdn_url_base: "https://pcdn.test".into(),
        private_bucket: "private-bucket".into(),
        cache_dir,
        worker_exe: Some(worker_exe()),
    }
}

fn png_bytes() -> Vec<u8> {
    let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(64, 48, image::Rgb([10, 120, 200])));
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    bytes
}

fn feed_with_thumbnail(base: &str, image_path: &str) -> String {
    format!(
        "<?xml version=\"1.0\"?><rss version=\"2.0\" xmlns:media=\"http://search.yahoo.com/mrss/\">\
         <channel><title>t</title><item><title>Story</title><link>{base}/story</link>\
         <pubDate>{}</pubDate><media:thumbnail url=\"{base}{image_path}\"/></item></channel></rss>",
        (Utc::now() - Duration::hours(1)).to_rfc2822()
    )
}

async fn mount_feed(server: &MockServer, body: String) {
    Mock::given(method("GET"))
        .and(url_path("/feed.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
    Mock::given(method("HEAD"))
        .and(url_path("/story"))
        .respond_with(ResponseTemplate::new(200))
        .mount(server)
        .await;
}

#[tokio::test]
async fn verified_images_are_cached_and_rewritten_to_the_cdn() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_feed(&server, feed_with_thumbnail(&base, "/img.jpg")).await;
    Mock::given(method("HEAD"))
        .and(url_path("/img.jpg"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(url_path("/img.jpg"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(png_bytes()))
        .mount(&server)
        .await;

    let feed_url = format!("{base}/feed.xml");
    let mut feeds = HashMap::new();
    feeds.insert(feed_url.clone(), publisher(&feed_url));

    let cache_dir = tempfile::tempdir().unwrap();
    let mut pipeline = FeedPipeline::new(options(cache_dir.path().into()), None).unwrap();
    let items = pipeline.aggregate(&feeds).await.unwrap();

    assert_eq!(items.len(), 1);
    let image_url = format!("{base}/img.jpg");
    let cache_fn = format!("{}.jpg", hex::encode(Sha256::digest(image_url.as_bytes())));
    assert_eq!(
        items[0].img,
        format!("https://pcdn.test/brave-today/cache/{cache_fn}")
    );
    assert_eq!(items[0].padded_img, format!("{}.pad", items[0].img));

    let pad = std::fs::read(cache_dir.path().join(format!("{cache_fn}.pad"))).unwrap();
    assert_eq!(pad.len(), 250_000);
}

#[tokio::test]
async fn undecodable_images_leave_the_item_with_an_empty_image() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_feed(&server, feed_with_thumbnail(&base, "/poison.jpg")).await;
    Mock::given(method("HEAD"))
        .and(url_path("/poison.jpg"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(url_path("/poison.jpg"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"not an image".to_vec()))
        .mount(&server)
        .await;

    let feed_url = format!("{base}/feed.xml");
    let mut feeds = HashMap::new();
    feeds.insert(feed_url.clone(), publisher(&feed_url));

    let cache_dir = tempfile::tempdir().unwrap();
    let mut pipeline = FeedPipeline::new(options(cache_dir.path().into()), None).unwrap();
    let items = pipeline.aggregate(&feeds).await.unwrap();

    // The decoder crash stays inside the sandbox; the item survives with no
    // image and the original bytes are preserved for inspection.
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].img, "");
    assert_eq!(items[0].padded_img, "");

    let image_url = format!("{base}/poison.jpg");
    let cache_fn = format!("{}.jpg", hex::encode(Sha256::digest(image_url.as_bytes())));
    let failed = std::fs::read(cache_dir.path().join(format!("{cache_fn}.failed"))).unwrap();
    assert_eq!(failed, b"not an image");
    assert!(!cache_dir.path().join(format!("{cache_fn}.pad")).exists());
}
