//! Cross-feed aggregation: sort, dedup + freshness, image verification and
//! caching, HTML scrub, variety-aware recency scoring.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Duration, Utc};
use futures::StreamExt;
use futures::stream;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use sha2::{Digest, Sha256};
use tracing::info;

use crate::download::download_feeds;
use crate::error::Result;
use crate::fetch::{HttpFetcher, Unshortener};
use crate::html;
use crate::image_cache::{CACHE_KEY_PREFIX, ImageCache};
use crate::item::NormalizedItem;
use crate::normalize::normalize_item;
use crate::registry::PublisherRecord;
use crate::report::RunReport;
use crate::sandbox::ThumbnailSandbox;
use crate::scrape::{ScrapeSession, discover_meta_image};
use crate::store::ObjectStore;

/// Non-product items older than this are dropped at aggregation time.
const FRESHNESS_WINDOW_DAYS: i64 = 60;

/// Percent-encoding set for URL paths: everything except unreserved
/// characters and the path separator. Already-encoded sequences are
/// re-encoded, which is what downstream consumers expect.
const PATH_QUOTE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'_')
    .remove(b'.')
    .remove(b'-')
    .remove(b'~')
    .remove(b'/');

/// Pipeline construction knobs, resolved by the caller from its config.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Worker fan-out width for all parallel stages.
    pub concurrency: usize,
    /// CDN base URL prefixed onto cached thumbnail filenames.
    pub pcdn_url_base: String,
    /// Private bucket thumbnails are uploaded to.
    pub private_bucket: String,
    /// Local thumbnail directory.
    pub cache_dir: PathBuf,
    /// Override for the sandbox worker binary; defaults to the current
    /// executable.
    pub worker_exe: Option<PathBuf>,
}

/// The aggregation pipeline. Built once per run; every stage drains before
/// the next begins, and the report is only touched between stages.
#[derive(Debug)]
pub struct FeedPipeline {
    options: PipelineOptions,
    fetcher: HttpFetcher,
    unshortener: Unshortener,
    scrape: ScrapeSession,
    image_cache: ImageCache,
    report: RunReport,
    /// Publishers whose feed survived download, by publisher id.
    publishers: HashMap<String, PublisherRecord>,
}

impl FeedPipeline {
    pub fn new(options: PipelineOptions, store: Option<Arc<dyn ObjectStore>>) -> Result<Self> {
        let fetcher = HttpFetcher::new()?;
        let sandbox = match &options.worker_exe {
            Some(exe) => ThumbnailSandbox::with_worker(exe.clone()),
            None => ThumbnailSandbox::new()?,
        };
        let image_cache = ImageCache::new(
            options.cache_dir.clone(),
            fetcher.clone(),
            sandbox,
            store,
            options.private_bucket.clone(),
        );
        Ok(Self {
            options,
            fetcher,
            unshortener: Unshortener::new()?,
            scrape: ScrapeSession::new()?,
            image_cache,
            report: RunReport::default(),
            publishers: HashMap::new(),
        })
    }

    pub fn report(&self) -> &RunReport {
        &self.report
    }

    /// Run the whole pipeline over the input mapping and return the scored
    /// output items, most recent first.
    pub async fn aggregate(
        &mut self,
        feeds: &HashMap<String, PublisherRecord>,
    ) -> Result<Vec<NormalizedItem>> {
        let mut entries = self.get_rss(feeds).await;
        entries.sort_by(|a, b| b.publish_time.cmp(&a.publish_time));
        let deduped = fixup_entries(entries);
        let with_images = self.check_images(deduped).await;
        let scrubbed = scrub_items(with_images);
        Ok(score_items(scrubbed))
    }

    /// Group the aggregated output by category.
    pub async fn aggregate_shards(
        &mut self,
        feeds: &HashMap<String, PublisherRecord>,
    ) -> Result<BTreeMap<String, Vec<NormalizedItem>>> {
        let items = self.aggregate(feeds).await?;
        Ok(shard_by_category(items))
    }

    /// Download every feed and normalize its entries, filling the report.
    async fn get_rss(&mut self, feeds: &HashMap<String, PublisherRecord>) -> Vec<NormalizedItem> {
        self.publishers.clear();
        self.report.feed_stats.clear();

        info!("downloading {} feeds", feeds.len());
        let downloads = download_feeds(&self.fetcher, feeds, self.options.concurrency).await;

        info!("normalizing items from {} feeds", downloads.len());
        let mut entries = Vec::new();
        for download in downloads {
            let Some(publisher) = feeds.get(&download.key) else {
                continue;
            };
            self.publishers
                .insert(publisher.publisher_id.clone(), publisher.clone());

            let batch: Vec<Option<NormalizedItem>> =
                stream::iter(download.entries.iter().take(publisher.max_entries))
                    .map(|raw| normalize_item(raw, publisher, &self.unshortener))
                    .buffered(self.options.concurrency.max(1))
                    .collect()
                    .await;

            let mut stats = download.stats;
            // One count per entry handed to normalization, kept or not.
            stats.size_after_insert = batch.len();
            self.report.feed_stats.insert(download.key, stats);

            entries.extend(batch.into_iter().flatten());
        }
        entries
    }

    /// Verify, backfill, and cache item images with bounded parallelism.
    async fn check_images(&self, items: Vec<NormalizedItem>) -> Vec<NormalizedItem> {
        let concurrency = self.options.concurrency.max(1);

        // `buffered` keeps the time-sorted item order that dedup and
        // scoring already established.
        info!("checking images for {} items", items.len());
        let verified: Vec<NormalizedItem> = stream::iter(items)
            .map(|item| self.verify_item_image(item))
            .buffered(concurrency)
            .collect()
            .await;

        info!("caching images for {} items", verified.len());
        stream::iter(verified)
            .map(|item| self.process_item_image(item))
            .buffered(concurrency)
            .collect()
            .await
    }

    /// HEAD-check a declared image; fall back to page metadata when the
    /// image was cleared (and the publisher opted in) or missing entirely.
    async fn verify_item_image(&self, mut item: NormalizedItem) -> NormalizedItem {
        let had_image = !item.img.is_empty();
        let mut cleared = false;

        if had_image {
            let candidate = ensure_scheme(&item.img);
            match self.scrape.head_status(&candidate).await {
                Ok(200) => item.img = candidate,
                Ok(_) | Err(_) => {
                    item.img.clear();
                    cleared = true;
                }
            }
        }

        let og_enabled = self
            .publishers
            .get(&item.publisher_id)
            .is_some_and(|p| p.og_images);
        if !had_image || (cleared && og_enabled) {
            item.img = discover_meta_image(&self.scrape, &item.url)
                .await
                .unwrap_or_default();
        }
        item
    }

    /// Replace a verified source image with its cached CDN form.
    async fn process_item_image(&self, mut item: NormalizedItem) -> NormalizedItem {
        item.padded_img = String::new();
        if item.img.is_empty() {
            return item;
        }
        match self.image_cache.cache_image(&item.img).await {
            Some(cache_fn) => {
                item.img = format!(
                    "{}/{CACHE_KEY_PREFIX}/{cache_fn}",
                    self.options.pcdn_url_base
                );
                item.padded_img = format!("{}.pad", item.img);
            }
            None => item.img.clear(),
        }
        item
    }
}

/// Whole-feed fixups on the time-sorted item list: freshness window,
/// URL canonicalization, first-wins dedup, title unescaping.
pub fn fixup_entries(sorted: Vec<NormalizedItem>) -> Vec<NormalizedItem> {
    let now_utc = Utc::now();
    let oldest = now_utc - Duration::days(FRESHNESS_WINDOW_DAYS);
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    for mut item in sorted {
        let url_hash = hex::encode(Sha256::digest(item.url.as_bytes()));
        let encoded_url = encode_url_path(&item.url);

        if item.content_type != "product"
            && (item.publish_time > now_utc || item.publish_time < oldest)
        {
            continue;
        }
        if !seen.insert(encoded_url.clone()) {
            continue;
        }

        item.title = html::unescape(&item.title);
        item.url = encoded_url;
        item.url_hash = url_hash;
        out.push(item);
    }
    out
}

/// Percent-encode the path component of a URL, leaving scheme, authority,
/// query, and fragment as they appear.
pub fn encode_url_path(url: &str) -> String {
    let after_scheme = url.find("://").map_or(0, |i| i + 3);
    let path_start = url[after_scheme..]
        .find('/')
        .map_or(url.len(), |i| after_scheme + i);
    let path_end = url[path_start..]
        .find(['?', '#'])
        .map_or(url.len(), |i| path_start + i);

    let mut encoded = String::with_capacity(url.len() + 8);
    encoded.push_str(&url[..path_start]);
    encoded
        .push_str(&utf8_percent_encode(&url[path_start..path_end], PATH_QUOTE).to_string());
    encoded.push_str(&url[path_end..]);
    encoded
}

/// Default a bare image URL onto http.
fn ensure_scheme(url: &str) -> String {
    if let Some(rest) = url.strip_prefix("//") {
        return format!("http://{rest}");
    }
    if url.contains("://") {
        url.to_string()
    } else {
        format!("http://{url}")
    }
}

/// Scrub every string field that ends up in the output document.
pub fn scrub_items(mut items: Vec<NormalizedItem>) -> Vec<NormalizedItem> {
    for item in &mut items {
        for field in [
            &mut item.category,
            &mut item.url,
            &mut item.url_hash,
            &mut item.title,
            &mut item.description,
            &mut item.content_type,
            &mut item.publisher_id,
            &mut item.publisher_name,
            &mut item.creative_instance_id,
            &mut item.img,
            &mut item.padded_img,
        ] {
            if !field.is_empty() {
                *field = html::scrub(field);
            }
        }
        if let Some(offers_category) = &mut item.offers_category
            && !offers_category.is_empty()
        {
            *offers_category = html::scrub(offers_category);
        }
    }
    items
}

/// Score the already-sorted list: natural-log recency times a per-publisher
/// variety factor that doubles with every further item from that source.
pub fn score_items(mut items: Vec<NormalizedItem>) -> Vec<NormalizedItem> {
    let now_utc = Utc::now();
    let mut variety_by_source: HashMap<String, f64> = HashMap::new();

    for item in &mut items {
        let seconds_ago =
            (now_utc - item.publish_time).num_milliseconds() as f64 / 1000.0;
        let recency = seconds_ago.ln();
        let last_variety = variety_by_source
            .get(&item.publisher_id)
            .copied()
            .unwrap_or(1.0);
        let variety = last_variety * 2.0;
        item.score = recency * variety;
        variety_by_source.insert(item.publisher_id.clone(), variety);
    }
    items
}

/// Group output items by category, preserving their order.
pub fn shard_by_category(items: Vec<NormalizedItem>) -> BTreeMap<String, Vec<NormalizedItem>> {
    let mut by_category: BTreeMap<String, Vec<NormalizedItem>> = BTreeMap::new();
    for item in items {
        by_category.entry(item.category.clone()).or_default().push(item);
    }
    by_category
}
