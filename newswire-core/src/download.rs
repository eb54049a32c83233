//! Parallel feed download: bounded fetch, https-then-http retry, parse.

use std::collections::HashMap;

use futures::StreamExt;
use futures::stream;
use tracing::error;
use url::Url;

use crate::error::NewsError;
use crate::fetch::HttpFetcher;
use crate::item::RawItem;
use crate::registry::PublisherRecord;
use crate::report::FeedStats;

/// Hard cap on a feed document.
const MAX_FEED_BYTES: usize = 10_000_000;

/// One successfully downloaded and parsed feed.
#[derive(Debug)]
pub struct FeedDownload {
    /// The registry feed URL (the key in the input mapping).
    pub key: String,
    pub stats: FeedStats,
    pub entries: Vec<RawItem>,
}

/// Download and parse every publisher feed with bounded parallelism.
///
/// Feeds that fail both the https fetch and the plain-http retry, fail to
/// parse, or parse to zero items are dropped without a report entry.
pub async fn download_feeds(
    fetcher: &HttpFetcher,
    publishers: &HashMap<String, PublisherRecord>,
    concurrency: usize,
) -> Vec<FeedDownload> {
    stream::iter(publishers.keys().cloned())
        .map(|feed_url| async move { download_feed(fetcher, &feed_url).await })
        .buffer_unordered(concurrency.max(1))
        .filter_map(|result| async move { result })
        .collect()
        .await
}

/// Fetch and parse a single feed, retrying once over plain http.
pub async fn download_feed(fetcher: &HttpFetcher, feed_url: &str) -> Option<FeedDownload> {
    let data = match fetcher.fetch_feed(feed_url, MAX_FEED_BYTES).await {
        Ok(data) => data,
        Err(_) => {
            // Some registries list https endpoints that only answer on http.
            let http_url = with_http_scheme(feed_url);
            match fetcher.fetch_feed(&http_url, MAX_FEED_BYTES).await {
                Ok(data) => data,
                Err(NewsError::Timeout) => return None,
                Err(NewsError::Http { .. }) => {
                    error!("failed to get feed: {http_url}");
                    return None;
                }
                Err(err) => {
                    error!("failed to get {http_url}: {err}");
                    return None;
                }
            }
        }
    };

    match feed_rs::parser::parse(&data[..]) {
        Ok(feed) => {
            let size_after_get = feed.entries.len();
            if size_after_get == 0 {
                return None;
            }
            Some(FeedDownload {
                key: feed_url.to_string(),
                stats: FeedStats {
                    size_after_get,
                    size_after_insert: 0,
                },
                entries: feed.entries.into_iter().map(RawItem::from).collect(),
            })
        }
        Err(err) => {
            error!("feed failed to parse: {feed_url} -- {err}");
            None
        }
    }
}

fn with_http_scheme(feed_url: &str) -> String {
    match Url::parse(feed_url) {
        Ok(mut parsed) => {
            if parsed.set_scheme("http").is_err() {
                return feed_url.to_string();
            }
            parsed.to_string()
        }
        Err(_) => feed_url.to_string(),
    }
}
