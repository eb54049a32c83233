//! Shared scrape session: a redirect-following HTTP client with a 2-hour
//! in-memory response cache, used for image HEAD verification and
//! OpenGraph/meta image discovery.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use reqwest::Client;
use scraper::{Html, Selector};
use tracing::error;

use crate::error::Result;
use crate::fetch::USER_AGENT;

const SCRAPE_TIMEOUT: Duration = Duration::from_secs(5);
const CACHE_TTL: Duration = Duration::from_secs(2 * 60 * 60);
const CACHE_CAPACITY: u64 = 16_384;

/// HTTP statuses that are too common on article pages to be worth logging.
pub const SUPPRESSED_STATUSES: &[u16] = &[403, 429, 500, 502, 503];

#[derive(Debug, Clone)]
struct CachedResponse {
    status: u16,
    body: Option<Arc<String>>,
}

/// Concurrency-safe cached HTTP session.
#[derive(Clone)]
pub struct ScrapeSession {
    client: Client,
    cache: Cache<String, CachedResponse>,
}

impl std::fmt::Debug for ScrapeSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScrapeSession")
            .field("client", &self.client)
            .field("cached_responses", &self.cache.entry_count())
            .finish()
    }
}

impl ScrapeSession {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(SCRAPE_TIMEOUT)
            .build()?;
        let cache = Cache::builder()
            .max_capacity(CACHE_CAPACITY)
            .time_to_live(CACHE_TTL)
            .build();
        Ok(Self { client, cache })
    }

    /// HEAD a URL following redirects; returns the final status code.
    pub async fn head_status(&self, url: &str) -> Result<u16> {
        let key = format!("HEAD {url}");
        if let Some(hit) = self.cache.get(&key).await {
            return Ok(hit.status);
        }
        let response = self.client.head(url).send().await?;
        let status = response.status().as_u16();
        self.cache
            .insert(key, CachedResponse { status, body: None })
            .await;
        Ok(status)
    }

    /// GET a page, returning status and body text.
    pub async fn get_text(&self, url: &str) -> Result<(u16, Arc<String>)> {
        let key = format!("GET {url}");
        if let Some(CachedResponse {
            status,
            body: Some(body),
        }) = self.cache.get(&key).await
        {
            return Ok((status, body));
        }
        let response = self.client.get(url).send().await?;
        let status = response.status().as_u16();
        let body = Arc::new(response.text().await?);
        self.cache
            .insert(
                key,
                CachedResponse {
                    status,
                    body: Some(Arc::clone(&body)),
                },
            )
            .await;
        Ok((status, body))
    }
}

/// Discover a representative image from page metadata.
///
/// Head-only parsing, strategy order `page -> meta -> og -> dc`. Failures
/// with a suppressed HTTP status are silent; other statuses and empty
/// documents are logged. Transport errors are silent.
pub async fn discover_meta_image(session: &ScrapeSession, page_url: &str) -> Option<String> {
    let (status, body) = session.get_text(page_url).await.ok()?;
    if !(200..300).contains(&status) {
        if !SUPPRESSED_STATUSES.contains(&status) {
            error!("error parsing [{status}]: {page_url}");
        }
        return None;
    }
    if body.trim().is_empty() {
        error!("error parsing: {page_url} -- empty document");
        return None;
    }
    extract_meta_image(&body)
}

/// Run the metadata strategies over the document head.
pub fn extract_meta_image(body: &str) -> Option<String> {
    let head = head_fragment(body);
    let doc = Html::parse_document(head);

    let strategies = [
        ("link[rel=\"image_src\"]", "href"),
        ("meta[name=\"image\"]", "content"),
        ("meta[property=\"og:image\"]", "content"),
        ("meta[name=\"dc.image\"]", "content"),
    ];
    for (css, attr) in strategies {
        let selector = Selector::parse(css).expect("static selector");
        if let Some(value) = doc
            .select(&selector)
            .next()
            .and_then(|el| el.value().attr(attr))
        {
            let value = value.trim();
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }
    None
}

/// Truncate a document after its `</head>`, when one is present.
fn head_fragment(body: &str) -> &str {
    body.to_ascii_lowercase()
        .find("</head>")
        .map_or(body, |end| &body[..end])
}
