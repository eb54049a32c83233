use std::time::Duration;

use reqwest::{Client, StatusCode, header};

use crate::error::{NewsError, Result};

/// Browser User-Agent for every outbound request. A surprising number of
/// publishers serve bot traffic an HTML interstitial instead of the feed.
pub const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/87.0.4280.49 Safari/537.36";

/// Total request timeout for feed and image fetches.
const FETCH_TIMEOUT: Duration = Duration::from_secs(10);
/// Total timeout for redirect-chain resolution.
const UNSHORTEN_TIMEOUT: Duration = Duration::from_secs(5);

/// Size- and time-bounded HTTP fetcher.
///
/// Feed fetches never follow redirects (a 3xx is a failure); image fetches
/// may. Both cap the response body: a declared `Content-Length` above the
/// cap rejects up front, and the stream is aborted as soon as the
/// accumulated body crosses it.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    feed_client: Client,
    image_client: Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        let feed_client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(FETCH_TIMEOUT)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        let image_client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(FETCH_TIMEOUT)
            .build()?;
        Ok(Self {
            feed_client,
            image_client,
        })
    }

    /// Fetch a feed document. Redirects are not followed.
    pub async fn fetch_feed(&self, url: &str, max_bytes: usize) -> Result<Vec<u8>> {
        get_with_max_size(&self.feed_client, url, max_bytes).await
    }

    /// Fetch an image, following redirects.
    pub async fn fetch_image(&self, url: &str, max_bytes: usize) -> Result<Vec<u8>> {
        get_with_max_size(&self.image_client, url, max_bytes).await
    }
}

/// Streaming GET that rejects non-200 responses and enforces `max_bytes`
/// both on the declared length and on the received byte count.
pub async fn get_with_max_size(client: &Client, url: &str, max_bytes: usize) -> Result<Vec<u8>> {
    let mut response = client.get(url).send().await?;

    let status = response.status();
    if status != StatusCode::OK {
        return Err(NewsError::Http {
            status: status.as_u16(),
            url: url.to_string(),
        });
    }

    if let Some(declared) = response
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok())
        && declared > max_bytes
    {
        return Err(NewsError::TooLarge { max_bytes });
    }

    let mut content = Vec::new();
    while let Some(chunk) = response.chunk().await? {
        content.extend_from_slice(&chunk);
        if content.len() > max_bytes {
            return Err(NewsError::TooLarge { max_bytes });
        }
    }
    Ok(content)
}

/// Resolves short-link redirect chains to the final article URL.
#[derive(Debug, Clone)]
pub struct Unshortener {
    client: Client,
}

impl Unshortener {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(UNSHORTEN_TIMEOUT)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;
        Ok(Self { client })
    }

    /// Follow redirects and return the final URL. The response status does
    /// not matter; only transport-level failures are errors.
    pub async fn unshorten(&self, url: &str) -> Result<String> {
        let response = self.client.head(url).send().await?;
        Ok(response.url().to_string())
    }
}
