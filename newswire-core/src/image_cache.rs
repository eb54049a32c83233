//! Content-addressed thumbnail cache: local artifacts, remote existence
//! probes, bounded source fetch, sandboxed resize, private-bucket upload.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::{error, warn};

use crate::error::NewsError;
use crate::fetch::HttpFetcher;
use crate::sandbox::ThumbnailSandbox;
use crate::scrape::SUPPRESSED_STATUSES;
use crate::store::ObjectStore;

/// Hard cap on a source image download.
const MAX_IMAGE_BYTES: usize = 5_000_000;

/// Key prefix of cached thumbnails in the object store and on the CDN.
pub const CACHE_KEY_PREFIX: &str = "brave-today/cache";

#[derive(Debug, Clone)]
pub struct ImageCache {
    cache_dir: PathBuf,
    fetcher: HttpFetcher,
    sandbox: ThumbnailSandbox,
    store: Option<Arc<dyn ObjectStore>>,
    bucket: String,
}

impl ImageCache {
    /// `store` is `None` when uploads (and remote probes) are disabled;
    /// `bucket` is the private thumbnail bucket.
    pub fn new(
        cache_dir: PathBuf,
        fetcher: HttpFetcher,
        sandbox: ThumbnailSandbox,
        store: Option<Arc<dyn ObjectStore>>,
        bucket: String,
    ) -> Self {
        Self {
            cache_dir,
            fetcher,
            sandbox,
            store,
            bucket,
        }
    }

    /// Ensure a padded thumbnail for `url` exists locally or remotely.
    ///
    /// Returns the cache filename (`<sha256>.jpg`) on success, `None` when
    /// the image should be dropped for this run. Transient store errors
    /// also return `None`, leaving the next run to retry.
    pub async fn cache_image(&self, url: &str) -> Option<String> {
        let cache_fn = format!("{}.jpg", hex::encode(Sha256::digest(url.as_bytes())));
        let cache_path = self.cache_dir.join(&cache_fn);
        let pad_path = pad_artifact_path(&cache_path);

        if tokio::fs::try_exists(&pad_path).await.unwrap_or(false) {
            return Some(cache_fn);
        }

        let remote_key = format!("{CACHE_KEY_PREFIX}/{cache_fn}.pad");
        if let Some(store) = &self.store {
            match store.exists(&self.bucket, &remote_key).await {
                Ok(true) => return Some(cache_fn),
                Ok(false) => {}
                Err(err) => {
                    warn!("thumbnail existence probe failed, will retry next run: {err}");
                    return None;
                }
            }
        }

        let content = match self.fetcher.fetch_image(url, MAX_IMAGE_BYTES).await {
            Ok(content) => content,
            Err(NewsError::Timeout | NewsError::TooLarge { .. }) => return None,
            Err(NewsError::Http { status, .. }) => {
                if !SUPPRESSED_STATUSES.contains(&status) {
                    error!("failed to get image [{status}]: {url}");
                }
                return None;
            }
            Err(err) => {
                error!("failed to get image: {url} -- {err}");
                return None;
            }
        };

        match self.sandbox.resize_and_pad(&content, &cache_path).await {
            Ok(true) => {}
            Ok(false) | Err(_) => {
                error!("failed to cache image {url}");
                return None;
            }
        }

        if let Some(store) = &self.store
            && let Err(err) = store.upload(&pad_path, &self.bucket, &remote_key).await
        {
            error!("failed to upload thumbnail {cache_fn}: {err}");
            return None;
        }

        Some(cache_fn)
    }
}

/// The `.pad` artifact path for a cache file.
pub fn pad_artifact_path(cache_path: &Path) -> PathBuf {
    let mut os: OsString = cache_path.as_os_str().to_os_string();
    os.push(".pad");
    PathBuf::from(os)
}
