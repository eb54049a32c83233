//! Per-item normalization: the ordered gate sequence that turns a raw feed
//! entry into an output record, or drops it.

use tracing::error;
use url::Url;

use crate::fetch::Unshortener;
use crate::html;
use crate::item::{NormalizedItem, RawItem};
use crate::profanity;
use crate::registry::PublisherRecord;

/// Maximum description length in code points.
const MAX_DESCRIPTION_CHARS: usize = 500;

/// Normalize one raw entry against its owning publisher.
///
/// Every gate drops the item silently by returning `None`. Gate order is
/// fixed: timestamp, link, domain, profanity, unshorten, image discovery,
/// title, description, content-type extras, image filter.
pub async fn normalize_item(
    item: &RawItem,
    publisher: &PublisherRecord,
    unshortener: &Unshortener,
) -> Option<NormalizedItem> {
    // Timestamp: updated wins over published; naive values are taken as UTC
    // by the parser.
    let publish_time = item.updated.or(item.published)?;

    let link = item.link.as_deref().or(item.url.as_deref())?;

    // The article must land on an allow-listed host.
    if publisher.destination_domains.is_empty() {
        return None;
    }
    let host = Url::parse(link)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_default();
    if !publisher.destination_domains.iter().any(|d| d == &host) {
        return None;
    }

    if profanity::contains_profanity(item.title.as_deref().unwrap_or_default()) {
        return None;
    }

    let url = match unshortener.unshorten(link).await {
        Ok(url) => url,
        Err(err) if err.is_silent_network_failure() => return None,
        Err(err) => {
            error!("unshortener failed: {link} -- {err}");
            return None;
        }
    };

    let img = discover_image(item);

    let title = item.title.as_deref()?;
    let title = html::strip_tags(title);

    let description = item
        .description
        .as_deref()
        .filter(|d| !d.is_empty())
        .map(html::strip_tags)
        .unwrap_or_default();
    let description: String = description.chars().take(MAX_DESCRIPTION_CHARS).collect();

    let enclosures = (publisher.content_type == "audio").then(|| item.enclosures.clone());
    let offers_category = (publisher.content_type == "product")
        .then(|| item.category.clone().unwrap_or_default());

    let img = if publisher.filter_images { String::new() } else { img };

    Some(NormalizedItem {
        category: publisher.category.clone(),
        publish_time,
        url,
        url_hash: String::new(),
        title,
        description,
        content_type: publisher.content_type.clone(),
        publisher_id: publisher.publisher_id.clone(),
        publisher_name: publisher.publisher_name.clone(),
        creative_instance_id: publisher.creative_instance_id.clone(),
        img,
        padded_img: String::new(),
        score: 0.0,
        date_live_from: None,
        date_live_to: None,
        enclosures,
        offers_category,
    })
}

/// Pick the representative image for an entry; first matching source wins.
///
/// A present-but-srcless `<img>` in the summary or content still claims the
/// branch and yields an empty image, matching how lenient parsers treat
/// malformed markup.
pub fn discover_image(item: &RawItem) -> String {
    if let Some(url) = &item.media_thumbnail {
        return url.clone();
    }
    if let Some(url) = &item.media_content {
        return url.clone();
    }
    if let Some(summary) = &item.summary
        && let Some(src) = html::first_img_src(summary)
    {
        return src.unwrap_or_default();
    }
    if let Some(url) = &item.url_to_image {
        return url.clone();
    }
    if let Some(url) = &item.image {
        return url.clone();
    }
    if let Some(content) = &item.content
        && content.content_type == "text/html"
        && let Some(src) = html::first_img_src(&content.value)
    {
        return src.unwrap_or_default();
    }
    String::new()
}
