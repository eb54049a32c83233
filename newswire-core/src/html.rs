//! Lenient HTML helpers: plain-text extraction, `<img src>` discovery, and
//! the output scrubber.

use scraper::{Html, Selector};

/// Extract the concatenated text content of an HTML fragment.
pub fn strip_tags(fragment: &str) -> String {
    let doc = Html::parse_fragment(fragment);
    doc.root_element().text().collect()
}

/// Find the first `<img>` element in an HTML fragment.
///
/// Returns `None` when the fragment has no `<img>` at all, `Some(None)` when
/// the first `<img>` carries no `src` attribute, and `Some(Some(url))`
/// otherwise. Callers treat the middle case as "image branch taken, empty
/// image".
pub fn first_img_src(fragment: &str) -> Option<Option<String>> {
    let doc = Html::parse_fragment(fragment);
    let selector = Selector::parse("img").expect("static selector");
    let img = doc.select(&selector).next()?;
    Some(img.value().attr("src").map(|src| src.to_string()))
}

/// Strip all tags from a string destined for the output feed, escaping what
/// remains, then undo the escaping of bare ampersands.
pub fn scrub(value: &str) -> String {
    ammonia::Builder::empty()
        .clean(value)
        .to_string()
        .replace("&amp;", "&")
}

/// Decode HTML entities (`&eacute;`, `&#39;`, ...) in a title.
pub fn unescape(value: &str) -> String {
    html_escape::decode_html_entities(value).into_owned()
}
