//! Publisher registry: the per-run record set driving the pipeline, the
//! CSV loader that produces it, and the client-facing sources list.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};
use sha2::{Digest, Sha256};
use tracing::warn;
use url::Url;

use crate::error::Result;
use crate::html;

/// One publisher feed, immutable for a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublisherRecord {
    pub category: String,
    pub default: bool,
    pub publisher_name: String,
    #[serde(default = "default_content_type")]
    pub content_type: String,
    pub publisher_domain: String,
    /// Hex SHA-256 of the canonical (https) feed URL; stable across runs.
    pub publisher_id: String,
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
    #[serde(default)]
    pub og_images: bool,
    #[serde(default)]
    pub creative_instance_id: String,
    /// Canonical feed URL. Stored under the original wire name `url`.
    #[serde(rename = "url", alias = "feed_url")]
    pub feed_url: String,
    /// Hosts a kept article link must belong to.
    #[serde(default, deserialize_with = "deserialize_domains")]
    pub destination_domains: Vec<String>,
    /// Forces items from this publisher to carry no image.
    #[serde(default)]
    pub filter_images: bool,
}

fn default_content_type() -> String {
    "article".to_string()
}

fn default_max_entries() -> usize {
    20
}

/// Accept either a semicolon-separated string or a list of hosts.
fn deserialize_domains<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Domains {
        Joined(String),
        List(Vec<String>),
    }

    Ok(match Domains::deserialize(deserializer)? {
        Domains::Joined(raw) => split_domains(&raw),
        Domains::List(list) => list,
    })
}

fn split_domains(raw: &str) -> Vec<String> {
    raw.split(';')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

/// Client-facing sources entry, sorted by publisher name in the output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRecord {
    pub enabled: bool,
    pub publisher_name: String,
    pub category: String,
    pub destination_domains: Vec<String>,
    pub site_url: String,
    pub feed_url: String,
    pub score: f64,
    pub publisher_id: String,
}

/// Hex SHA-256 of a canonical feed URL.
pub fn publisher_id(canonical_feed_url: &str) -> String {
    hex::encode(Sha256::digest(canonical_feed_url.as_bytes()))
}

/// Force the scheme of a feed URL to https.
pub fn canonical_feed_url(feed_url: &str) -> String {
    match Url::parse(feed_url) {
        Ok(mut parsed) => {
            if parsed.set_scheme("https").is_err() {
                warn!(url = feed_url, "cannot canonicalize feed url scheme");
                return feed_url.to_string();
            }
            parsed.to_string()
        }
        Err(err) => {
            warn!(url = feed_url, %err, "unparseable feed url");
            feed_url.to_string()
        }
    }
}

/// Both artifacts the registry loader emits.
#[derive(Debug)]
pub struct RegistryArtifacts {
    /// `feed_url -> PublisherRecord`, the pipeline's input mapping.
    pub by_url: BTreeMap<String, PublisherRecord>,
    /// Sources list sorted by publisher name.
    pub sources: Vec<SourceRecord>,
}

/// Load the registry CSV.
///
/// Columns: publisher_domain, feed_url, publisher_name, category,
/// default_enabled, score, og_images, content_type, creative_instance_id,
/// destination_domains. The first row is a header. Every cell is scrubbed
/// before use; rows without a publisher name are skipped.
pub fn load_registry_csv(path: &Path) -> Result<RegistryArtifacts> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)?;

    let mut by_url = BTreeMap::new();
    let mut sources = Vec::new();

    for row in reader.records() {
        let row = row?;
        let cell = |index: usize| html::scrub(row.get(index).unwrap_or("").trim());

        let publisher_name = cell(2);
        if publisher_name.is_empty() {
            // no title = no use
            continue;
        }

        let raw_feed_url = cell(1);
        let feed_url = canonical_feed_url(&raw_feed_url);
        let id = publisher_id(&feed_url);
        let og_images = cell(6) == "On";
        let default = cell(4) == "Enabled";
        let content_type = match cell(7) {
            value if value.is_empty() => default_content_type(),
            value => value,
        };

        let record = PublisherRecord {
            category: cell(3),
            default,
            publisher_name: publisher_name.clone(),
            content_type,
            publisher_domain: cell(0),
            publisher_id: id.clone(),
            max_entries: default_max_entries(),
            og_images,
            creative_instance_id: cell(8),
            feed_url: feed_url.clone(),
            destination_domains: split_domains(&cell(9)),
            filter_images: false,
        };
        by_url.insert(feed_url, record);

        sources.push(SourceRecord {
            enabled: default,
            publisher_name,
            category: cell(3),
            destination_domains: split_domains(&cell(9)),
            site_url: cell(0),
            feed_url: raw_feed_url,
            score: cell(5).parse().unwrap_or(0.0),
            publisher_id: id,
        });
    }

    sources.sort_by(|a, b| a.publisher_name.cmp(&b.publisher_name));

    Ok(RegistryArtifacts { by_url, sources })
}

/// Read the per-category feed input mapping (`feed_url -> PublisherRecord`).
pub fn load_feed_input(path: &Path) -> Result<HashMap<String, PublisherRecord>> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn publisher_id_is_sha256_of_canonical_url() {
        let id = publisher_id("https://example.test/feed.xml");
        assert_eq!(id.len(), 64);
        assert_eq!(
            id,
            hex::encode(Sha256::digest(b"https://example.test/feed.xml"))
        );
    }

    #[test]
    fn canonicalization_forces_https() {
        assert_eq!(
            canonical_feed_url("http://example.test/rss"),
            "https://example.test/rss"
        );
        assert_eq!(
            canonical_feed_url("https://example.test/rss"),
            "https://example.test/rss"
        );
    }

    #[test]
    fn csv_loader_builds_both_artifacts() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "publisher_domain,feed_url,publisher_name,category,default_enabled,score,og_images,content_type,creative_instance_id,destination_domains"
        )
        .unwrap();
        writeln!(
            file,
            "example.test,http://example.test/rss,Example <b>News</b>,Top News,Enabled,13.5,On,,,example.test;www.example.test"
        )
        .unwrap();
        writeln!(file, "empty.test,http://empty.test/rss,,Top News,Enabled,1,Off,,,empty.test").unwrap();

        let artifacts = load_registry_csv(file.path()).unwrap();
        assert_eq!(artifacts.by_url.len(), 1);
        assert_eq!(artifacts.sources.len(), 1);

        let record = &artifacts.by_url["https://example.test/rss"];
        assert_eq!(record.publisher_name, "Example News");
        assert_eq!(record.content_type, "article");
        assert_eq!(record.max_entries, 20);
        assert!(record.og_images);
        assert!(record.default);
        assert_eq!(
            record.destination_domains,
            vec!["example.test", "www.example.test"]
        );
        assert_eq!(record.publisher_id, publisher_id("https://example.test/rss"));

        let source = &artifacts.sources[0];
        assert!(source.enabled);
        assert_eq!(source.feed_url, "http://example.test/rss");
        assert_eq!(source.score, 13.5);
        assert_eq!(source.publisher_id, record.publisher_id);
    }

    #[test]
    fn destination_domains_deserialize_from_string_or_list() {
        let joined: PublisherRecord = serde_json::from_str(
            r#"{"category":"c","default":true,"publisher_name":"n","publisher_domain":"d",
                "publisher_id":"i","url":"https://x.test/f","destination_domains":"a.test;b.test"}"#,
        )
        .unwrap();
        assert_eq!(joined.destination_domains, vec!["a.test", "b.test"]);

        let listed: PublisherRecord = serde_json::from_str(
            r#"{"category":"c","default":true,"publisher_name":"n","publisher_domain":"d",
                "publisher_id":"i","url":"https://x.test/f","destination_domains":["a.test"]}"#,
        )
        .unwrap();
        assert_eq!(listed.destination_domains, vec!["a.test"]);
    }
}
