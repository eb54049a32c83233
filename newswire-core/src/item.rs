//! Item records: the parser's per-entry bag and the normalized output form.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Attached media file, carried through for audio publishers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Enclosure {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<u64>,
}

/// Inline entry content with its declared media type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawContent {
    pub value: String,
    pub content_type: String,
}

/// The parser's opaque per-entry bag. Fields mirror what heterogeneous
/// feeds actually carry; almost everything is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawItem {
    pub title: Option<String>,
    pub link: Option<String>,
    pub url: Option<String>,
    pub updated: Option<DateTime<Utc>>,
    pub published: Option<DateTime<Utc>>,
    /// URL of the first media thumbnail, when one is declared.
    pub media_thumbnail: Option<String>,
    /// URL of the first media content element, when it carries one.
    pub media_content: Option<String>,
    pub summary: Option<String>,
    pub content: Option<RawContent>,
    #[serde(rename = "urlToImage")]
    pub url_to_image: Option<String>,
    pub image: Option<String>,
    #[serde(default)]
    pub enclosures: Vec<Enclosure>,
    pub category: Option<String>,
    pub description: Option<String>,
}

impl From<feed_rs::model::Entry> for RawItem {
    fn from(entry: feed_rs::model::Entry) -> Self {
        let link = entry
            .links
            .iter()
            .find(|l| matches!(l.rel.as_deref(), None | Some("alternate")))
            .or_else(|| entry.links.first())
            .map(|l| l.href.clone());

        let mut enclosures: Vec<Enclosure> = entry
            .links
            .iter()
            .filter(|l| l.rel.as_deref() == Some("enclosure"))
            .map(|l| Enclosure {
                url: l.href.clone(),
                content_type: l.media_type.clone(),
                length: l.length,
            })
            .collect();
        // RSS <enclosure> tags surface as media content in the parser model.
        enclosures.extend(
            entry
                .media
                .iter()
                .flat_map(|m| m.content.iter())
                .filter(|c| {
                    c.content_type
                        .as_ref()
                        .is_some_and(|mime| mime.ty() == "audio")
                })
                .filter_map(|c| {
                    c.url.as_ref().map(|url| Enclosure {
                        url: url.to_string(),
                        content_type: c.content_type.as_ref().map(|m| m.to_string()),
                        length: c.size,
                    })
                }),
        );

        let media_thumbnail = entry
            .media
            .iter()
            .flat_map(|m| m.thumbnails.iter())
            .next()
            .map(|t| t.image.uri.clone());
        let media_content = entry
            .media
            .iter()
            .flat_map(|m| m.content.iter())
            .next()
            .and_then(|c| c.url.as_ref().map(|u| u.to_string()));

        let summary = entry.summary.map(|text| text.content);

        Self {
            title: entry.title.map(|text| text.content),
            link,
            url: None,
            updated: entry.updated,
            published: entry.published,
            media_thumbnail,
            media_content,
            description: summary.clone(),
            summary,
            content: entry.content.map(|content| RawContent {
                value: content.body.unwrap_or_default(),
                content_type: content.content_type.essence().to_string(),
            }),
            url_to_image: None,
            image: None,
            enclosures,
            category: entry.categories.first().map(|c| c.term.clone()),
        }
    }
}

/// Output record for one aggregated item.
///
/// `publish_time` serializes as `YYYY-MM-DD HH:MM:SS` in UTC; `url_hash` is
/// the hex SHA-256 of the pre-encoding URL; `padded_img` is always present,
/// possibly empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedItem {
    pub category: String,
    #[serde(with = "publish_time_format")]
    pub publish_time: DateTime<Utc>,
    pub url: String,
    #[serde(default)]
    pub url_hash: String,
    pub title: String,
    pub description: String,
    pub content_type: String,
    pub publisher_id: String,
    pub publisher_name: String,
    pub creative_instance_id: String,
    #[serde(default)]
    pub img: String,
    #[serde(default)]
    pub padded_img: String,
    #[serde(default)]
    pub score: f64,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "opt_publish_time_format"
    )]
    pub date_live_from: Option<DateTime<Utc>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "opt_publish_time_format"
    )]
    pub date_live_to: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enclosures: Option<Vec<Enclosure>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offers_category: Option<String>,
}

pub(crate) const PUBLISH_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

mod publish_time_format {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(
        time: &DateTime<Utc>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&time.format(super::PUBLISH_TIME_FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&raw, super::PUBLISH_TIME_FORMAT)
            .map(|naive| naive.and_utc())
            .map_err(Error::custom)
    }
}

mod opt_publish_time_format {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(
        time: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match time {
            Some(time) => serializer.collect_str(&time.format(super::PUBLISH_TIME_FORMAT)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        raw.map(|raw| {
            NaiveDateTime::parse_from_str(&raw, super::PUBLISH_TIME_FORMAT)
                .map(|naive| naive.and_utc())
                .map_err(Error::custom)
        })
        .transpose()
    }
}
