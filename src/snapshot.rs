use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageType {
    #[default]
    Pricing,
    Features,
}

impl PageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PageType::Pricing => "pricing",
            PageType::Features => "features",
        }
    }
}

/// Anything that is not `"features"` is treated as a pricing page.
impl From<&str> for PageType {
    fn from(s: &str) -> Self {
        if s.trim().eq_ignore_ascii_case("features") {
            PageType::Features
        } else {
            PageType::Pricing
        }
    }
}

impl fmt::Display for PageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured content captured by the scraper.
///
/// Every field is optional in the stored payload and defaults to its empty value.
/// Fields the detector does not know about are kept in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotContent {
    #[serde(deserialize_with = "lenient_text")]
    pub price: String,
    #[serde(deserialize_with = "lenient_text")]
    pub availability: String,
    #[serde(deserialize_with = "lenient_labels")]
    pub features: Vec<String>,
    #[serde(deserialize_with = "lenient_list")]
    pub pricing_blocks: Vec<Value>,
    #[serde(deserialize_with = "lenient_text")]
    pub text_content: String,
    #[serde(deserialize_with = "lenient_text")]
    pub title: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentStatus {
    Parsed,
    Missing,
    Malformed,
}

impl SnapshotContent {
    /// Read a `raw_data` column. Parse failures yield empty content flagged as
    /// [`ContentStatus::Malformed`].
    pub fn parse(raw: Option<&str>) -> (SnapshotContent, ContentStatus) {
        let raw = match raw.map(str::trim) {
            Some(raw) if !raw.is_empty() => raw,
            _ => return (SnapshotContent::default(), ContentStatus::Missing),
        };
        match serde_json::from_str::<Value>(raw) {
            Ok(value) => SnapshotContent::from_value(value),
            Err(e) => {
                tracing::debug!("raw_data is not JSON: {}", e);
                (SnapshotContent::default(), ContentStatus::Malformed)
            }
        }
    }

    /// Accepts either a JSON object or a string holding an encoded JSON object.
    pub fn from_value(value: Value) -> (SnapshotContent, ContentStatus) {
        match value {
            Value::Null => (SnapshotContent::default(), ContentStatus::Missing),
            Value::Object(_) => match serde_json::from_value(value) {
                Ok(content) => (content, ContentStatus::Parsed),
                Err(e) => {
                    tracing::debug!("raw_data object rejected: {}", e);
                    (SnapshotContent::default(), ContentStatus::Malformed)
                }
            },
            Value::String(encoded) => match serde_json::from_str::<Value>(&encoded) {
                Ok(inner @ Value::Object(_)) => SnapshotContent::from_value(inner),
                _ => (SnapshotContent::default(), ContentStatus::Malformed),
            },
            _ => (SnapshotContent::default(), ContentStatus::Malformed),
        }
    }

    /// Text compared for messaging changes: `text_content`, else `title`.
    pub fn messaging_text(&self) -> &str {
        if self.text_content.is_empty() {
            &self.title
        } else {
            &self.text_content
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub id: i64,
    pub page_id: i64,
    pub page_type: PageType,
    pub price: String,
    pub availability: String,
    pub scraped_at: DateTime<Utc>,
    pub content: SnapshotContent,
    pub content_status: ContentStatus,
}

fn scalar_text(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

fn lenient_text<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(scalar_text(Value::deserialize(d)?).unwrap_or_default())
}

fn lenient_labels<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Array(items) => items.into_iter().filter_map(scalar_text).collect(),
        _ => Vec::new(),
    })
}

fn lenient_list<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<Value>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Array(items) => items,
        _ => Vec::new(),
    })
}
