//! Search results as they come off the wire.

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::ApiError;

/// One search hit. Only the fields the app reads are lifted out; the rest of
/// the object is kept in `extra`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PhotoRecord {
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, rename = "url_m")]
    pub image_url: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PhotoRecord {
    /// Title to show, with a stand-in for untitled photos.
    #[must_use]
    pub fn display_title(&self) -> &str {
        if self.title.trim().is_empty() {
            "(untitled)"
        } else {
            &self.title
        }
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Null => Ok(String::new()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {other}"
        ))),
    }
}

/// One page of a search response.
#[derive(Debug, Clone, PartialEq)]
pub struct PhotoPage {
    pub records: Vec<PhotoRecord>,
    /// Total number of pages the service says exist for this query.
    pub pages: u32,
}

impl PhotoPage {
    /// Extract `photos.photo` and `photos.pages` from a decoded response.
    ///
    /// # Errors
    /// [`ApiError::Service`] when the body reports `stat: "fail"`, and
    /// [`ApiError::Parse`] when the expected keys are missing or mistyped.
    pub fn from_response(body: &Value) -> Result<Self, ApiError> {
        if body.get("stat").and_then(Value::as_str) == Some("fail") {
            return Err(ApiError::Service {
                code: body.get("code").and_then(Value::as_i64).unwrap_or_default(),
                message: body
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown failure")
                    .to_string(),
            });
        }

        let photos = body
            .get("photos")
            .and_then(Value::as_object)
            .ok_or_else(|| ApiError::Parse("missing `photos` object".into()))?;
        let list = photos
            .get("photo")
            .ok_or_else(|| ApiError::Parse("missing `photos.photo` list".into()))?;
        let records: Vec<PhotoRecord> = serde_json::from_value(list.clone())
            .map_err(|err| ApiError::Parse(format!("bad `photos.photo` list: {err}")))?;
        let pages = page_count(photos.get("pages"));

        Ok(Self { records, pages })
    }
}

/// The service sends the page total as a number or as a numeric string.
/// Anything unreadable counts as zero pages, which stops the fetch loop.
fn page_count(raw: Option<&Value>) -> u32 {
    match raw {
        Some(Value::Number(n)) => n
            .as_u64()
            .map(|n| u32::try_from(n).unwrap_or(u32::MAX))
            .unwrap_or_else(|| {
                warn!(pages = %n, "page count is not a non-negative integer; treating as 0");
                0
            }),
        Some(Value::String(s)) => s.trim().parse().unwrap_or_else(|_| {
            warn!(pages = %s, "unparsable page count; treating as 0");
            0
        }),
        other => {
            warn!(pages = ?other, "missing page count; treating as 0");
            0
        }
    }
}
