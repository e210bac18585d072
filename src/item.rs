//! Items captured by the remote service.
//!
//! The service records every HTTP request, email and DNS lookup sent to a
//! token. Items are only ever fetched, never created locally.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// What kind of traffic an item records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    /// An HTTP request.
    Web,
    /// An email delivered to `{token}@email.webhook.site`.
    Email,
    /// A DNS lookup of `*.{token}.dnshook.site`.
    Dns,
    /// Anything the service adds in the future.
    #[serde(other)]
    Other,
}

impl ItemKind {
    /// The name the service uses in `type:` search queries.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ItemKind::Web => "web",
            ItemKind::Email => "email",
            ItemKind::Dns => "dns",
            ItemKind::Other => "other",
        }
    }
}

impl std::fmt::Display for ItemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind-specific part of a captured item.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Payload {
    /// HTTP request details.
    Http {
        /// Request method.
        method: String,
        /// Full request URL.
        url: Option<String>,
        /// Parsed query string.
        query: BTreeMap<String, String>,
        /// Client IP.
        ip: Option<String>,
    },
    /// Email bodies as extracted by the service.
    Email {
        /// Plain-text body.
        text_content: Option<String>,
        /// HTML body.
        html_content: Option<String>,
    },
    /// DNS lookup details.
    Dns {
        /// Resolver IP.
        ip: Option<String>,
        /// Queried hostname.
        hostname: Option<String>,
    },
    /// Unknown item kind.
    Other,
}

/// One item captured by the service for a token.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CapturedItem {
    /// Unique item identifier.
    pub id: String,
    /// Kind of traffic.
    pub kind: ItemKind,
    /// When the service recorded the item (second precision).
    pub created_at: DateTime<Utc>,
    /// Service-side ordering value; breaks ties within the same second.
    pub sequence: i64,
    /// Headers, lowercase names, every value kept.
    pub headers: BTreeMap<String, Vec<String>>,
    /// Raw body (the full MIME message for emails).
    pub content: Option<String>,
    /// Kind-specific fields.
    pub payload: Payload,
}

impl CapturedItem {
    /// Key used to order items; larger is newer.
    #[must_use]
    pub fn order_key(&self) -> (DateTime<Utc>, i64) {
        (self.created_at, self.sequence)
    }

    /// Returns the first value of a header (case-insensitive).
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// Returns the HTTP method for web items.
    #[must_use]
    pub fn method(&self) -> Option<&str> {
        match &self.payload {
            Payload::Http { method, .. } => Some(method),
            _ => None,
        }
    }

    /// Decodes one entry of the service's item list.
    ///
    /// Missing optional fields default to empty; a missing identifier or an
    /// unparseable timestamp rejects the entry.
    pub(crate) fn from_json(value: Value) -> Result<Self, String> {
        let raw: RawItem =
            serde_json::from_value(value).map_err(|e| format!("unexpected item shape: {e}"))?;

        let id = raw
            .uuid
            .filter(|id| !id.is_empty())
            .ok_or_else(|| "item has no uuid".to_string())?;
        let created_at = raw
            .created_at
            .as_deref()
            .and_then(parse_timestamp)
            .ok_or_else(|| format!("item {id} has an unreadable created_at"))?;

        let kind = raw.kind.unwrap_or(ItemKind::Web);
        let payload = match kind {
            ItemKind::Web => Payload::Http {
                method: raw.method.unwrap_or_else(|| "UNKNOWN".into()),
                url: raw.url,
                query: string_map(&raw.query),
                ip: raw.ip,
            },
            ItemKind::Email => Payload::Email {
                text_content: raw.text_content,
                html_content: raw.html_content,
            },
            ItemKind::Dns => Payload::Dns {
                ip: raw.ip,
                hostname: raw.hostname,
            },
            ItemKind::Other => Payload::Other,
        };

        Ok(Self {
            id,
            kind,
            created_at,
            sequence: raw.sorting.unwrap_or(0),
            headers: header_map(&raw.headers),
            content: raw.content,
            payload,
        })
    }
}

/// Wire shape of an item. The service encodes empty maps as `[]`, so the map
/// fields stay untyped until converted.
#[derive(Debug, Deserialize)]
struct RawItem {
    uuid: Option<String>,
    #[serde(rename = "type")]
    kind: Option<ItemKind>,
    created_at: Option<String>,
    sorting: Option<i64>,
    method: Option<String>,
    url: Option<String>,
    ip: Option<String>,
    hostname: Option<String>,
    content: Option<String>,
    text_content: Option<String>,
    html_content: Option<String>,
    #[serde(default)]
    headers: Value,
    #[serde(default)]
    query: Value,
}

/// Parses `2024-01-31 12:00:00` (UTC) or RFC 3339.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn header_map(value: &Value) -> BTreeMap<String, Vec<String>> {
    let Some(object) = value.as_object() else {
        return BTreeMap::new();
    };

    object
        .iter()
        .map(|(name, values)| {
            let values = match values {
                Value::Array(items) => items.iter().filter_map(scalar_string).collect(),
                other => scalar_string(other).into_iter().collect(),
            };
            (name.to_ascii_lowercase(), values)
        })
        .collect()
}

fn string_map(value: &Value) -> BTreeMap<String, String> {
    let Some(object) = value.as_object() else {
        return BTreeMap::new();
    };

    object
        .iter()
        .filter_map(|(k, v)| scalar_string(v).map(|v| (k.clone(), v)))
        .collect()
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
