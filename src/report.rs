//! JSON records of wait outcomes for tool-routing callers.
//!
//! A report carries `matched` and `elapsed_seconds`, plus the match data or
//! an `error: {kind, message}` object. It never contains a backtrace.

use crate::item::{CapturedItem, Payload};
use crate::parser::EmailMatch;
use crate::poller::WaitResult;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::time::Duration;

const UNKNOWN: &str = "Unknown";

/// Serializable summary of a [`WaitResult`].
///
/// # Example
///
/// ```
/// use webhook_sync::{CapturedItem, WaitReport, WaitResult};
/// use std::time::Duration;
///
/// let result: WaitResult<CapturedItem> = WaitResult::TimedOut {
///     elapsed: Duration::from_millis(30_004),
/// };
/// let report = WaitReport::from_request(&result);
///
/// assert!(!report.matched);
/// assert_eq!(
///     report.to_json(),
///     serde_json::json!({ "matched": false, "elapsed_seconds": 30.004 })
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WaitReport {
    /// Whether a new item arrived in time.
    pub matched: bool,
    /// Seconds spent waiting, millisecond resolution.
    pub elapsed_seconds: f64,
    /// Match data or error details.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl WaitReport {
    /// Reports the outcome of a request wait.
    #[must_use]
    pub fn from_request(result: &WaitResult<CapturedItem>) -> Self {
        Self::build(result, |item| {
            let mut fields = Map::new();
            fields.insert("request".into(), request_fields(item));
            fields
        })
    }

    /// Reports the outcome of an email wait.
    #[must_use]
    pub fn from_email(result: &WaitResult<EmailMatch>) -> Self {
        Self::build(result, email_fields)
    }

    /// The report as a JSON object.
    #[must_use]
    pub fn to_json(&self) -> Value {
        let mut object = Map::new();
        object.insert("matched".into(), Value::Bool(self.matched));
        object.insert("elapsed_seconds".into(), json!(self.elapsed_seconds));
        object.extend(self.fields.clone());
        Value::Object(object)
    }

    fn build<T>(result: &WaitResult<T>, matched_fields: impl FnOnce(&T) -> Map<String, Value>) -> Self {
        let fields = match result {
            WaitResult::Matched { item, .. } => matched_fields(item),
            WaitResult::TimedOut { .. } => Map::new(),
            WaitResult::TransportError { error, .. } => {
                let mut fields = Map::new();
                fields.insert(
                    "error".into(),
                    json!({ "kind": error.kind(), "message": error.detailed_message() }),
                );
                fields
            }
        };

        Self {
            matched: result.is_matched(),
            elapsed_seconds: seconds(result.elapsed()),
            fields,
        }
    }
}

impl std::fmt::Display for WaitReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = serde_json::to_string_pretty(&self.to_json()).map_err(|_| std::fmt::Error)?;
        f.write_str(&text)
    }
}

fn seconds(elapsed: Duration) -> f64 {
    (elapsed.as_secs_f64() * 1000.0).round() / 1000.0
}

fn request_fields(item: &CapturedItem) -> Value {
    let (method, url, ip, query) = match &item.payload {
        Payload::Http {
            method,
            url,
            query,
            ip,
        } => (Some(method.as_str()), url.as_deref(), ip.as_deref(), json!(query)),
        Payload::Dns { ip, .. } => (None, None, ip.as_deref(), json!({})),
        Payload::Email { .. } | Payload::Other => (None, None, None, json!({})),
    };

    json!({
        "id": item.id,
        "type": item.kind,
        "method": method,
        "url": url,
        "ip": ip,
        "headers": item.headers,
        "query": query,
        "content": item.content,
        "created_at": item.created_at.to_rfc3339(),
    })
}

fn email_fields(email: &EmailMatch) -> Map<String, Value> {
    let mut fields = Map::new();
    fields.insert(
        "subject".into(),
        json!(email.subject.as_deref().unwrap_or(UNKNOWN)),
    );
    fields.insert("from".into(), json!(email.from.as_deref().unwrap_or(UNKNOWN)));
    fields.insert("links_found".into(), json!(email.links));
    fields.insert("auth_links".into(), json!(email.auth_links));
    fields.insert("email_id".into(), json!(email.item.id));
    fields.insert("text_content".into(), json!(email.text));
    fields
}
