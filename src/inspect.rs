//! Summaries of captured traffic: links found in one item, and callbacks
//! received within a time window.

use crate::config::check_range;
use crate::error::Result;
use crate::item::{CapturedItem, ItemKind, Payload};
use crate::links::{extract_links_lenient, LinkSummary};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

/// Items fetched per callback check.
pub const CALLBACK_PAGE_SIZE: u32 = 50;
/// Callbacks summarized in a [`CallbackReport`]; the rest are only counted.
pub const MAX_CALLBACK_SUMMARIES: usize = 10;
/// Shortest callback window.
pub const MIN_CALLBACK_WINDOW: Duration = Duration::from_secs(60);
/// Longest callback window, the longest a token can live.
pub const MAX_CALLBACK_WINDOW: Duration = Duration::from_secs(604_800);

/// Links found in one captured item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestLinks {
    /// The inspected item.
    pub item_id: String,
    /// Its kind.
    pub kind: ItemKind,
    /// Number of distinct links after filtering.
    pub total_links: usize,
    /// Domain filter that was applied.
    pub filter_domain: Option<String>,
    /// The links, grouped.
    pub links: LinkSummary,
}

impl RequestLinks {
    /// Extracts links from the item's body, including bare `www.` hosts.
    ///
    /// The raw body is searched first; emails without one fall back to the
    /// service's text and HTML renderings.
    #[must_use]
    pub fn from_item(item: &CapturedItem, filter_domain: Option<&str>) -> Self {
        let links = LinkSummary::new(extract_links_lenient(searchable_text(item)), filter_domain);

        Self {
            item_id: item.id.clone(),
            kind: item.kind,
            total_links: links.len(),
            filter_domain: filter_domain.filter(|d| !d.is_empty()).map(str::to_string),
            links,
        }
    }
}

fn searchable_text(item: &CapturedItem) -> &str {
    let rendered = match &item.payload {
        Payload::Email {
            text_content,
            html_content,
        } => non_empty(text_content.as_deref()).or(non_empty(html_content.as_deref())),
        _ => None,
    };
    non_empty(item.content.as_deref())
        .or(rendered)
        .unwrap_or_default()
}

fn non_empty(text: Option<&str>) -> Option<&str> {
    text.filter(|t| !t.trim().is_empty())
}

/// Number of items of each kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct KindCounts {
    /// HTTP requests.
    pub web: usize,
    /// DNS lookups.
    pub dns: usize,
    /// Emails.
    pub email: usize,
}

/// One received callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallbackSummary {
    /// Captured item identifier.
    pub item_id: String,
    /// Kind of traffic.
    pub kind: ItemKind,
    /// HTTP method, for web items.
    pub method: Option<String>,
    /// Client or resolver IP.
    pub ip: Option<String>,
    /// `User-Agent` header, `"N/A"` when absent.
    pub user_agent: String,
    /// When the service recorded the callback.
    pub created_at: DateTime<Utc>,
    /// Requested URL, for web items.
    pub url: Option<String>,
    /// Whether the identifier appears anywhere in the item.
    pub matched_identifier: bool,
}

impl CallbackSummary {
    fn new(item: &CapturedItem, identifier: Option<&str>) -> Self {
        let (method, url, ip) = match &item.payload {
            Payload::Http {
                method, url, ip, ..
            } => (Some(method.clone()), url.clone(), ip.clone()),
            Payload::Dns { ip, .. } => (None, None, ip.clone()),
            Payload::Email { .. } | Payload::Other => (None, None, None),
        };

        Self {
            item_id: item.id.clone(),
            kind: item.kind,
            method,
            ip,
            user_agent: item.header("user-agent").unwrap_or("N/A").to_string(),
            created_at: item.created_at,
            url,
            matched_identifier: identifier.is_some_and(|id| mentions(item, id)),
        }
    }
}

fn mentions(item: &CapturedItem, identifier: &str) -> bool {
    serde_json::to_string(item).is_ok_and(|json| json.contains(identifier))
}

/// Out-of-band callbacks received by a token within a time window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallbackReport {
    /// Whether anything arrived.
    pub detected: bool,
    /// Number of items found (at most one page).
    pub total_callbacks: usize,
    /// Items per kind.
    pub by_kind: KindCounts,
    /// Window that was searched, in whole minutes.
    pub since_minutes: u64,
    /// Identifier the search was restricted to.
    pub identifier_filter: Option<String>,
    /// The newest callbacks, at most [`MAX_CALLBACK_SUMMARIES`].
    pub callbacks: Vec<CallbackSummary>,
}

impl CallbackReport {
    /// Summarizes `items`, newest first.
    #[must_use]
    pub fn from_items(
        mut items: Vec<CapturedItem>,
        since: Duration,
        identifier: Option<&str>,
    ) -> Self {
        items.sort_by_key(|item| std::cmp::Reverse(item.order_key()));

        let mut by_kind = KindCounts::default();
        for item in &items {
            match item.kind {
                ItemKind::Web => by_kind.web += 1,
                ItemKind::Dns => by_kind.dns += 1,
                ItemKind::Email => by_kind.email += 1,
                ItemKind::Other => {}
            }
        }

        Self {
            detected: !items.is_empty(),
            total_callbacks: items.len(),
            by_kind,
            since_minutes: since.as_secs() / 60,
            identifier_filter: identifier.map(str::to_string),
            callbacks: items
                .iter()
                .take(MAX_CALLBACK_SUMMARIES)
                .map(|item| CallbackSummary::new(item, identifier))
                .collect(),
        }
    }
}

/// Checks a callback window against 1 minute ..= 7 days.
pub(crate) fn validate_window(since: Duration) -> Result<()> {
    check_range("callback window", since, MIN_CALLBACK_WINDOW, MAX_CALLBACK_WINDOW)
}

/// Start of the window ending at `now`, in the service's `date_from` format.
pub(crate) fn window_start(now: DateTime<Utc>, since: Duration) -> String {
    chrono::Duration::from_std(since)
        .ok()
        .and_then(|window| now.checked_sub_signed(window))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::tests::item;
    use chrono::TimeZone;

    #[test]
    fn test_links_from_web_body() {
        let mut hook = item("req-1", ItemKind::Web, 0, 0);
        hook.content = Some(
            "callback=https://api.example.com/callback?id=7, see www.example.com/login \
             and (https://cdn.other.net/logo.png)"
                .into(),
        );

        let links = RequestLinks::from_item(&hook, None);

        assert_eq!(links.item_id, "req-1");
        assert_eq!(links.total_links, 3);
        assert_eq!(
            links.links.all_links,
            vec![
                "https://api.example.com/callback?id=7",
                "https://www.example.com/login",
                "https://cdn.other.net/logo.png"
            ]
        );
        assert_eq!(links.links.auth_links, vec!["https://www.example.com/login"]);
        assert_eq!(links.links.api_links, vec!["https://api.example.com/callback?id=7"]);
    }

    #[test]
    fn test_links_filtered_by_domain() {
        let mut hook = item("req-1", ItemKind::Web, 0, 0);
        hook.content = Some("https://a.example.com/x https://b.other.org/y".into());

        let links = RequestLinks::from_item(&hook, Some("other.org"));

        assert_eq!(links.filter_domain.as_deref(), Some("other.org"));
        assert_eq!(links.links.all_links, vec!["https://b.other.org/y"]);
        assert_eq!(links.total_links, 1);
    }

    #[test]
    fn test_email_links_fall_back_to_rendered_text() {
        let mut mail = item("mail-1", ItemKind::Email, 0, 0);
        mail.content = None;
        mail.payload = Payload::Email {
            text_content: Some("  ".into()),
            html_content: Some("<a href=\"https://example.com/verify?t=1\">go</a>".into()),
        };

        let links = RequestLinks::from_item(&mail, None);

        assert_eq!(links.kind, ItemKind::Email);
        assert_eq!(links.links.auth_links, vec!["https://example.com/verify?t=1"]);
    }

    #[test]
    fn test_callback_report_counts_and_orders() {
        let mut dns = item("d1", ItemKind::Dns, 3, 0);
        dns.payload = Payload::Dns {
            ip: Some("192.0.2.53".into()),
            hostname: Some("ssrf-7.x.dnshook.site".into()),
        };
        let items = vec![
            item("w1", ItemKind::Web, 1, 0),
            dns,
            item("w2", ItemKind::Web, 2, 0),
            item("e1", ItemKind::Email, 0, 0),
        ];

        let report = CallbackReport::from_items(items, Duration::from_secs(3600), Some("ssrf-7"));

        assert!(report.detected);
        assert_eq!(report.total_callbacks, 4);
        assert_eq!(report.by_kind, KindCounts { web: 2, dns: 1, email: 1 });
        assert_eq!(report.since_minutes, 60);
        let order: Vec<&str> = report.callbacks.iter().map(|c| c.item_id.as_str()).collect();
        assert_eq!(order, vec!["d1", "w2", "w1", "e1"]);
        assert!(report.callbacks[0].matched_identifier);
        assert!(!report.callbacks[1].matched_identifier);
        assert_eq!(report.callbacks[0].ip.as_deref(), Some("192.0.2.53"));
        assert_eq!(report.callbacks[1].method.as_deref(), Some("POST"));
        assert_eq!(report.callbacks[1].user_agent, "N/A");
    }

    #[test]
    fn test_callback_report_caps_summaries() {
        let items = (0..15).map(|i| item(&format!("w{i}"), ItemKind::Web, i, 0)).collect();

        let report = CallbackReport::from_items(items, Duration::from_secs(600), None);

        assert_eq!(report.total_callbacks, 15);
        assert_eq!(report.callbacks.len(), MAX_CALLBACK_SUMMARIES);
        assert_eq!(report.callbacks[0].item_id, "w14");
        assert!(report.callbacks.iter().all(|c| !c.matched_identifier));
    }

    #[test]
    fn test_empty_window_is_not_detected() {
        let report = CallbackReport::from_items(Vec::new(), Duration::from_secs(60), None);
        assert!(!report.detected);
        assert!(report.callbacks.is_empty());
    }

    #[test]
    fn test_window_start_format() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 10, 30, 0).unwrap();
        assert_eq!(window_start(now, Duration::from_secs(3600)), "2024-05-01 09:30:00");

        assert!(validate_window(Duration::from_secs(59)).is_err());
        assert!(validate_window(Duration::from_secs(604_800)).is_ok());
        assert!(validate_window(Duration::from_secs(604_801)).is_err());
    }
}
