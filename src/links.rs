//! Link extraction from email bodies.
//!
//! [`extract_links`] is a pure function: it performs no I/O and keeps no
//! state, so it is safe to call repeatedly and from many tasks at once.
//!
//! # Example
//!
//! ```
//! use webhook_sync::links::{auth_links, extract_links};
//!
//! let body = "Welcome! Confirm here: https://example.com/confirm?token=abc. \
//!             Docs at (https://example.com/docs).";
//!
//! let links = extract_links(body);
//! assert_eq!(links, vec![
//!     "https://example.com/confirm?token=abc",
//!     "https://example.com/docs",
//! ]);
//! assert_eq!(auth_links(&links), vec!["https://example.com/confirm?token=abc"]);
//! ```

use regex::Regex;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::LazyLock;

/// Candidate URLs: scheme followed by everything up to whitespace, an HTML
/// delimiter, a quote or a closing bracket.
static URL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)https?://[^\s<>"'`)\]}]+"#).expect("valid regex"));

/// Like [`URL_REGEX`], but also bare `www.` hosts.
static LENIENT_URL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)https?://[^\s<>"'`)\]}]+|\bwww\.[^\s<>"'`)\]}]+"#).expect("valid regex")
});

/// Characters that close a sentence rather than belong to the URL.
const TRAILING_PUNCTUATION: &[char] = &['.', ',', ';', ':', '!', '?'];

/// Words that mark sign-in, verification and reset links.
const AUTH_KEYWORDS: &[&str] = &["token", "auth", "verify", "reset", "confirm", "magic", "login"];

/// Words that mark machine endpoints.
const API_KEYWORDS: &[&str] = &["api", "webhook", "callback"];

/// Extracts `http://` and `https://` URLs from free-form text or HTML.
///
/// URLs are returned in first-seen order without duplicates. Trailing
/// punctuation is trimmed and HTML-escaped ampersands are decoded.
#[must_use]
pub fn extract_links(text: &str) -> Vec<String> {
    scan(&URL_REGEX, text)
}

/// Like [`extract_links`], but also picks up bare `www.` hosts, returned
/// with an `https://` prefix.
///
/// ```
/// use webhook_sync::links::extract_links_lenient;
///
/// assert_eq!(
///     extract_links_lenient("visit www.example.com/start or https://example.org"),
///     vec!["https://www.example.com/start", "https://example.org"]
/// );
/// ```
#[must_use]
pub fn extract_links_lenient(text: &str) -> Vec<String> {
    scan(&LENIENT_URL_REGEX, text)
}

/// Selects the links that look like sign-in, verification or reset links.
#[must_use]
pub fn auth_links<S: AsRef<str>>(links: &[S]) -> Vec<String> {
    select(links, is_auth_link)
}

/// Returns `true` if the URL contains one of the auth keywords.
#[must_use]
pub fn is_auth_link(link: &str) -> bool {
    contains_any(link, AUTH_KEYWORDS)
}

/// Selects the links that look like API, webhook or callback endpoints.
#[must_use]
pub fn api_links<S: AsRef<str>>(links: &[S]) -> Vec<String> {
    select(links, is_api_link)
}

/// Returns `true` if the URL contains one of the API keywords.
#[must_use]
pub fn is_api_link(link: &str) -> bool {
    contains_any(link, API_KEYWORDS)
}

/// Links of one document, grouped by what they look like.
///
/// A link can appear in both `auth_links` and `api_links`; `all_links` holds
/// every link once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LinkSummary {
    /// Sign-in, verification and reset links.
    pub auth_links: Vec<String>,
    /// API, webhook and callback endpoints.
    pub api_links: Vec<String>,
    /// Every link, in first-seen order.
    pub all_links: Vec<String>,
}

impl LinkSummary {
    /// Groups `links`, keeping only those containing `domain` when set.
    #[must_use]
    pub fn new(links: Vec<String>, domain: Option<&str>) -> Self {
        let all_links: Vec<String> = match domain.filter(|d| !d.is_empty()) {
            Some(domain) => links.into_iter().filter(|l| l.contains(domain)).collect(),
            None => links,
        };

        Self {
            auth_links: auth_links(&all_links),
            api_links: api_links(&all_links),
            all_links,
        }
    }

    /// Number of distinct links.
    #[must_use]
    pub fn len(&self) -> usize {
        self.all_links.len()
    }

    /// Returns `true` if no link was found.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.all_links.is_empty()
    }
}

fn scan(regex: &Regex, text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for candidate in regex.find_iter(text) {
        let Some(link) = clean(candidate.as_str()) else {
            continue;
        };
        if seen.insert(link.clone()) {
            links.push(link);
        }
    }

    links
}

fn select<S: AsRef<str>>(links: &[S], keep: fn(&str) -> bool) -> Vec<String> {
    links
        .iter()
        .map(AsRef::as_ref)
        .filter(|link| keep(link))
        .map(str::to_string)
        .collect()
}

fn contains_any(link: &str, keywords: &[&str]) -> bool {
    let lower = link.to_ascii_lowercase();
    keywords.iter().any(|keyword| lower.contains(keyword))
}

/// Decodes `&amp;`, trims trailing punctuation and rejects matches with no
/// host. Bare `www.` matches get an `https://` scheme.
fn clean(candidate: &str) -> Option<String> {
    let decoded = candidate.replace("&amp;", "&");
    let trimmed = decoded.trim_end_matches(TRAILING_PUNCTUATION);

    let link = if trimmed.get(..4).is_some_and(|p| p.eq_ignore_ascii_case("www.")) {
        format!("https://{trimmed}")
    } else {
        trimmed.to_string()
    };

    let (_, rest) = link.split_once("://")?;
    let host = rest.strip_prefix("www.").unwrap_or(rest);
    if host.is_empty() || rest.starts_with('/') {
        return None;
    }

    Some(link)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_trailing_punctuation() {
        assert_eq!(extract_links("see http://x.co/a)."), vec!["http://x.co/a"]);
        assert_eq!(
            extract_links("go to https://x.co/b, then https://x.co/c; done"),
            vec!["https://x.co/b", "https://x.co/c"]
        );
        assert_eq!(extract_links("[https://x.co/d]"), vec!["https://x.co/d"]);
        assert_eq!(extract_links("{https://x.co/e}!?"), vec!["https://x.co/e"]);
    }

    #[test]
    fn test_closing_bracket_ends_the_link() {
        assert_eq!(
            extract_links("links: (https://x.co/a),https://x.co/b"),
            vec!["https://x.co/a", "https://x.co/b"]
        );
        assert_eq!(
            extract_links("[https://x.co/c]https://x.co/d"),
            vec!["https://x.co/c", "https://x.co/d"]
        );
    }

    #[test]
    fn test_escaped_ampersand_decoded_before_trimming() {
        assert_eq!(extract_links("see https://x.co/?a=1&amp;"), vec!["https://x.co/?a=1&"]);
        assert_eq!(
            extract_links("https://x.co/?a=1&amp;b=2."),
            vec!["https://x.co/?a=1&b=2"]
        );
    }

    #[test]
    fn test_deduplicates_in_first_seen_order() {
        let text = "https://b.example https://a.example https://b.example.";
        assert_eq!(
            extract_links(text),
            vec!["https://b.example", "https://a.example"]
        );
    }

    #[test]
    fn test_idempotent() {
        let text = "one https://x.co/1 two http://x.co/2 one https://x.co/1";
        assert_eq!(extract_links(text), extract_links(text));
    }

    #[test]
    fn test_html_bodies() {
        let html = r#"<p><a href="https://example.com/verify?id=1&amp;sig=2">Verify</a>
                      <img src='https://cdn.example.com/logo.png'></p>"#;
        assert_eq!(
            extract_links(html),
            vec![
                "https://example.com/verify?id=1&sig=2",
                "https://cdn.example.com/logo.png"
            ]
        );
    }

    #[test]
    fn test_ignores_partial_matches() {
        assert!(extract_links("http:// nothing here").is_empty());
        assert!(extract_links("https:///path-only").is_empty());
        assert!(extract_links("ftp://files.example.com").is_empty());
        assert!(extract_links("").is_empty());
    }

    #[test]
    fn test_case_insensitive_scheme() {
        assert_eq!(extract_links("HTTPS://Example.com/X"), vec!["HTTPS://Example.com/X"]);
    }

    #[test]
    fn test_lenient_accepts_bare_www() {
        assert_eq!(
            extract_links_lenient("go to www.example.com/reset, or https://www.example.com/reset"),
            vec!["https://www.example.com/reset"]
        );
        assert!(extract_links_lenient("www.").is_empty());
        assert!(extract_links_lenient("awww.example.com").is_empty());
        assert!(extract_links("www.example.com").is_empty());
    }

    #[test]
    fn test_link_summary_groups_and_filters() {
        let links = vec![
            "https://example.com/api/v1/verify".to_string(),
            "https://example.com/blog".to_string(),
            "https://other.org/callback".to_string(),
        ];

        let summary = LinkSummary::new(links.clone(), None);
        assert_eq!(summary.len(), 3);
        assert_eq!(summary.auth_links, vec!["https://example.com/api/v1/verify"]);
        assert_eq!(
            summary.api_links,
            vec!["https://example.com/api/v1/verify", "https://other.org/callback"]
        );

        let filtered = LinkSummary::new(links, Some("example.com"));
        assert_eq!(
            filtered.all_links,
            vec!["https://example.com/api/v1/verify", "https://example.com/blog"]
        );
        assert!(filtered.api_links.iter().all(|l| l.contains("example.com")));
    }

    #[test]
    fn test_auth_links() {
        let links = vec![
            "https://example.com/login?next=/",
            "https://example.com/blog",
            "https://example.com/password/RESET/1",
        ];
        assert_eq!(
            auth_links(&links),
            vec![
                "https://example.com/login?next=/",
                "https://example.com/password/RESET/1"
            ]
        );
    }
}
