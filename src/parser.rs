//! Email content extraction for captured email items.
//!
//! The service usually ships the subject and sender as headers and the body
//! as `text_content`/`html_content`. When any of those are missing the raw
//! MIME message in `content` is parsed instead. A message that cannot be
//! parsed degrades to whatever the service provided; it never fails the wait.

use crate::error::Error;
use crate::item::{CapturedItem, Payload};
use crate::links::{auth_links, extract_links};
use email_address::EmailAddress;
use mailparse::{addrparse, parse_mail, MailAddr, MailHeaderMap};
use serde::Serialize;
use std::str::FromStr;
use tracing::{debug, warn};

/// A captured email plus the fields extracted from it.
#[derive(Debug, Clone, Serialize)]
pub struct EmailMatch {
    /// The captured item.
    pub item: CapturedItem,
    /// `Subject` header.
    pub subject: Option<String>,
    /// `From` header as sent.
    pub from: Option<String>,
    /// Sender address parsed from `From`, when it is a valid address.
    #[serde(serialize_with = "serialize_address")]
    pub sender: Option<EmailAddress>,
    /// Body text the links were extracted from.
    pub text: Option<String>,
    /// Every link in the body, first-seen order.
    pub links: Vec<String>,
    /// Links that look like sign-in or verification links.
    pub auth_links: Vec<String>,
}

impl EmailMatch {
    /// Extracts subject, sender, body and links from an email item.
    #[must_use]
    pub fn from_item(item: CapturedItem) -> Self {
        let (text_content, html_content) = match &item.payload {
            Payload::Email {
                text_content,
                html_content,
            } => (
                non_empty(text_content.as_deref()),
                non_empty(html_content.as_deref()),
            ),
            _ => (None, None),
        };

        let mut subject = item.header("subject").map(str::to_string);
        let mut from = item.header("from").map(str::to_string);
        let mut text = text_content.or(html_content);

        if subject.is_none() || from.is_none() || text.is_none() {
            if let Some(raw) = item.content.as_deref().filter(|c| !c.trim().is_empty()) {
                match parse_mime(raw) {
                    Ok(mime) => {
                        subject = subject.or(mime.subject);
                        from = from.or(mime.from);
                        text = text.or(mime.body);
                    }
                    Err(e) => warn!(
                        item_id = %item.id,
                        error = %e,
                        "Failed to parse raw email, continuing without MIME fields"
                    ),
                }
            }
        }

        let links = text.as_deref().map(extract_links).unwrap_or_default();
        let auth = auth_links(&links);
        let sender = from.as_deref().and_then(sender_address);

        debug!(
            item_id = %item.id,
            links = links.len(),
            auth_links = auth.len(),
            "Extracted email content"
        );

        Self {
            item,
            subject,
            from,
            sender,
            text,
            links,
            auth_links: auth,
        }
    }
}

/// Fields recovered from a raw MIME message.
#[derive(Debug, Default)]
struct MimeFields {
    subject: Option<String>,
    from: Option<String>,
    body: Option<String>,
}

fn parse_mime(raw: &str) -> Result<MimeFields, Error> {
    let parsed = parse_mail(raw.as_bytes()).map_err(|source| Error::ParseEmail { source })?;

    let body = match extract_body_text(&parsed) {
        Ok(body) => non_empty(Some(&body)),
        Err(e) => {
            warn!(error = %e, "Failed to decode email body");
            None
        }
    };

    Ok(MimeFields {
        subject: parsed.headers.get_first_value("Subject"),
        from: parsed.headers.get_first_value("From"),
        body,
    })
}

/// Extracts text content from a parsed email, handling multipart messages.
///
/// `text/plain` is preferred over `text/html`, at any nesting depth.
fn extract_body_text(
    parsed: &mailparse::ParsedMail<'_>,
) -> Result<String, mailparse::MailParseError> {
    if parsed.subparts.is_empty() {
        return parsed.get_body();
    }

    for wanted in ["text/plain", "text/html"] {
        if let Some(part) = find_part(parsed, wanted) {
            if let Ok(body) = part.get_body() {
                return Ok(body);
            }
        }
    }

    match parsed.subparts.first() {
        Some(first) => extract_body_text(first),
        None => parsed.get_body(),
    }
}

fn find_part<'a, 'b>(
    parsed: &'a mailparse::ParsedMail<'b>,
    mimetype: &str,
) -> Option<&'a mailparse::ParsedMail<'b>> {
    if parsed.subparts.is_empty() {
        return parsed
            .ctype
            .mimetype
            .eq_ignore_ascii_case(mimetype)
            .then_some(parsed);
    }
    parsed
        .subparts
        .iter()
        .find_map(|part| find_part(part, mimetype))
}

/// First mailbox of a `From` header, validated.
fn sender_address(from: &str) -> Option<EmailAddress> {
    let list = addrparse(from).ok()?;
    let addr = list.iter().find_map(|entry| match entry {
        MailAddr::Single(info) => Some(info.addr.clone()),
        MailAddr::Group(group) => group.addrs.first().map(|info| info.addr.clone()),
    })?;
    EmailAddress::from_str(&addr).ok()
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty()).map(str::to_string)
}

fn serialize_address<S: serde::Serializer>(
    address: &Option<EmailAddress>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match address {
        Some(address) => serializer.serialize_some(address.as_str()),
        None => serializer.serialize_none(),
    }
}
