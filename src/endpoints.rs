//! Public addresses through which a token captures traffic.
//!
//! The capture service exposes every token under several names: a path on the
//! main site, a per-token subdomain, a mailbox and a DNS zone. [`ServiceHosts`]
//! holds the host names and derives the concrete [`TokenAddresses`].
//!
//! # Example
//!
//! ```
//! use webhook_sync::{ServiceHosts, Token};
//!
//! let token = Token::parse("550e8400-e29b-41d4-a716-446655440000").unwrap();
//! let addresses = ServiceHosts::default().addresses(&token, None);
//!
//! assert_eq!(addresses.email, "550e8400-e29b-41d4-a716-446655440000@email.webhook.site");
//! assert_eq!(addresses.dns, "550e8400-e29b-41d4-a716-446655440000.dnshook.site");
//! ```

use crate::token::Token;
use serde::Serialize;

/// Default site serving token URLs.
pub const DEFAULT_WEB_BASE: &str = "https://webhook.site";

/// Host names of the capture service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceHosts {
    /// Base URL of the site, without trailing slash.
    pub web_base: String,
    /// Parent domain of per-token subdomains (`{token}.{subdomain_domain}`).
    pub subdomain_domain: String,
    /// Domain receiving email for `{token}@{email_domain}`.
    pub email_domain: String,
    /// Parent zone of per-token DNS names (`{token}.{dns_domain}`).
    pub dns_domain: String,
}

impl Default for ServiceHosts {
    fn default() -> Self {
        Self {
            web_base: DEFAULT_WEB_BASE.to_string(),
            subdomain_domain: "webhook.site".to_string(),
            email_domain: "email.webhook.site".to_string(),
            dns_domain: "dnshook.site".to_string(),
        }
    }
}

impl ServiceHosts {
    /// Creates hosts for a self-hosted deployment reachable at `web_base`.
    ///
    /// The mail and DNS domains keep their defaults; override the public
    /// fields if the deployment runs its own.
    #[must_use]
    pub fn with_web_base(web_base: impl Into<String>) -> Self {
        let web_base = web_base.into();
        Self {
            web_base: web_base.trim_end_matches('/').to_string(),
            ..Self::default()
        }
    }

    /// Derives every capture address of a token.
    ///
    /// `alias` replaces the token in the main URL only; the subdomain, mailbox
    /// and DNS names always use the token itself.
    #[must_use]
    pub fn addresses(&self, token: &Token, alias: Option<&str>) -> TokenAddresses {
        let identifier = alias.filter(|a| !a.is_empty()).unwrap_or(token.as_str());

        TokenAddresses {
            url: format!("{}/{identifier}", self.web_base),
            subdomain_url: format!("https://{token}.{}", self.subdomain_domain),
            api_url: format!("{}/token/{token}", self.web_base),
            email: format!("{token}@{}", self.email_domain),
            dns: format!("{token}.{}", self.dns_domain),
        }
    }
}

/// Every address through which one token captures traffic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenAddresses {
    /// URL receiving HTTP requests.
    pub url: String,
    /// Per-token subdomain receiving HTTP requests.
    pub subdomain_url: String,
    /// API URL of the token.
    pub api_url: String,
    /// Mailbox receiving email.
    pub email: String,
    /// DNS zone whose lookups are recorded.
    pub dns: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token() -> Token {
        Token::parse("550e8400-e29b-41d4-a716-446655440000").unwrap()
    }

    #[test]
    fn test_default_addresses() {
        let addresses = ServiceHosts::default().addresses(&token(), None);

        assert_eq!(
            addresses.url,
            "https://webhook.site/550e8400-e29b-41d4-a716-446655440000"
        );
        assert_eq!(
            addresses.subdomain_url,
            "https://550e8400-e29b-41d4-a716-446655440000.webhook.site"
        );
        assert_eq!(
            addresses.api_url,
            "https://webhook.site/token/550e8400-e29b-41d4-a716-446655440000"
        );
    }

    #[test]
    fn test_alias_only_changes_main_url() {
        let addresses = ServiceHosts::default().addresses(&token(), Some("my-hook"));

        assert_eq!(addresses.url, "https://webhook.site/my-hook");
        assert!(addresses.email.starts_with("550e8400"));
        assert!(addresses.api_url.ends_with("550e8400-e29b-41d4-a716-446655440000"));
    }

    #[test]
    fn test_empty_alias_ignored() {
        let addresses = ServiceHosts::default().addresses(&token(), Some(""));
        assert!(addresses.url.ends_with("550e8400-e29b-41d4-a716-446655440000"));
    }

    #[test]
    fn test_custom_web_base_trims_slash() {
        let hosts = ServiceHosts::with_web_base("https://hooks.internal/");
        let addresses = hosts.addresses(&token(), None);

        assert_eq!(
            addresses.url,
            "https://hooks.internal/550e8400-e29b-41d4-a716-446655440000"
        );
        assert_eq!(hosts.email_domain, "email.webhook.site");
    }
}
