//! Client for the capture service.
//!
//! The [`WebhookClient`] is the main entry point for this crate. It provides
//! async methods to:
//!
//! - Create, inspect, update and delete tokens
//! - List, fetch and delete captured items
//! - Send data to a token
//! - Wait for a new request or email to arrive at a token
//! - Extract links from captured items and summarize received callbacks
//! - Generate out-of-band test payloads
//!
//! # Example
//!
//! ```no_run
//! use webhook_sync::{ClientConfig, TokenSettings, WaitOptions, WaitResult, WebhookClient};
//! use std::time::Duration;
//!
//! # async fn example() -> webhook_sync::Result<()> {
//! let client = WebhookClient::new(ClientConfig::builder().build()?)?;
//!
//! let token = client.create_token(&TokenSettings::new()).await?;
//! println!("Send something to {}", client.addresses(&token.uuid, None).url);
//!
//! match client
//!     .wait_for_request(&token.uuid, WaitOptions::new(Duration::from_secs(60)))
//!     .await?
//! {
//!     WaitResult::Matched { item, elapsed } => println!("{} after {elapsed:?}", item.id),
//!     WaitResult::TimedOut { .. } => println!("nothing arrived"),
//!     WaitResult::TransportError { error, .. } => println!("service unreachable: {error}"),
//! }
//! # Ok(())
//! # }
//! ```

use crate::api::{self, DeleteFilter, ListQuery, SendReceipt, TokenInfo, TokenItems, TokenSettings};
use crate::config::ClientConfig;
use crate::endpoints::TokenAddresses;
use crate::error::Result;
use crate::inspect::{CallbackReport, RequestLinks};
use crate::item::{CapturedItem, ItemKind};
use crate::parser::EmailMatch;
use crate::payloads::Payloads;
use crate::poller::{PollSettings, WaitResult};
use crate::token::Token;
use crate::transport::Transport;
use crate::waiter::{self, WaitOptions};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

/// Async client for the capture service.
///
/// Cloning is cheap: clones share the configuration and one connection pool,
/// so a single client can serve many concurrent waits.
///
/// # Example
///
/// ```no_run
/// use webhook_sync::{WaitOptions, WebhookClient};
/// use std::time::Duration;
///
/// # async fn example() -> webhook_sync::Result<()> {
/// let client = WebhookClient::from_env()?;
/// let options = client.email_wait_options();
///
/// let result = client
///     .wait_for_email("550e8400-e29b-41d4-a716-446655440000", options)
///     .await?;
/// if let Some(email) = result.matched() {
///     println!("links: {:?}", email.auth_links);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct WebhookClient {
    transport: Transport,
    config: Arc<ClientConfig>,
}

impl WebhookClient {
    /// Creates a client from a validated configuration.
    ///
    /// No request is sent until a method is called.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BuildClient`](crate::Error::BuildClient) if the HTTP
    /// client cannot be built, or [`Error::InvalidConfig`](crate::Error::InvalidConfig)
    /// for an unusable proxy.
    #[instrument(
        name = "WebhookClient::new",
        skip_all,
        fields(
            base_url = %config.base_url(),
            proxy_enabled = config.proxy.is_some(),
            api_key_set = config.api_key().is_some()
        )
    )]
    pub fn new(config: ClientConfig) -> Result<Self> {
        let transport = Transport::new(&config)?;
        debug!("Client ready");

        Ok(Self {
            transport,
            config: Arc::new(config),
        })
    }

    /// Creates a client configured from the environment.
    ///
    /// See [`ClientConfig::from_env`].
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the HTTP client
    /// cannot be built.
    pub fn from_env() -> Result<Self> {
        Self::new(ClientConfig::from_env()?)
    }

    /// Returns the configuration of this client.
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Returns the underlying transport, for calls this client does not wrap.
    #[must_use]
    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    /// Returns the addresses through which `token` captures traffic.
    #[must_use]
    pub fn addresses(&self, token: &Token, alias: Option<&str>) -> TokenAddresses {
        self.config.hosts.addresses(token, alias)
    }

    /// Payload generator calling back to `token` on the configured hosts.
    #[must_use]
    pub fn payloads<'a>(&'a self, token: &'a Token) -> Payloads<'a> {
        Payloads::new(&self.config.hosts, token)
    }

    /// Wait options using the configured request timeout.
    #[must_use]
    pub fn request_wait_options(&self) -> WaitOptions {
        WaitOptions::new(self.config.polling.request_timeout)
    }

    /// Wait options using the configured email timeout.
    #[must_use]
    pub fn email_wait_options(&self) -> WaitOptions {
        WaitOptions::new(self.config.polling.email_timeout)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Waiting
    // ─────────────────────────────────────────────────────────────────────────

    /// Waits for an item to arrive at `token` after this call begins.
    ///
    /// Items already present are never reported. With a kind filter set in
    /// `options`, only new items of that kind end the wait.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidToken`](crate::Error::InvalidToken) or
    /// [`Error::InvalidTimeout`](crate::Error::InvalidTimeout) before any
    /// network call. Every other outcome, including an unreachable service, is
    /// reported through the returned [`WaitResult`].
    #[instrument(
        name = "WebhookClient::wait_for_request",
        skip_all,
        fields(
            token = %token.as_ref(),
            timeout_secs = options.timeout().as_secs(),
            kind = ?options.kind_filter()
        )
    )]
    pub async fn wait_for_request(
        &self,
        token: impl AsRef<str>,
        options: WaitOptions,
    ) -> Result<WaitResult<CapturedItem>> {
        let token = Token::parse(token.as_ref())?;
        options.validate()?;

        let mut query = ListQuery::new(self.config.polling.page_size);
        if let Some(kind) = options.kind_filter() {
            query = query.kind(kind);
        }
        let source = TokenItems::new(&self.transport, &token, query);
        let settings = options.settings(self.poll_settings());

        let timeout = options.timeout();
        Ok(waiter::wait_for_request(&source, options.kind_filter(), timeout, &settings).await)
    }

    /// Waits for an email to arrive at `{token}@email.webhook.site` after this
    /// call begins, and extracts its links.
    ///
    /// Web and DNS items arriving meanwhile are ignored. The kind filter of
    /// `options` is ignored.
    ///
    /// # Errors
    ///
    /// Same as [`wait_for_request`](Self::wait_for_request).
    #[instrument(
        name = "WebhookClient::wait_for_email",
        skip_all,
        fields(token = %token.as_ref(), timeout_secs = options.timeout().as_secs())
    )]
    pub async fn wait_for_email(
        &self,
        token: impl AsRef<str>,
        options: WaitOptions,
    ) -> Result<WaitResult<EmailMatch>> {
        let token = Token::parse(token.as_ref())?;
        options.validate()?;

        let query = ListQuery::new(self.config.polling.page_size).kind(ItemKind::Email);
        let source = TokenItems::new(&self.transport, &token, query);
        let settings = options.settings(self.poll_settings());

        Ok(waiter::wait_for_email(&source, options.timeout(), &settings).await)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Tokens
    // ─────────────────────────────────────────────────────────────────────────

    /// Creates a token.
    ///
    /// The request is sent once, never retried.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTokenSettings`](crate::Error::InvalidTokenSettings)
    /// before any network call, or a transport error.
    pub async fn create_token(&self, settings: &TokenSettings) -> Result<TokenInfo> {
        api::create_token(&self.transport, settings).await
    }

    /// Replaces the settings of a token.
    ///
    /// # Errors
    ///
    /// Returns a validation error before any network call, or a transport error.
    pub async fn update_token(
        &self,
        token: impl AsRef<str>,
        settings: &TokenSettings,
    ) -> Result<TokenInfo> {
        let token = Token::parse(token.as_ref())?;
        api::update_token(&self.transport, &token, settings).await
    }

    /// Reads the metadata of a token.
    ///
    /// # Errors
    ///
    /// Returns a validation error before any network call, or a transport error.
    pub async fn token_info(&self, token: impl AsRef<str>) -> Result<TokenInfo> {
        let token = Token::parse(token.as_ref())?;
        api::token_info(&self.transport, &token).await
    }

    /// Deletes a token and everything it captured.
    ///
    /// # Errors
    ///
    /// Returns a validation error before any network call, or a transport error.
    pub async fn delete_token(&self, token: impl AsRef<str>) -> Result<()> {
        let token = Token::parse(token.as_ref())?;
        api::delete_token(&self.transport, &token).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Captured items
    // ─────────────────────────────────────────────────────────────────────────

    /// Lists captured items.
    ///
    /// An empty list is a success.
    ///
    /// # Errors
    ///
    /// Returns a validation error before any network call, or a transport error.
    pub async fn list_items(
        &self,
        token: impl AsRef<str>,
        query: &ListQuery,
    ) -> Result<Vec<CapturedItem>> {
        let token = Token::parse(token.as_ref())?;
        api::list_items(&self.transport, &token, query).await
    }

    /// Fetches the newest captured item, optionally of one kind.
    ///
    /// # Errors
    ///
    /// Returns a validation error before any network call, or a transport error.
    pub async fn latest_item(
        &self,
        token: impl AsRef<str>,
        kind: Option<ItemKind>,
    ) -> Result<Option<CapturedItem>> {
        let token = Token::parse(token.as_ref())?;
        api::latest_item(&self.transport, &token, kind).await
    }

    /// Fetches one captured item.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a malformed token or item id, or a
    /// transport error (HTTP 404 for an unknown item).
    pub async fn get_item(&self, token: impl AsRef<str>, item_id: &str) -> Result<CapturedItem> {
        let token = Token::parse(token.as_ref())?;
        api::get_item(&self.transport, &token, item_id).await
    }

    /// Deletes one captured item.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a malformed token or item id, or a
    /// transport error.
    pub async fn delete_item(&self, token: impl AsRef<str>, item_id: &str) -> Result<()> {
        let token = Token::parse(token.as_ref())?;
        api::delete_item(&self.transport, &token, item_id).await
    }

    /// Deletes every captured item matching `filter`; the default filter
    /// deletes them all.
    ///
    /// # Errors
    ///
    /// Returns a validation error before any network call, or a transport error.
    pub async fn delete_items(&self, token: impl AsRef<str>, filter: &DeleteFilter) -> Result<()> {
        let token = Token::parse(token.as_ref())?;
        api::delete_items(&self.transport, &token, filter).await
    }

    /// Posts `data` as JSON, plus `headers`, to the token's capture URL.
    ///
    /// The request is captured like any other; it is sent once, never
    /// retried.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHeader`](crate::Error::InvalidHeader) or a
    /// token validation error before any network call, or a transport error.
    pub async fn send_to_token(
        &self,
        token: impl AsRef<str>,
        data: &Value,
        headers: &[(&str, &str)],
    ) -> Result<SendReceipt> {
        let token = Token::parse(token.as_ref())?;
        api::send_to_token(&self.transport, &token, data, headers).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Inspection
    // ─────────────────────────────────────────────────────────────────────────

    /// Extracts and groups the links in one captured item, or in the newest
    /// one when `item_id` is `None`.
    ///
    /// Bare `www.` hosts count as links. With `filter_domain`, only links
    /// containing it are kept. Returns `Ok(None)` if nothing was captured.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a malformed token or item id, or a
    /// transport error.
    pub async fn extract_links_from_request(
        &self,
        token: impl AsRef<str>,
        item_id: Option<&str>,
        filter_domain: Option<&str>,
    ) -> Result<Option<RequestLinks>> {
        let token = Token::parse(token.as_ref())?;
        api::extract_links(&self.transport, &token, item_id, filter_domain).await
    }

    /// Summarizes the traffic captured within the last `since` (1 minute
    /// ..= 7 days), optionally only items mentioning `identifier`.
    ///
    /// # Errors
    ///
    /// Returns a validation error before any network call, or a transport error.
    pub async fn check_for_callbacks(
        &self,
        token: impl AsRef<str>,
        since: Duration,
        identifier: Option<&str>,
    ) -> Result<CallbackReport> {
        let token = Token::parse(token.as_ref())?;
        api::check_for_callbacks(&self.transport, &token, since, identifier).await
    }

    fn poll_settings(&self) -> PollSettings {
        PollSettings::from(&self.config.polling)
    }
}

impl std::fmt::Debug for WebhookClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookClient")
            .field("base_url", &self.config.base_url())
            .field("proxy_enabled", &self.config.proxy.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::time::Duration;

    fn client() -> WebhookClient {
        WebhookClient::new(ClientConfig::builder().build().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_invalid_token_rejected_before_io() {
        let client = client();

        let err = client
            .wait_for_request("not-a-uuid", WaitOptions::new(Duration::from_secs(5)))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidToken { .. }));

        let err = client
            .wait_for_email("not-a-uuid", WaitOptions::new(Duration::from_secs(5)))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidToken { .. }));
    }

    #[tokio::test]
    async fn test_invalid_timeout_rejected_before_io() {
        let err = client()
            .wait_for_request(
                "550e8400-e29b-41d4-a716-446655440000",
                WaitOptions::new(Duration::from_secs(601)),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTimeout { name: "wait timeout", .. }));
    }

    #[test]
    fn test_default_wait_options() {
        let client = client();
        assert_eq!(client.request_wait_options().timeout(), Duration::from_secs(60));
        assert_eq!(client.email_wait_options().timeout(), Duration::from_secs(120));
    }

    #[tokio::test]
    async fn test_inspection_validates_token_first() {
        let client = client();

        let err = client
            .extract_links_from_request("nope", None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidToken { .. }));

        let err = client
            .check_for_callbacks("nope", Duration::from_secs(3600), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidToken { .. }));

        let err = client
            .send_to_token("nope", &serde_json::json!({}), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidToken { .. }));
    }

    #[test]
    fn test_payloads_use_configured_hosts() {
        let config = ClientConfig::builder()
            .hosts(crate::ServiceHosts::with_web_base("https://hooks.internal"))
            .build()
            .unwrap();
        let client = WebhookClient::new(config).unwrap();
        let token = Token::parse("550e8400-e29b-41d4-a716-446655440000").unwrap();

        let canary = client
            .payloads(&token)
            .canary(crate::payloads::CanaryKind::Url, Some("doc-1"))
            .unwrap();
        assert_eq!(
            canary.token,
            "https://hooks.internal/550e8400-e29b-41d4-a716-446655440000?canary=doc-1"
        );
    }

    #[test]
    fn test_debug_hides_api_key() {
        let config = ClientConfig::builder().api_key("secret-key").build().unwrap();
        let client = WebhookClient::new(config).unwrap();
        let debug = format!("{client:?}");
        assert!(!debug.contains("secret-key"));
        assert!(debug.contains("https://webhook.site"));
    }
}
