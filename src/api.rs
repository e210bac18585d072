//! Remote API calls, one function per endpoint.
//!
//! These wrap [`Transport`] with the service's paths and payload shapes.
//! Inputs are validated before anything is sent.

use crate::error::{Error, Result};
use crate::inspect::{self, CallbackReport, RequestLinks, CALLBACK_PAGE_SIZE};
use crate::item::{CapturedItem, ItemKind};
use crate::poller::ItemSource;
use crate::token::Token;
use crate::transport::{ApiRequest, Transport};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use chrono::Utc;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Longest response delay the service accepts, in seconds.
pub const MAX_RESPONSE_DELAY_SECS: u32 = 30;
/// Longest token lifetime the service accepts, in seconds (7 days).
pub const MAX_EXPIRY_SECS: u64 = 604_800;

/// Settings applied when a token is created or updated.
///
/// Unset fields keep the service defaults.
///
/// # Example
///
/// ```
/// use webhook_sync::TokenSettings;
///
/// let settings = TokenSettings::new()
///     .default_status(201)
///     .default_content(r#"{"ok":true}"#)
///     .default_content_type("application/json")
///     .alias("my-hook");
/// assert!(settings.validate().is_ok());
///
/// assert!(TokenSettings::new().alias("-bad").validate().is_err());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TokenSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    default_status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    default_content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    default_content_type: Option<String>,
    #[serde(rename = "timeout", skip_serializing_if = "Option::is_none")]
    response_delay_secs: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cors: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    alias: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    expiry: Option<u64>,
}

impl TokenSettings {
    /// Settings that keep every service default.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Status code the token answers with (100..=599).
    #[must_use]
    pub fn default_status(mut self, status: u16) -> Self {
        self.default_status = Some(status);
        self
    }

    /// Body the token answers with.
    #[must_use]
    pub fn default_content(mut self, content: impl Into<String>) -> Self {
        self.default_content = Some(content.into());
        self
    }

    /// `Content-Type` of the answer.
    #[must_use]
    pub fn default_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.default_content_type = Some(content_type.into());
        self
    }

    /// Seconds the token waits before answering (0..=30).
    #[must_use]
    pub fn response_delay_secs(mut self, secs: u32) -> Self {
        self.response_delay_secs = Some(secs);
        self
    }

    /// Whether the answer carries permissive CORS headers.
    #[must_use]
    pub fn cors(mut self, enabled: bool) -> Self {
        self.cors = Some(enabled);
        self
    }

    /// Custom URL alias: 3-32 characters of `[A-Za-z0-9_-]`, not starting or
    /// ending with `-`.
    #[must_use]
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Seconds until the token expires (at most 604 800).
    #[must_use]
    pub fn expiry_secs(mut self, secs: u64) -> Self {
        self.expiry = Some(secs);
        self
    }

    /// Returns `true` if no setting is overridden.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Checks every set field against the service's limits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTokenSettings`] naming the first bad field.
    pub fn validate(&self) -> Result<()> {
        if let Some(status) = self.default_status {
            if !(100..=599).contains(&status) {
                return Err(invalid_settings(format!(
                    "default_status {status} is outside 100..=599"
                )));
            }
        }
        if let Some(delay) = self.response_delay_secs {
            if delay > MAX_RESPONSE_DELAY_SECS {
                return Err(invalid_settings(format!(
                    "response delay {delay}s exceeds {MAX_RESPONSE_DELAY_SECS}s"
                )));
            }
        }
        if let Some(expiry) = self.expiry {
            if expiry > MAX_EXPIRY_SECS {
                return Err(invalid_settings(format!(
                    "expiry {expiry}s exceeds {MAX_EXPIRY_SECS}s"
                )));
            }
        }
        if let Some(alias) = &self.alias {
            validate_alias(alias)?;
        }
        Ok(())
    }
}

fn validate_alias(alias: &str) -> Result<()> {
    let length_ok = (3..=32).contains(&alias.len());
    let charset_ok = alias
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    let edges_ok = !alias.starts_with('-') && !alias.ends_with('-');

    if length_ok && charset_ok && edges_ok {
        Ok(())
    } else {
        Err(invalid_settings(format!(
            "alias '{alias}' must be 3-32 characters of [A-Za-z0-9_-] and not start or end with '-'"
        )))
    }
}

fn invalid_settings(message: String) -> Error {
    Error::InvalidTokenSettings { message }
}

/// Token metadata as reported by the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenInfo {
    /// The token.
    pub uuid: Token,
    /// Custom alias, if set.
    #[serde(default)]
    pub alias: Option<String>,
    /// Status code the token answers with.
    #[serde(default)]
    pub default_status: Option<u16>,
    /// Body the token answers with.
    #[serde(default)]
    pub default_content: Option<String>,
    /// `Content-Type` of the answer.
    #[serde(default)]
    pub default_content_type: Option<String>,
    /// Response delay in seconds.
    #[serde(default, rename = "timeout")]
    pub response_delay_secs: Option<u32>,
    /// Whether CORS headers are sent.
    #[serde(default)]
    pub cors: Option<bool>,
    /// Whether the token belongs to a paid account.
    #[serde(default)]
    pub premium: Option<bool>,
    /// Whether custom actions are enabled.
    #[serde(default)]
    pub actions: Option<bool>,
    /// Creation time as sent by the service.
    #[serde(default)]
    pub created_at: Option<String>,
    /// Last update time as sent by the service.
    #[serde(default)]
    pub updated_at: Option<String>,
    /// Expiry time, if the token expires.
    #[serde(default)]
    pub expires_at: Option<String>,
    /// Time of the newest captured item.
    #[serde(default)]
    pub latest_request_at: Option<String>,
    /// Number of captured items.
    #[serde(default, rename = "requests")]
    pub requests_count: Option<u64>,
}

/// Order of a list response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Sorting {
    /// Newest first.
    #[default]
    Newest,
    /// Oldest first.
    Oldest,
}

impl Sorting {
    fn as_str(self) -> &'static str {
        match self {
            Sorting::Newest => "newest",
            Sorting::Oldest => "oldest",
        }
    }
}

/// Filters for listing captured items.
///
/// # Example
///
/// ```
/// use webhook_sync::{ItemKind, ListQuery};
///
/// let query = ListQuery::new(20).kind(ItemKind::Email).search("subject:welcome");
/// assert_eq!(query.search_expression().as_deref(), Some("type:email subject:welcome"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    limit: u32,
    kind: Option<ItemKind>,
    search: Option<String>,
    sorting: Sorting,
    date_from: Option<String>,
    date_to: Option<String>,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self::new(10)
    }
}

impl ListQuery {
    /// Newest `limit` items (clamped to 1..=100).
    #[must_use]
    pub fn new(limit: u32) -> Self {
        Self {
            limit: limit.clamp(1, crate::config::MAX_PAGE_SIZE),
            kind: None,
            search: None,
            sorting: Sorting::Newest,
            date_from: None,
            date_to: None,
        }
    }

    /// Only items of `kind`.
    #[must_use]
    pub fn kind(mut self, kind: ItemKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Service search expression, e.g. `method:POST` or `content:hello`.
    #[must_use]
    pub fn search(mut self, expression: impl Into<String>) -> Self {
        self.search = Some(expression.into());
        self
    }

    /// Sort order.
    #[must_use]
    pub fn sorting(mut self, sorting: Sorting) -> Self {
        self.sorting = sorting;
        self
    }

    /// Items created at or after `from` (`yyyy-MM-dd HH:mm:ss`).
    #[must_use]
    pub fn date_from(mut self, from: impl Into<String>) -> Self {
        self.date_from = Some(from.into());
        self
    }

    /// Items created at or before `to` (`yyyy-MM-dd HH:mm:ss`).
    #[must_use]
    pub fn date_to(mut self, to: impl Into<String>) -> Self {
        self.date_to = Some(to.into());
        self
    }

    /// Page size.
    #[must_use]
    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Kind filter.
    #[must_use]
    pub fn kind_filter(&self) -> Option<ItemKind> {
        self.kind
    }

    /// The `query` parameter sent to the service.
    #[must_use]
    pub fn search_expression(&self) -> Option<String> {
        let parts: Vec<String> = self
            .kind
            .map(|kind| format!("type:{kind}"))
            .into_iter()
            .chain(self.search.clone())
            .collect();
        (!parts.is_empty()).then(|| parts.join(" "))
    }

    fn apply(&self, mut request: ApiRequest) -> ApiRequest {
        request = request
            .query("per_page", self.limit)
            .query("sorting", self.sorting.as_str());
        if let Some(expression) = self.search_expression() {
            request = request.query("query", expression);
        }
        if let Some(from) = &self.date_from {
            request = request.query("date_from", from);
        }
        if let Some(to) = &self.date_to {
            request = request.query("date_to", to);
        }
        request
    }
}

/// Filters for bulk deletion. The default deletes everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteFilter {
    /// Service search expression.
    pub search: Option<String>,
    /// Delete from this time (`yyyy-MM-dd HH:mm:ss` or `now-7d`).
    pub date_from: Option<String>,
    /// Delete until this time.
    pub date_to: Option<String>,
}

/// Acknowledgement of data sent to a token.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SendReceipt {
    /// Status the token answered with.
    pub status: u16,
    /// URL the data was posted to.
    pub url: String,
    /// The JSON body that was sent.
    pub data_sent: Value,
}

#[derive(Debug, Deserialize)]
struct ListEnvelope {
    #[serde(default)]
    data: Vec<Value>,
}

fn token_path(token: &Token) -> String {
    format!("/token/{token}")
}

fn item_path(token: &Token, item_id: &str) -> Result<String> {
    let id = Uuid::parse_str(item_id).map_err(|_| Error::invalid_item_id(item_id))?;
    Ok(format!("/token/{token}/request/{}", id.hyphenated()))
}

/// Creates a token. Sent once: a retried POST could create two tokens.
#[instrument(name = "api::create_token", skip_all)]
pub(crate) async fn create_token(transport: &Transport, settings: &TokenSettings) -> Result<TokenInfo> {
    settings.validate()?;

    let mut request = ApiRequest::post("/token");
    if !settings.is_empty() {
        request = request.json(settings)?;
    }

    let info: TokenInfo = transport.call(&request).await?.json()?;
    debug!(token = %info.uuid, "Token created");
    Ok(info)
}

/// Replaces a token's settings.
#[instrument(name = "api::update_token", skip_all, fields(token = %token))]
pub(crate) async fn update_token(
    transport: &Transport,
    token: &Token,
    settings: &TokenSettings,
) -> Result<TokenInfo> {
    settings.validate()?;

    let request = ApiRequest::put(token_path(token)).json(settings)?;
    transport.call(&request).await?.json()
}

/// Reads a token's metadata.
#[instrument(name = "api::token_info", skip_all, fields(token = %token))]
pub(crate) async fn token_info(transport: &Transport, token: &Token) -> Result<TokenInfo> {
    transport
        .call(&ApiRequest::get(token_path(token)))
        .await?
        .json()
}

/// Deletes a token and everything it captured.
#[instrument(name = "api::delete_token", skip_all, fields(token = %token))]
pub(crate) async fn delete_token(transport: &Transport, token: &Token) -> Result<()> {
    transport.call(&ApiRequest::delete(token_path(token))).await?;
    Ok(())
}

/// Lists captured items. Entries the decoder does not understand are
/// skipped with a warning rather than failing the whole page.
#[instrument(
    name = "api::list_items",
    skip_all,
    fields(token = %token, limit = query.limit)
)]
pub(crate) async fn list_items(
    transport: &Transport,
    token: &Token,
    query: &ListQuery,
) -> Result<Vec<CapturedItem>> {
    let request = query.apply(ApiRequest::get(format!("/token/{token}/requests")));
    let envelope: ListEnvelope = transport.call(&request).await?.json()?;

    let total = envelope.data.len();
    let items: Vec<CapturedItem> = envelope
        .data
        .into_iter()
        .filter_map(|entry| match CapturedItem::from_json(entry) {
            Ok(item) => Some(item),
            Err(reason) => {
                warn!(reason = %reason, "Skipping malformed item");
                None
            }
        })
        .collect();

    debug!(total, decoded = items.len(), "Listed items");
    Ok(items)
}

/// Fetches the newest item, optionally of one kind.
#[instrument(name = "api::latest_item", skip_all, fields(token = %token, kind = ?kind))]
pub(crate) async fn latest_item(
    transport: &Transport,
    token: &Token,
    kind: Option<ItemKind>,
) -> Result<Option<CapturedItem>> {
    let mut query = ListQuery::new(1);
    query.kind = kind;
    let items = list_items(transport, token, &query).await?;
    Ok(items.into_iter().max_by_key(CapturedItem::order_key))
}

/// Fetches one captured item.
#[instrument(name = "api::get_item", skip_all, fields(token = %token, item_id = %item_id))]
pub(crate) async fn get_item(
    transport: &Transport,
    token: &Token,
    item_id: &str,
) -> Result<CapturedItem> {
    let path = item_path(token, item_id)?;
    let value: Value = transport.call(&ApiRequest::get(&path)).await?.json()?;
    CapturedItem::from_json(value).map_err(|reason| Error::unexpected_shape(&path, reason))
}

/// Deletes one captured item.
#[instrument(name = "api::delete_item", skip_all, fields(token = %token, item_id = %item_id))]
pub(crate) async fn delete_item(transport: &Transport, token: &Token, item_id: &str) -> Result<()> {
    let path = item_path(token, item_id)?;
    transport.call(&ApiRequest::delete(path)).await?;
    Ok(())
}

/// Deletes every captured item matching `filter`.
#[instrument(name = "api::delete_items", skip_all, fields(token = %token))]
pub(crate) async fn delete_items(
    transport: &Transport,
    token: &Token,
    filter: &DeleteFilter,
) -> Result<()> {
    let mut request = ApiRequest::delete(format!("/token/{token}/request"));
    if let Some(search) = &filter.search {
        request = request.query("query", search);
    }
    if let Some(from) = &filter.date_from {
        request = request.query("date_from", from);
    }
    if let Some(to) = &filter.date_to {
        request = request.query("date_to", to);
    }
    transport.call(&request).await?;
    Ok(())
}

/// Posts `data` as JSON to the token's capture URL, as an outside client
/// would. Sent once: every retry would be captured as another request.
#[instrument(
    name = "api::send_to_token",
    skip_all,
    fields(token = %token, headers = headers.len())
)]
pub(crate) async fn send_to_token(
    transport: &Transport,
    token: &Token,
    data: &Value,
    headers: &[(&str, &str)],
) -> Result<SendReceipt> {
    let mut request = ApiRequest::post(format!("/{token}")).json(data)?;
    for (name, value) in headers {
        request = request.header(name, value)?;
    }

    let response = transport.call(&request).await?;
    debug!(status = response.status(), "Data sent");

    Ok(SendReceipt {
        status: response.status(),
        url: format!("{}/{token}", transport.base_url()),
        data_sent: data.clone(),
    })
}

/// Extracts links from one item, or from the newest item when `item_id` is
/// `None`. Returns `None` when the token has captured nothing.
#[instrument(
    name = "api::extract_links",
    skip_all,
    fields(token = %token, item_id = ?item_id, filter_domain = ?filter_domain)
)]
pub(crate) async fn extract_links(
    transport: &Transport,
    token: &Token,
    item_id: Option<&str>,
    filter_domain: Option<&str>,
) -> Result<Option<RequestLinks>> {
    let item = match item_id {
        Some(id) => Some(get_item(transport, token, id).await?),
        None => latest_item(transport, token, None).await?,
    };

    let links = item.map(|item| RequestLinks::from_item(&item, filter_domain));
    if let Some(links) = &links {
        debug!(total = links.total_links, "Links extracted");
    }
    Ok(links)
}

/// Summarizes the items captured within the last `since`, optionally only
/// those matching `identifier`.
#[instrument(
    name = "api::check_for_callbacks",
    skip_all,
    fields(token = %token, since_secs = since.as_secs(), identifier = ?identifier)
)]
pub(crate) async fn check_for_callbacks(
    transport: &Transport,
    token: &Token,
    since: Duration,
    identifier: Option<&str>,
) -> Result<CallbackReport> {
    inspect::validate_window(since)?;
    let identifier = identifier.filter(|id| !id.is_empty());

    let mut query =
        ListQuery::new(CALLBACK_PAGE_SIZE).date_from(inspect::window_start(Utc::now(), since));
    if let Some(identifier) = identifier {
        query = query.search(identifier);
    }

    let items = list_items(transport, token, &query).await?;
    let report = CallbackReport::from_items(items, since, identifier);
    if report.detected {
        info!(total = report.total_callbacks, "Callbacks detected");
    }
    Ok(report)
}

/// The item list of one token, as an [`ItemSource`] for the poller.
pub(crate) struct TokenItems<'a> {
    transport: &'a Transport,
    token: &'a Token,
    query: ListQuery,
}

impl<'a> TokenItems<'a> {
    pub(crate) fn new(transport: &'a Transport, token: &'a Token, query: ListQuery) -> Self {
        Self {
            transport,
            token,
            query,
        }
    }
}

impl ItemSource for TokenItems<'_> {
    fn fetch(&self) -> BoxFuture<'_, Result<Vec<CapturedItem>>> {
        Box::pin(list_items(self.transport, self.token, &self.query))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::retry::RetryConfig;
    use serde_json::json;
    use wiremock::{matchers, Mock, MockServer, ResponseTemplate};

    const TOKEN: &str = "550e8400-e29b-41d4-a716-446655440000";

    fn transport(server: &MockServer) -> Transport {
        let config = ClientConfig::builder()
            .base_url(server.uri())
            .retry(RetryConfig::disabled())
            .build()
            .unwrap();
        Transport::new(&config).unwrap()
    }

    fn token() -> Token {
        Token::parse(TOKEN).unwrap()
    }

    #[test]
    fn test_settings_validation() {
        assert!(TokenSettings::new().validate().is_ok());
        assert!(TokenSettings::new().default_status(599).validate().is_ok());
        assert!(TokenSettings::new().default_status(99).validate().is_err());
        assert!(TokenSettings::new().default_status(600).validate().is_err());
        assert!(TokenSettings::new().response_delay_secs(31).validate().is_err());
        assert!(TokenSettings::new().expiry_secs(604_800).validate().is_ok());
        assert!(TokenSettings::new().expiry_secs(604_801).validate().is_err());
    }

    #[test]
    fn test_alias_rules() {
        let longest = "a".repeat(32);
        let too_long = "a".repeat(33);

        for ok in ["abc", "my_hook-1", longest.as_str()] {
            assert!(validate_alias(ok).is_ok(), "{ok} should be accepted");
        }
        for bad in ["ab", "-abc", "abc-", "has space", "dot.ted", too_long.as_str()] {
            assert!(validate_alias(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn test_settings_payload_skips_unset_fields() {
        let payload = serde_json::to_value(
            TokenSettings::new()
                .default_status(201)
                .response_delay_secs(2)
                .cors(true),
        )
        .unwrap();
        assert_eq!(payload, json!({"default_status": 201, "timeout": 2, "cors": true}));
    }

    #[test]
    fn test_list_query_expression() {
        assert_eq!(ListQuery::new(5).search_expression(), None);
        assert_eq!(
            ListQuery::new(5).kind(ItemKind::Dns).search_expression().as_deref(),
            Some("type:dns")
        );
        assert_eq!(ListQuery::new(0).limit(), 1);
        assert_eq!(ListQuery::new(500).limit(), 100);
    }

    #[test]
    fn test_item_path_validates_id() {
        assert!(item_path(&token(), "../../etc").is_err());
        assert_eq!(
            item_path(&token(), "6BA7B810-9DAD-11D1-80B4-00C04FD430C8").unwrap(),
            format!("/token/{TOKEN}/request/6ba7b810-9dad-11d1-80b4-00c04fd430c8")
        );
    }

    #[tokio::test]
    async fn test_list_items_sends_filters_and_skips_malformed() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("GET"))
            .and(matchers::path(format!("/token/{TOKEN}/requests")))
            .and(matchers::query_param("per_page", "10"))
            .and(matchers::query_param("sorting", "newest"))
            .and(matchers::query_param("query", "type:email"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    {"uuid": "e1", "type": "email", "created_at": "2024-05-01 10:00:00"},
                    {"type": "email"},
                    "garbage"
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let items = list_items(
            &transport(&server),
            &token(),
            &ListQuery::new(10).kind(ItemKind::Email),
        )
        .await
        .unwrap();

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, "e1");
    }

    #[tokio::test]
    async fn test_create_token_posts_settings() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .and(matchers::path("/token"))
            .and(matchers::body_json(json!({"alias": "my-hook"})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "uuid": TOKEN,
                "alias": "my-hook",
                "default_status": 200,
                "requests": 0
            })))
            .expect(1)
            .mount(&server)
            .await;

        let info = create_token(&transport(&server), &TokenSettings::new().alias("my-hook"))
            .await
            .unwrap();

        assert_eq!(info.uuid, token());
        assert_eq!(info.alias.as_deref(), Some("my-hook"));
        assert_eq!(info.requests_count, Some(0));
    }

    #[tokio::test]
    async fn test_invalid_settings_never_reach_the_network() {
        let server = MockServer::start().await;
        Mock::given(matchers::any())
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let err = create_token(&transport(&server), &TokenSettings::new().default_status(42))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTokenSettings { .. }));
    }

    #[tokio::test]
    async fn test_get_item_decodes_single_item() {
        let server = MockServer::start().await;
        let id = "6ba7b810-9dad-41d1-80b4-00c04fd430c8";
        Mock::given(matchers::method("GET"))
            .and(matchers::path(format!("/token/{TOKEN}/request/{id}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "uuid": id,
                "type": "web",
                "method": "PUT",
                "created_at": "2024-05-01 10:00:00"
            })))
            .mount(&server)
            .await;

        let item = get_item(&transport(&server), &token(), id).await.unwrap();
        assert_eq!(item.method(), Some("PUT"));
    }

    #[tokio::test]
    async fn test_send_to_token_posts_json_and_headers() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .and(matchers::path(format!("/{TOKEN}")))
            .and(matchers::header("x-event", "order.paid"))
            .and(matchers::body_json(json!({"order": 42})))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .expect(1)
            .mount(&server)
            .await;

        let receipt = send_to_token(
            &transport(&server),
            &token(),
            &json!({"order": 42}),
            &[("X-Event", "order.paid")],
        )
        .await
        .unwrap();

        assert_eq!(receipt.status, 200);
        assert_eq!(receipt.url, format!("{}/{TOKEN}", server.uri()));
        assert_eq!(receipt.data_sent, json!({"order": 42}));
    }

    #[tokio::test]
    async fn test_send_rejects_bad_header_before_io() {
        let server = MockServer::start().await;
        Mock::given(matchers::any())
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let err = send_to_token(&transport(&server), &token(), &json!({}), &[("bad name", "x")])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidHeader { .. }));
    }

    #[tokio::test]
    async fn test_extract_links_from_latest_item() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("GET"))
            .and(matchers::path(format!("/token/{TOKEN}/requests")))
            .and(matchers::query_param("per_page", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{
                    "uuid": "r1",
                    "type": "web",
                    "created_at": "2024-05-01 10:00:00",
                    "content": "reset: https://example.com/reset?t=9 api: https://api.other.org/v2"
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let links = extract_links(&transport(&server), &token(), None, Some("example.com"))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(links.item_id, "r1");
        assert_eq!(links.links.all_links, vec!["https://example.com/reset?t=9"]);
        assert_eq!(links.links.auth_links, vec!["https://example.com/reset?t=9"]);
        assert!(links.links.api_links.is_empty());
    }

    #[derive(Clone, Default)]
    struct SpanNames(std::sync::Arc<std::sync::Mutex<Vec<&'static str>>>);

    impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for SpanNames {
        fn on_new_span(
            &self,
            attrs: &tracing::span::Attributes<'_>,
            _id: &tracing::span::Id,
            _ctx: tracing_subscriber::layer::Context<'_, S>,
        ) {
            self.0.lock().unwrap().push(attrs.metadata().name());
        }
    }

    #[tokio::test]
    async fn test_latest_item_span_is_named_after_the_operation() {
        use tracing_subscriber::layer::SubscriberExt;

        let server = MockServer::start().await;
        Mock::given(matchers::method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
            .mount(&server)
            .await;

        let names = SpanNames::default();
        let subscriber = tracing_subscriber::registry().with(names.clone());
        let _guard = tracing::subscriber::set_default(subscriber);

        let latest = latest_item(&transport(&server), &token(), None).await.unwrap();

        assert!(latest.is_none());
        let names = names.0.lock().unwrap();
        assert!(names.contains(&"api::latest_item"), "spans: {names:?}");
        assert!(names.contains(&"api::list_items"), "spans: {names:?}");
    }

    #[tokio::test]
    async fn test_extract_links_from_empty_token() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
            .mount(&server)
            .await;

        let links = extract_links(&transport(&server), &token(), None, None).await.unwrap();
        assert!(links.is_none());
    }

    #[tokio::test]
    async fn test_check_for_callbacks_filters_by_window_and_identifier() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("GET"))
            .and(matchers::path(format!("/token/{TOKEN}/requests")))
            .and(matchers::query_param("per_page", "50"))
            .and(matchers::query_param("sorting", "newest"))
            .and(matchers::query_param("query", "inj-3"))
            .and(|request: &wiremock::Request| {
                request.url.query_pairs().any(|(key, value)| {
                    key == "date_from"
                        && chrono::NaiveDateTime::parse_from_str(&value, "%Y-%m-%d %H:%M:%S").is_ok()
                })
            })
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    {
                        "uuid": "w1",
                        "type": "web",
                        "method": "GET",
                        "url": format!("https://webhook.site/{TOKEN}?id=inj-3"),
                        "ip": "198.51.100.9",
                        "headers": {"user-agent": ["curl/8.5"]},
                        "created_at": "2024-05-01 10:00:02"
                    },
                    {
                        "uuid": "d1",
                        "type": "dns",
                        "created_at": "2024-05-01 10:00:01"
                    }
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let report = check_for_callbacks(
            &transport(&server),
            &token(),
            Duration::from_secs(1800),
            Some("inj-3"),
        )
        .await
        .unwrap();

        assert!(report.detected);
        assert_eq!(report.total_callbacks, 2);
        assert_eq!(report.by_kind.web, 1);
        assert_eq!(report.by_kind.dns, 1);
        assert_eq!(report.since_minutes, 30);
        assert_eq!(report.callbacks[0].item_id, "w1");
        assert_eq!(report.callbacks[0].user_agent, "curl/8.5");
        assert!(report.callbacks[0].matched_identifier);
        assert!(!report.callbacks[1].matched_identifier);
    }

    #[tokio::test]
    async fn test_check_for_callbacks_rejects_short_window() {
        let server = MockServer::start().await;
        let err = check_for_callbacks(&transport(&server), &token(), Duration::from_secs(5), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTimeout { name: "callback window", .. }));
    }

    #[tokio::test]
    async fn test_delete_items_passes_filter() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("DELETE"))
            .and(matchers::path(format!("/token/{TOKEN}/request")))
            .and(matchers::query_param("date_to", "now-7d"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let filter = DeleteFilter {
            date_to: Some("now-7d".into()),
            ..DeleteFilter::default()
        };
        delete_items(&transport(&server), &token(), &filter)
            .await
            .unwrap();
    }
}
