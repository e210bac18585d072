//! Retrying HTTP transport for the capture-service API.
//!
//! One [`Transport`] owns one pooled `reqwest::Client`; clones share the pool.
//! Idempotent calls are retried with exponential backoff (see
//! [`RetryBudget`]), everything else is sent exactly once.

use crate::config::{ClientConfig, MAX_REQUEST_TIMEOUT};
use crate::error::{Error, Result};
use crate::retry::{RetryBudget, RetryConfig, RetryDecision};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, RETRY_AFTER};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Longest error body kept in [`Error::HttpStatus`].
const MAX_ERROR_BODY: usize = 1024;

/// One API call: method, path relative to the base URL, query and body.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    headers: HeaderMap,
    body: Option<serde_json::Value>,
    timeout: Option<Duration>,
}

impl ApiRequest {
    /// Creates a request for `path` (which must start with `/`).
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: HeaderMap::new(),
            body: None,
            timeout: None,
        }
    }

    /// Creates a `GET` request.
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    /// Creates a `POST` request.
    #[must_use]
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    /// Creates a `PUT` request.
    #[must_use]
    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    /// Creates a `DELETE` request.
    #[must_use]
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Appends a query parameter.
    #[must_use]
    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    /// Adds a header, replacing a client default of the same name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHeader`] if the name or value is not valid in
    /// an HTTP header.
    pub fn header(mut self, name: &str, value: &str) -> Result<Self> {
        let header_name =
            HeaderName::from_bytes(name.as_bytes()).map_err(|_| Error::invalid_header(name))?;
        let header_value = HeaderValue::from_str(value).map_err(|_| Error::invalid_header(name))?;
        self.headers.insert(header_name, header_value);
        Ok(self)
    }

    /// Sets a JSON body.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] if `body` cannot be represented as JSON.
    pub fn json<T: Serialize>(mut self, body: &T) -> Result<Self> {
        let value = serde_json::to_value(body).map_err(|source| Error::Decode {
            path: self.path.clone(),
            source,
        })?;
        self.body = Some(value);
        Ok(self)
    }

    /// Overrides the per-call timeout. Zero means the configured default;
    /// anything above 300 s is clamped.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Returns the HTTP method.
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the API path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns `true` for methods that are safe to repeat.
    #[must_use]
    pub fn is_idempotent(&self) -> bool {
        matches!(
            self.method,
            Method::GET | Method::HEAD | Method::OPTIONS | Method::DELETE
        )
    }
}

/// A successful (2xx) API response.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    status: u16,
    path: String,
    body: String,
}

impl ApiResponse {
    /// HTTP status code.
    #[must_use]
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Raw response body.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.body
    }

    /// Decodes the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] if the body is not the expected JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.body).map_err(|source| Error::Decode {
            path: self.path.clone(),
            source,
        })
    }
}

/// Connection-pooled HTTP client with timeout and retry policy.
#[derive(Debug, Clone)]
pub struct Transport {
    client: reqwest::Client,
    base_url: String,
    retry: RetryConfig,
    default_timeout: Duration,
}

impl Transport {
    /// Builds the HTTP client described by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for an unusable API key or proxy and
    /// [`Error::BuildClient`] if the TLS backend cannot be initialized.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        if let Some(api_key) = config.api_key() {
            let mut value = HeaderValue::from_str(api_key).map_err(|_| Error::InvalidConfig {
                message: "api key contains characters not allowed in a header".into(),
            })?;
            value.set_sensitive(true);
            headers.insert("api-key", value);
        }

        let mut builder = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(config.user_agent.as_str())
            .connect_timeout(config.timeouts.connect)
            .pool_idle_timeout(config.timeouts.pool_idle)
            .https_only(config.base_url().starts_with("https://"));

        if let Some(proxy) = &config.proxy {
            debug!(proxy = %proxy, "Routing API traffic through SOCKS5 proxy");
            builder = builder.proxy(proxy.to_reqwest()?);
        }

        let client = builder
            .build()
            .map_err(|source| Error::BuildClient { source })?;

        Ok(Self {
            client,
            base_url: config.base_url().to_string(),
            retry: config.retry.clone(),
            default_timeout: config.timeouts.request.min(MAX_REQUEST_TIMEOUT),
        })
    }

    /// Returns the API base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Timeout applied to a call that requested `requested`.
    #[must_use]
    pub fn effective_timeout(&self, requested: Option<Duration>) -> Duration {
        match requested {
            Some(timeout) if !timeout.is_zero() => timeout.min(MAX_REQUEST_TIMEOUT),
            _ => self.default_timeout,
        }
    }

    /// Sends a request, retrying transient failures of idempotent calls.
    ///
    /// A 2xx response is returned as-is (an empty list is a success, not an
    /// error). Everything else becomes an [`Error`].
    ///
    /// # Errors
    ///
    /// Returns the last [`Error::Network`], [`Error::RequestTimeout`] or
    /// [`Error::HttpStatus`] once retries are exhausted or not permitted.
    #[instrument(
        name = "Transport::call",
        skip_all,
        fields(method = %request.method, path = %request.path)
    )]
    pub async fn call(&self, request: &ApiRequest) -> Result<ApiResponse> {
        let timeout = self.effective_timeout(request.timeout);
        let policy = if request.is_idempotent() {
            self.retry.clone()
        } else {
            RetryConfig::disabled()
        };
        let mut budget = RetryBudget::new(policy);

        loop {
            let attempt = budget.failures() + 1;

            let error = match self.send_once(request, timeout).await {
                Ok(response) => {
                    debug!(attempt, status = response.status, "Request completed");
                    return Ok(response);
                }
                Err(error) => error,
            };

            match budget.record_failure(&error) {
                RetryDecision::Retry { delay } => {
                    warn!(
                        attempt,
                        error = %error,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "Transient failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::GiveUp { reason } => {
                    debug!(attempt, reason = %reason, "Giving up");
                    return Err(error);
                }
            }
        }
    }

    async fn send_once(&self, request: &ApiRequest, timeout: Duration) -> Result<ApiResponse> {
        let url = format!("{}{}", self.base_url, request.path);

        let mut builder = self
            .client
            .request(request.method.clone(), &url)
            .timeout(timeout);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if !request.headers.is_empty() {
            builder = builder.headers(request.headers.clone());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|source| send_error(request, timeout, source))?;

        let status = response.status();
        let retry_after = parse_retry_after(response.headers());
        let body = response
            .text()
            .await
            .map_err(|source| send_error(request, timeout, source))?;

        if !status.is_success() {
            return Err(Error::HttpStatus {
                method: request.method.to_string(),
                path: request.path.clone(),
                status: status.as_u16(),
                body: truncate_body(&body),
                retry_after: retry_after.filter(|_| status == StatusCode::TOO_MANY_REQUESTS),
            });
        }

        Ok(ApiResponse {
            status: status.as_u16(),
            path: request.path.clone(),
            body,
        })
    }
}

fn send_error(request: &ApiRequest, timeout: Duration, source: reqwest::Error) -> Error {
    if source.is_timeout() {
        Error::RequestTimeout {
            method: request.method.to_string(),
            path: request.path.clone(),
            timeout,
        }
    } else {
        Error::Network {
            method: request.method.to_string(),
            path: request.path.clone(),
            source,
        }
    }
}

/// Reads `Retry-After` as delay-seconds or an HTTP date.
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let raw = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();

    if let Ok(seconds) = raw.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    let at = chrono::DateTime::parse_from_rfc2822(raw).ok()?;
    let wait = at.with_timezone(&chrono::Utc) - chrono::Utc::now();
    Some(wait.to_std().unwrap_or(Duration::ZERO))
}

fn truncate_body(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY {
        return body.to_string();
    }
    let mut end = MAX_ERROR_BODY;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... (truncated)", &body[..end])
}
