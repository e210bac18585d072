//! Configuration for the capture-service client.
//!
//! Use [`ClientConfigBuilder`] to create a configuration with sensible defaults:
//!
//! ```
//! use webhook_sync::ClientConfig;
//! use std::time::Duration;
//!
//! let config = ClientConfig::builder()
//!     .api_key("my-api-key")
//!     .poll_interval(Duration::from_secs(1))
//!     .build()
//!     .expect("valid config");
//!
//! assert_eq!(config.base_url(), "https://webhook.site");
//! ```

use crate::endpoints::{ServiceHosts, DEFAULT_WEB_BASE};
use crate::error::{Error, Result};
use crate::proxy::Socks5Proxy;
use crate::retry::RetryConfig;
use secrecy::{ExposeSecret, SecretString};
use std::net::IpAddr;
use std::time::Duration;

/// Environment variable overriding the API base URL.
pub const ENV_BASE_URL: &str = "WEBHOOK_SITE_BASE_URL";
/// Environment variable holding the API key.
pub const ENV_API_KEY: &str = "WEBHOOK_SITE_API_KEY";

/// Shortest accepted wait timeout.
pub const MIN_WAIT_TIMEOUT: Duration = Duration::from_secs(1);
/// Longest accepted wait timeout.
pub const MAX_WAIT_TIMEOUT: Duration = Duration::from_secs(600);
/// Shortest accepted poll interval.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(100);
/// Longest accepted poll interval.
pub const MAX_POLL_INTERVAL: Duration = Duration::from_secs(60);
/// Upper bound for a single transport call.
pub const MAX_REQUEST_TIMEOUT: Duration = Duration::from_secs(300);
/// Largest page the list endpoint serves.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Configuration for talking to the capture service.
///
/// Create using [`ClientConfig::builder()`] or [`ClientConfig::from_env()`].
///
/// Note: the API key is stored as a [`SecretString`] and never appears in
/// `Debug` output.
#[derive(Clone)]
pub struct ClientConfig {
    /// API base URL without trailing slash (validated in `build`).
    base_url: String,
    /// Optional API key, sent as the `Api-Key` header.
    api_key: Option<SecretString>,
    /// `User-Agent` header value.
    pub user_agent: String,
    /// Optional SOCKS5 proxy for all API traffic.
    pub proxy: Option<Socks5Proxy>,
    /// Timeout configuration.
    pub timeouts: TimeoutConfig,
    /// Retry policy for idempotent calls.
    pub retry: RetryConfig,
    /// Polling configuration for wait operations.
    pub polling: PollingConfig,
    /// Host names used to derive capture addresses.
    pub hosts: ServiceHosts,
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("user_agent", &self.user_agent)
            .field("proxy", &self.proxy)
            .field("timeouts", &self.timeouts)
            .field("retry", &self.retry)
            .field("polling", &self.polling)
            .field("hosts", &self.hosts)
            .finish()
    }
}

impl ClientConfig {
    /// Creates a new configuration builder.
    #[must_use]
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// Builds a configuration from `WEBHOOK_SITE_BASE_URL` and
    /// `WEBHOOK_SITE_API_KEY`, falling back to defaults for unset variables.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the base URL is not acceptable.
    pub fn from_env() -> Result<Self> {
        let mut builder = Self::builder();

        if let Some(base_url) = non_empty_env(ENV_BASE_URL) {
            builder = builder.base_url(base_url);
        }
        if let Some(api_key) = non_empty_env(ENV_API_KEY) {
            builder = builder.api_key(api_key);
        }

        builder.build()
    }

    /// Returns the API base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the API key, if one is configured.
    ///
    /// The key is intentionally not a public field to prevent accidental logging.
    #[must_use]
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_ref().map(ExposeSecret::expose_secret)
    }
}

/// Timeout configuration for transport calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeoutConfig {
    /// Default timeout of a single HTTP call (clamped to 300 s).
    pub request: Duration,
    /// Timeout for establishing a TCP/TLS connection.
    pub connect: Duration,
    /// How long an idle pooled connection is kept.
    pub pool_idle: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request: Duration::from_secs(30),
            connect: Duration::from_secs(10),
            pool_idle: Duration::from_secs(90),
        }
    }
}

/// Polling configuration for wait operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollingConfig {
    /// Interval between polling attempts.
    pub interval: Duration,
    /// Consecutive failed fetches that end a wait with a transport error.
    pub max_consecutive_failures: u32,
    /// Default timeout when waiting for an HTTP request.
    pub request_timeout: Duration,
    /// Default timeout when waiting for an email.
    pub email_timeout: Duration,
    /// Items fetched per poll.
    pub page_size: u32,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            max_consecutive_failures: 3,
            request_timeout: Duration::from_secs(60),
            email_timeout: Duration::from_secs(120),
            page_size: 10,
        }
    }
}

/// Builder for [`ClientConfig`].
#[derive(Debug, Default)]
pub struct ClientConfigBuilder {
    base_url: Option<String>,
    api_key: Option<String>,
    user_agent: Option<String>,
    proxy: Option<Socks5Proxy>,
    timeouts: Option<TimeoutConfig>,
    retry: Option<RetryConfig>,
    polling: Option<PollingConfig>,
    hosts: Option<ServiceHosts>,
}

impl ClientConfigBuilder {
    /// Sets the API base URL.
    ///
    /// Must be `https://`; plain `http://` is accepted only for loopback
    /// hosts such as a local test server.
    #[must_use]
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Sets the API key.
    #[must_use]
    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Sets the `User-Agent` header.
    #[must_use]
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Routes all API traffic through a SOCKS5 proxy.
    #[must_use]
    pub fn proxy(mut self, proxy: Socks5Proxy) -> Self {
        self.proxy = Some(proxy);
        self
    }

    /// Sets timeout configuration.
    #[must_use]
    pub fn timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.timeouts = Some(timeouts);
        self
    }

    /// Sets the default timeout of a single HTTP call.
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts
            .get_or_insert_with(TimeoutConfig::default)
            .request = timeout;
        self
    }

    /// Sets the connection timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts
            .get_or_insert_with(TimeoutConfig::default)
            .connect = timeout;
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Sets how many times an idempotent call is retried.
    #[must_use]
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.retry
            .get_or_insert_with(RetryConfig::default)
            .max_retries = max_retries;
        self
    }

    /// Sets polling configuration.
    #[must_use]
    pub fn polling(mut self, polling: PollingConfig) -> Self {
        self.polling = Some(polling);
        self
    }

    /// Sets the polling interval for wait operations.
    #[must_use]
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.polling
            .get_or_insert_with(PollingConfig::default)
            .interval = interval;
        self
    }

    /// Sets how many consecutive failed fetches end a wait.
    #[must_use]
    pub fn max_consecutive_failures(mut self, failures: u32) -> Self {
        self.polling
            .get_or_insert_with(PollingConfig::default)
            .max_consecutive_failures = failures;
        self
    }

    /// Sets the host names used to derive capture addresses.
    #[must_use]
    pub fn hosts(mut self, hosts: ServiceHosts) -> Self {
        self.hosts = Some(hosts);
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for an unacceptable base URL, page size
    /// or failure tolerance, and [`Error::InvalidTimeout`] for out-of-range
    /// polling durations.
    pub fn build(self) -> Result<ClientConfig> {
        let base_url = validate_base_url(self.base_url.as_deref().unwrap_or(DEFAULT_WEB_BASE))?;

        let polling = self.polling.unwrap_or_default();
        validate_polling(&polling)?;

        let timeouts = self.timeouts.unwrap_or_default();
        if timeouts.request.is_zero() {
            return Err(Error::InvalidConfig {
                message: "request timeout must be greater than zero".into(),
            });
        }

        let api_key = self
            .api_key
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
            .map(SecretString::from);

        Ok(ClientConfig {
            base_url,
            api_key,
            user_agent: self
                .user_agent
                .unwrap_or_else(|| format!("webhook-sync/{}", env!("CARGO_PKG_VERSION"))),
            proxy: self.proxy,
            timeouts,
            retry: self.retry.unwrap_or_default(),
            polling,
            hosts: self.hosts.unwrap_or_default(),
        })
    }
}

/// Checks that `value` lies within `min..=max`.
pub(crate) fn check_range(
    name: &'static str,
    value: Duration,
    min: Duration,
    max: Duration,
) -> Result<()> {
    if value < min || value > max {
        return Err(Error::InvalidTimeout {
            name,
            value,
            min,
            max,
        });
    }
    Ok(())
}

fn validate_polling(polling: &PollingConfig) -> Result<()> {
    check_range(
        "poll interval",
        polling.interval,
        MIN_POLL_INTERVAL,
        MAX_POLL_INTERVAL,
    )?;
    check_range(
        "request wait timeout",
        polling.request_timeout,
        MIN_WAIT_TIMEOUT,
        MAX_WAIT_TIMEOUT,
    )?;
    check_range(
        "email wait timeout",
        polling.email_timeout,
        MIN_WAIT_TIMEOUT,
        MAX_WAIT_TIMEOUT,
    )?;

    if polling.max_consecutive_failures == 0 {
        return Err(Error::InvalidConfig {
            message: "max_consecutive_failures must be at least 1".into(),
        });
    }
    if !(1..=MAX_PAGE_SIZE).contains(&polling.page_size) {
        return Err(Error::InvalidConfig {
            message: format!("page_size must be within 1..={MAX_PAGE_SIZE}"),
        });
    }
    Ok(())
}

/// Requires `https://`, or `http://` on a loopback host. Returns the URL
/// without trailing slash.
fn validate_base_url(raw: &str) -> Result<String> {
    let url = reqwest::Url::parse(raw.trim()).map_err(|e| Error::InvalidConfig {
        message: format!("base_url '{raw}' is not a valid URL: {e}"),
    })?;

    let host = url.host_str().unwrap_or_default();
    let secure = match url.scheme() {
        "https" => !host.is_empty(),
        "http" => is_loopback(host),
        _ => false,
    };

    if !secure {
        return Err(Error::InvalidConfig {
            message: format!("base_url '{raw}' must use https (http only for loopback hosts)"),
        });
    }

    Ok(url.as_str().trim_end_matches('/').to_string())
}

fn is_loopback(host: &str) -> bool {
    if host.eq_ignore_ascii_case("localhost") {
        return true;
    }
    host.trim_start_matches('[')
        .trim_end_matches(']')
        .parse::<IpAddr>()
        .is_ok_and(|ip| ip.is_loopback())
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.trim().is_empty())
}
