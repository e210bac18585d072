//! Error types for the webhook-sync crate.
//!
//! All errors implement [`std::error::Error`] and provide context about what went wrong.
//! Errors are categorized by their retryability - see [`Error::is_retryable`].
//!
//! Note that a wait that runs out of time is *not* an error: it is reported as
//! [`WaitResult::TimedOut`](crate::WaitResult::TimedOut).

use std::time::Duration;
use thiserror::Error;

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while talking to the capture service.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    // ─────────────────────────────────────────────────────────────────────────
    // Validation errors (NOT retryable, raised before any I/O)
    // ─────────────────────────────────────────────────────────────────────────
    /// Token is not a UUID-v4 string.
    #[error("invalid token '{token}': expected a UUID v4")]
    InvalidToken {
        /// The rejected token (truncated).
        token: String,
    },

    /// Captured item identifier is not a UUID.
    #[error("invalid item id '{id}': expected a UUID")]
    InvalidItemId {
        /// The rejected identifier (truncated).
        id: String,
    },

    /// A wait timeout or poll interval is outside the accepted range.
    #[error("invalid {name}: {value:?} is outside {min:?}..={max:?}")]
    InvalidTimeout {
        /// Which parameter was rejected.
        name: &'static str,
        /// The rejected value.
        value: Duration,
        /// Smallest accepted value.
        min: Duration,
        /// Largest accepted value.
        max: Duration,
    },

    /// A request header name or value is not valid HTTP.
    #[error("invalid header '{name}'")]
    InvalidHeader {
        /// The rejected header name (truncated).
        name: String,
    },

    /// A payload identifier is not 1-63 characters of `[A-Za-z0-9_-]`.
    #[error("invalid identifier '{identifier}': expected 1-63 characters of [A-Za-z0-9_-]")]
    InvalidIdentifier {
        /// The rejected identifier (truncated).
        identifier: String,
    },

    /// Invalid client configuration.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the configuration error.
        message: String,
    },

    /// Invalid settings for creating a token.
    #[error("invalid token settings: {message}")]
    InvalidTokenSettings {
        /// Description of the rejected setting.
        message: String,
    },

    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client")]
    BuildClient {
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Transport errors (RETRYABLE, except client-side HTTP statuses)
    // ─────────────────────────────────────────────────────────────────────────
    /// The request could not be sent or the connection dropped.
    #[error("{method} {path} failed")]
    Network {
        /// HTTP method of the failed request.
        method: String,
        /// API path of the failed request.
        path: String,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },

    /// The request did not complete within its timeout.
    #[error("{method} {path} timed out after {timeout:?}")]
    RequestTimeout {
        /// HTTP method of the failed request.
        method: String,
        /// API path of the failed request.
        path: String,
        /// The timeout that was exceeded.
        timeout: Duration,
    },

    /// The service answered with a non-success status.
    #[error("{method} {path} returned HTTP {status}")]
    HttpStatus {
        /// HTTP method of the failed request.
        method: String,
        /// API path of the failed request.
        path: String,
        /// Response status code.
        status: u16,
        /// Response body (truncated).
        body: String,
        /// Delay requested through a `Retry-After` header, if any.
        retry_after: Option<Duration>,
    },

    /// The response body was not the JSON we expected.
    #[error("failed to decode response from {path}")]
    Decode {
        /// API path of the request.
        path: String,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Email content errors (NOT retryable - malformed content won't change)
    // ─────────────────────────────────────────────────────────────────────────
    /// Failed to parse a captured email message.
    #[error("failed to parse email")]
    ParseEmail {
        /// The underlying parse error.
        #[source]
        source: mailparse::MailParseError,
    },
}

impl Error {
    /// Returns `true` if this error represents a transient failure that might succeed on retry.
    ///
    /// Server errors (5xx) and rate limiting (429) are retryable; every other
    /// HTTP status is a definitive answer from the service.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Network { .. } | Error::RequestTimeout { .. } => true,

            Error::HttpStatus { status, .. } => *status == 429 || (500..=599).contains(status),

            Error::InvalidToken { .. }
            | Error::InvalidItemId { .. }
            | Error::InvalidTimeout { .. }
            | Error::InvalidHeader { .. }
            | Error::InvalidIdentifier { .. }
            | Error::InvalidConfig { .. }
            | Error::InvalidTokenSettings { .. }
            | Error::BuildClient { .. }
            | Error::Decode { .. }
            | Error::ParseEmail { .. } => false,
        }
    }

    /// Returns the error category for metrics/logging purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::InvalidToken { .. }
            | Error::InvalidItemId { .. }
            | Error::InvalidTimeout { .. }
            | Error::InvalidHeader { .. }
            | Error::InvalidIdentifier { .. }
            | Error::InvalidTokenSettings { .. } => ErrorCategory::Validation,

            Error::InvalidConfig { .. } | Error::BuildClient { .. } => ErrorCategory::Configuration,

            Error::Network { .. } => ErrorCategory::Network,
            Error::RequestTimeout { .. } => ErrorCategory::Timeout,
            Error::HttpStatus { .. } => ErrorCategory::Http,
            Error::Decode { .. } => ErrorCategory::Decode,
            Error::ParseEmail { .. } => ErrorCategory::Parse,
        }
    }

    /// Stable, machine-readable name of the error kind.
    ///
    /// Transport failures map onto `network`, `timeout`, `http_status` and
    /// `decode`; this is the `kind` reported in a [`WaitReport`](crate::WaitReport).
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self.category() {
            ErrorCategory::Validation => "validation",
            ErrorCategory::Configuration => "configuration",
            ErrorCategory::Network => "network",
            ErrorCategory::Timeout => "timeout",
            ErrorCategory::Http => "http_status",
            ErrorCategory::Decode => "decode",
            ErrorCategory::Parse => "parse",
        }
    }

    /// HTTP status code, for [`Error::HttpStatus`].
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The error followed by each underlying cause, joined by `": "`.
    ///
    /// `Display` names only the failed operation; this also says why it
    /// failed, e.g. `GET /token/x/requests failed: ...: Connection refused`.
    #[must_use]
    pub fn detailed_message(&self) -> String {
        let mut message = self.to_string();
        let mut cause = std::error::Error::source(self);
        while let Some(source) = cause {
            let text = source.to_string();
            if !message.contains(&text) {
                message.push_str(": ");
                message.push_str(&text);
            }
            cause = source.source();
        }
        message
    }

    pub(crate) fn invalid_token(token: &str) -> Self {
        Error::InvalidToken {
            token: token.chars().take(40).collect(),
        }
    }

    pub(crate) fn invalid_item_id(id: &str) -> Self {
        Error::InvalidItemId {
            id: id.chars().take(40).collect(),
        }
    }

    pub(crate) fn invalid_header(name: &str) -> Self {
        Error::InvalidHeader {
            name: name.chars().take(40).collect(),
        }
    }

    pub(crate) fn invalid_identifier(identifier: &str) -> Self {
        Error::InvalidIdentifier {
            identifier: identifier.chars().take(40).collect(),
        }
    }

    /// A response that is valid JSON but not the shape we expect.
    pub(crate) fn unexpected_shape(path: &str, message: impl std::fmt::Display) -> Self {
        Error::Decode {
            path: path.to_string(),
            source: <serde_json::Error as serde::de::Error>::custom(message),
        }
    }
}

/// Error categories for metrics and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Caller input rejected before any I/O.
    Validation,
    /// Client configuration errors.
    Configuration,
    /// Connection-level failures.
    Network,
    /// Per-request timeouts.
    Timeout,
    /// Non-success HTTP status.
    Http,
    /// Undecodable response bodies.
    Decode,
    /// Email parsing errors.
    Parse,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Validation => write!(f, "validation"),
            ErrorCategory::Configuration => write!(f, "configuration"),
            ErrorCategory::Network => write!(f, "network"),
            ErrorCategory::Timeout => write!(f, "timeout"),
            ErrorCategory::Http => write!(f, "http"),
            ErrorCategory::Decode => write!(f, "decode"),
            ErrorCategory::Parse => write!(f, "parse"),
        }
    }
}
