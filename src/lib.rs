//! # webhook-sync
//!
//! Async client for [webhook.site](https://webhook.site) style capture services:
//! create disposable endpoints, then wait for the HTTP requests, emails and DNS
//! lookups they receive.
//!
//! This crate provides a high-level, async API for:
//! - Creating and managing capture tokens (optionally through a SOCKS5 proxy)
//! - Waiting for a new request to arrive at a token
//! - Waiting for a new email and extracting the links in it
//! - Listing, fetching and deleting captured items
//! - Summarizing out-of-band callbacks and generating payloads that trigger them
//!
//! Every HTTP call goes through a pooled [`Transport`](transport::Transport)
//! that retries transient failures of idempotent calls with exponential
//! backoff.
//!
//! ## Quick Start
//!
//! ```no_run
//! use webhook_sync::{ClientConfig, TokenSettings, WaitReport, WebhookClient};
//!
//! # async fn example() -> webhook_sync::Result<()> {
//! let client = WebhookClient::new(ClientConfig::builder().build()?)?;
//!
//! // Create a disposable endpoint
//! let token = client.create_token(&TokenSettings::new().default_status(204)).await?;
//! println!("POST something to {}", client.addresses(&token.uuid, None).url);
//!
//! // Wait up to the configured 60 seconds for it
//! let result = client
//!     .wait_for_request(&token.uuid, client.request_wait_options())
//!     .await?;
//! println!("{}", WaitReport::from_request(&result));
//!
//! client.delete_token(&token.uuid).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Waiting for an Email
//!
//! ```no_run
//! use webhook_sync::{WaitOptions, WaitResult, WebhookClient};
//! use std::time::Duration;
//!
//! # async fn example(client: WebhookClient, token: &str) -> webhook_sync::Result<()> {
//! let options = WaitOptions::new(Duration::from_secs(120)).interval(Duration::from_secs(5));
//!
//! if let WaitResult::Matched { item, .. } = client.wait_for_email(token, options).await? {
//!     println!("subject: {:?}", item.subject);
//!     for link in &item.auth_links {
//!         println!("verification link: {link}");
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Link Extraction
//!
//! ```
//! use webhook_sync::links::{auth_links, extract_links};
//!
//! let links = extract_links("Reset at https://example.com/reset?t=1, or see https://example.com.");
//! assert_eq!(links, vec!["https://example.com/reset?t=1", "https://example.com"]);
//! assert_eq!(auth_links(&links), vec!["https://example.com/reset?t=1"]);
//! ```
//!
//! ## Callback Detection
//!
//! ```no_run
//! use webhook_sync::payloads::SsrfOptions;
//! use webhook_sync::{Token, WebhookClient};
//! use std::time::Duration;
//!
//! # async fn example(client: WebhookClient, token: Token) -> webhook_sync::Result<()> {
//! let ssrf = client.payloads(&token).ssrf(&SsrfOptions::new().identifier("avatar-url"))?;
//! println!("inject: {}", ssrf.payloads["https_url"]);
//!
//! let report = client
//!     .check_for_callbacks(&token, Duration::from_secs(600), Some("avatar-url"))
//!     .await?;
//! println!("{} callbacks, {} DNS", report.total_callbacks, report.by_kind.dns);
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! A wait that runs out of time is not an error: it is
//! [`WaitResult::TimedOut`]. Likewise, a service that stays unreachable ends
//! the wait with [`WaitResult::TransportError`]. The `Err` side of the wait
//! methods only carries validation errors raised before any network call.
//!
//! Use [`Error::is_retryable`] to tell transient failures from permanent ones:
//!
//! ```
//! use webhook_sync::Error;
//!
//! fn handle_error(error: &Error) {
//!     if error.is_retryable() {
//!         println!("Transient error, can retry: {}", error);
//!     } else {
//!         println!("Permanent error: {}", error);
//!     }
//! }
//! ```
//!
//! ## Observability
//!
//! The crate uses `tracing` for instrumentation. All major operations emit spans with
//! structured fields. No subscriber is installed by the crate.
//!
//! ### Span Naming Convention
//!
//! - `WebhookClient::new` - Client construction
//! - `WebhookClient::wait_for_request` - Waiting for a request
//! - `WebhookClient::wait_for_email` - Waiting for an email
//! - `waiter::wait_for_request` / `waiter::wait_for_email` - Baseline and polling
//! - `poller::poll_until` - The poll loop
//! - `Transport::call` - One API call, including retries
//! - `api::*` - Remote API operations
//!
//! ### Standard Fields
//!
//! - `token` - Token the operation targets
//! - `method` / `path` - HTTP method and API path
//! - `attempt` - Poll or retry attempt number
//! - `timeout_secs` - Wait budget
//! - `matcher` - Matcher description
//! - `item_id` - Captured item identifier

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Public modules
pub mod config;
pub mod endpoints;
pub mod error;
pub mod links;
pub mod matcher;
pub mod payloads;
pub mod poller;
pub mod proxy;
pub mod retry;
pub mod transport;
pub mod waiter;

// Internal modules
mod api;
mod client;
mod inspect;
mod item;
mod parser;
mod report;
mod token;

// Re-exports for ergonomic API
pub use api::{DeleteFilter, ListQuery, SendReceipt, Sorting, TokenInfo, TokenSettings};
pub use client::WebhookClient;
pub use config::{ClientConfig, ClientConfigBuilder, PollingConfig, TimeoutConfig};
pub use email_address::EmailAddress;
pub use endpoints::{ServiceHosts, TokenAddresses};
pub use error::{Error, ErrorCategory, Result};
pub use inspect::{CallbackReport, CallbackSummary, KindCounts, RequestLinks};
pub use item::{CapturedItem, ItemKind, Payload};
pub use links::LinkSummary;
pub use parser::EmailMatch;
pub use poller::WaitResult;
pub use proxy::{ProxyAuth, Socks5Proxy};
pub use report::WaitReport;
pub use retry::RetryConfig;
pub use token::Token;
pub use waiter::WaitOptions;
