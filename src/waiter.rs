//! Request and email waiters built on the poller.
//!
//! Both waiters take a baseline snapshot first, then poll until something
//! strictly newer arrives. Nothing outlives the call: the baseline, the
//! deadline and the failure counter are all created per wait.

use crate::config::{check_range, MAX_POLL_INTERVAL, MAX_WAIT_TIMEOUT, MIN_POLL_INTERVAL, MIN_WAIT_TIMEOUT};
use crate::error::Result;
use crate::item::{CapturedItem, ItemKind};
use crate::matcher::{AllOf, Baseline, ItemMatcher, KindMatcher, NewerThan};
use crate::parser::EmailMatch;
use crate::poller::{poll_until, ItemSource, PollSettings, PollState, WaitResult};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

/// Options of one wait call.
///
/// # Example
///
/// ```
/// use webhook_sync::{ItemKind, WaitOptions};
/// use std::time::Duration;
///
/// let options = WaitOptions::new(Duration::from_secs(30))
///     .interval(Duration::from_millis(500))
///     .kind(ItemKind::Web);
/// assert!(options.validate().is_ok());
///
/// assert!(WaitOptions::new(Duration::from_secs(3600)).validate().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitOptions {
    timeout: Duration,
    interval: Option<Duration>,
    kind: Option<ItemKind>,
}

impl WaitOptions {
    /// Waits at most `timeout` (1 s ..= 600 s).
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            interval: None,
            kind: None,
        }
    }

    /// Overrides the configured poll interval (100 ms ..= 60 s).
    #[must_use]
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    /// Only items of `kind` end the wait.
    ///
    /// Ignored by the email waiter, which always waits for email.
    #[must_use]
    pub fn kind(mut self, kind: ItemKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// The wait budget.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The interval override, if any.
    #[must_use]
    pub fn interval_override(&self) -> Option<Duration> {
        self.interval
    }

    /// The kind filter, if any.
    #[must_use]
    pub fn kind_filter(&self) -> Option<ItemKind> {
        self.kind
    }

    /// Checks the timeout and interval ranges.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTimeout`](crate::Error::InvalidTimeout) naming
    /// the rejected value.
    pub fn validate(&self) -> Result<()> {
        check_range("wait timeout", self.timeout, MIN_WAIT_TIMEOUT, MAX_WAIT_TIMEOUT)?;
        if let Some(interval) = self.interval {
            check_range("poll interval", interval, MIN_POLL_INTERVAL, MAX_POLL_INTERVAL)?;
        }
        Ok(())
    }

    /// Poll settings with this call's interval override applied.
    #[must_use]
    pub fn settings(&self, defaults: PollSettings) -> PollSettings {
        PollSettings {
            interval: self.interval.unwrap_or(defaults.interval),
            ..defaults
        }
    }
}

/// Waits for an item newer than anything present when the call began.
///
/// A failed baseline fetch ends the wait at once with
/// [`WaitResult::TransportError`]: the transport has already retried it.
#[instrument(
    name = "waiter::wait_for_request",
    skip_all,
    fields(timeout_secs = timeout.as_secs(), kind = ?kind)
)]
pub async fn wait_for_request(
    source: &dyn ItemSource,
    kind: Option<ItemKind>,
    timeout: Duration,
    settings: &PollSettings,
) -> WaitResult<CapturedItem> {
    let mut state = PollState::begin(timeout);

    let baseline = match tokio::time::timeout_at(state.deadline(), source.fetch()).await {
        Ok(Ok(items)) => Baseline::capture(&items),
        Ok(Err(error)) => {
            warn!(error = %error, "Baseline fetch failed");
            return WaitResult::TransportError {
                error,
                elapsed: state.elapsed(),
            };
        }
        Err(_) => {
            return WaitResult::TimedOut {
                elapsed: state.elapsed(),
            }
        }
    };
    debug!(empty = baseline.is_empty(), "Baseline captured");

    let mut matchers: Vec<Box<dyn ItemMatcher>> = vec![Box::new(NewerThan::new(baseline))];
    if let Some(kind) = kind {
        matchers.push(Box::new(KindMatcher::new(kind)));
    }
    let matcher = AllOf::new(matchers);

    let first_poll = (Instant::now() + settings.interval).min(state.deadline());
    tokio::time::sleep_until(first_poll).await;

    poll_until(source, &matcher, settings, &mut state).await
}

/// Waits for a new email and extracts its subject, sender and links.
///
/// Web and DNS items arriving during the wait are ignored.
#[instrument(name = "waiter::wait_for_email", skip_all, fields(timeout_secs = timeout.as_secs()))]
pub async fn wait_for_email(
    source: &dyn ItemSource,
    timeout: Duration,
    settings: &PollSettings,
) -> WaitResult<EmailMatch> {
    wait_for_request(source, Some(ItemKind::Email), timeout, settings)
        .await
        .map(EmailMatch::from_item)
}
