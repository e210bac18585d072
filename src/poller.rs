//! Poll-until-match-or-deadline state machine.
//!
//! [`poll_until`] repeatedly fetches items from an [`ItemSource`] and returns
//! the newest one an [`ItemMatcher`] accepts. Between fetches it suspends on
//! the tokio timer; every fetch is raced against the wait deadline, so a
//! wait never overruns its budget by more than scheduling noise.
//!
//! Fetch failures are tolerated until `max_consecutive_failures` happen in a
//! row; a successful fetch resets the count.

use crate::config::PollingConfig;
use crate::error::Error;
use crate::item::CapturedItem;
use crate::matcher::ItemMatcher;
use futures::future::BoxFuture;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

/// Something that can be asked for the current list of captured items.
pub trait ItemSource: Send + Sync {
    /// Fetches the current items (any order).
    fn fetch(&self) -> BoxFuture<'_, crate::Result<Vec<CapturedItem>>>;
}

/// Timing knobs of one poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    /// Pause between fetches.
    pub interval: Duration,
    /// Consecutive failed fetches that end the wait.
    pub max_consecutive_failures: u32,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self::from(&PollingConfig::default())
    }
}

impl From<&PollingConfig> for PollSettings {
    fn from(config: &PollingConfig) -> Self {
        Self {
            interval: config.interval,
            max_consecutive_failures: config.max_consecutive_failures,
        }
    }
}

/// Bookkeeping of one wait call.
#[derive(Debug, Clone)]
pub struct PollState {
    started_at: Instant,
    deadline: Instant,
    attempts: u32,
    consecutive_failures: u32,
}

impl PollState {
    /// Starts the clock for a wait of at most `timeout`.
    #[must_use]
    pub fn begin(timeout: Duration) -> Self {
        let started_at = Instant::now();
        Self {
            started_at,
            deadline: started_at + timeout,
            attempts: 0,
            consecutive_failures: 0,
        }
    }

    /// Time since the wait began.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Instant at which the wait gives up.
    #[must_use]
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Fetches started so far.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Failed fetches since the last success.
    #[must_use]
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Returns `true` once the deadline has passed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }
}

/// Outcome of a wait.
#[derive(Debug)]
pub enum WaitResult<T> {
    /// A matching item arrived.
    Matched {
        /// The match.
        item: T,
        /// Time from the start of the wait to the match.
        elapsed: Duration,
    },
    /// The deadline passed without a match.
    TimedOut {
        /// Time spent waiting.
        elapsed: Duration,
    },
    /// The service could not be reached reliably.
    TransportError {
        /// The last transport failure.
        error: Error,
        /// Time spent before giving up.
        elapsed: Duration,
    },
}

impl<T> WaitResult<T> {
    /// Returns `true` for [`WaitResult::Matched`].
    #[must_use]
    pub fn is_matched(&self) -> bool {
        matches!(self, WaitResult::Matched { .. })
    }

    /// Returns `true` for [`WaitResult::TimedOut`].
    #[must_use]
    pub fn is_timed_out(&self) -> bool {
        matches!(self, WaitResult::TimedOut { .. })
    }

    /// Time spent in the wait, whatever the outcome.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        match self {
            WaitResult::Matched { elapsed, .. }
            | WaitResult::TimedOut { elapsed }
            | WaitResult::TransportError { elapsed, .. } => *elapsed,
        }
    }

    /// The matched value, if any.
    #[must_use]
    pub fn matched(&self) -> Option<&T> {
        match self {
            WaitResult::Matched { item, .. } => Some(item),
            _ => None,
        }
    }

    /// Consumes the result, returning the matched value, if any.
    #[must_use]
    pub fn into_matched(self) -> Option<T> {
        match self {
            WaitResult::Matched { item, .. } => Some(item),
            _ => None,
        }
    }

    /// The transport failure, if the wait ended with one.
    #[must_use]
    pub fn error(&self) -> Option<&Error> {
        match self {
            WaitResult::TransportError { error, .. } => Some(error),
            _ => None,
        }
    }

    /// Converts the matched value, keeping the other outcomes unchanged.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> WaitResult<U> {
        match self {
            WaitResult::Matched { item, elapsed } => WaitResult::Matched {
                item: f(item),
                elapsed,
            },
            WaitResult::TimedOut { elapsed } => WaitResult::TimedOut { elapsed },
            WaitResult::TransportError { error, elapsed } => {
                WaitResult::TransportError { error, elapsed }
            }
        }
    }
}

/// Polls `source` until `matcher` accepts an item or the deadline passes.
///
/// Items are examined newest first, so when several new items are present
/// the most recent match wins.
#[instrument(
    name = "poller::poll_until",
    skip_all,
    fields(
        matcher = %matcher.description(),
        interval_ms = u64::try_from(settings.interval.as_millis()).unwrap_or(u64::MAX)
    )
)]
pub async fn poll_until(
    source: &dyn ItemSource,
    matcher: &dyn ItemMatcher,
    settings: &PollSettings,
    state: &mut PollState,
) -> WaitResult<CapturedItem> {
    loop {
        if state.is_expired() {
            debug!(attempts = state.attempts, "Deadline reached without a match");
            return WaitResult::TimedOut {
                elapsed: state.elapsed(),
            };
        }

        state.attempts += 1;
        let attempt = state.attempts;

        match tokio::time::timeout_at(state.deadline, source.fetch()).await {
            Err(_) => {
                debug!(attempt, "Fetch cut off by the wait deadline");
                return WaitResult::TimedOut {
                    elapsed: state.elapsed(),
                };
            }
            Ok(Ok(mut items)) => {
                state.consecutive_failures = 0;
                let fetched = items.len();

                items.sort_by(|a, b| b.order_key().cmp(&a.order_key()));
                if let Some(item) = items.into_iter().find(|item| matcher.matches(item)) {
                    debug!(attempt, item_id = %item.id, kind = %item.kind, "Found matching item");
                    return WaitResult::Matched {
                        item,
                        elapsed: state.elapsed(),
                    };
                }

                debug!(attempt, fetched, "No matching item yet");
            }
            Ok(Err(error)) => {
                state.consecutive_failures += 1;

                if state.consecutive_failures >= settings.max_consecutive_failures {
                    warn!(
                        attempt,
                        consecutive_failures = state.consecutive_failures,
                        error = %error,
                        "Giving up after repeated fetch failures"
                    );
                    return WaitResult::TransportError {
                        error,
                        elapsed: state.elapsed(),
                    };
                }

                warn!(
                    attempt,
                    consecutive_failures = state.consecutive_failures,
                    error = %error,
                    "Fetch failed, polling continues"
                );
            }
        }

        let wake_at = (Instant::now() + settings.interval).min(state.deadline);
        tokio::time::sleep_until(wake_at).await;
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::item::ItemKind;
    use crate::matcher::tests::item;
    use crate::matcher::{Baseline, ClosureMatcher, NewerThan};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Replays scripted fetch results, then keeps returning `steady`.
    pub(crate) struct ScriptedSource {
        script: Mutex<VecDeque<crate::Result<Vec<CapturedItem>>>>,
        steady: Vec<CapturedItem>,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl ScriptedSource {
        pub(crate) fn new(
            script: Vec<crate::Result<Vec<CapturedItem>>>,
            steady: Vec<CapturedItem>,
        ) -> Self {
            Self {
                script: Mutex::new(script.into()),
                steady,
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            }
        }

        pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl ItemSource for ScriptedSource {
        fn fetch(&self) -> BoxFuture<'_, crate::Result<Vec<CapturedItem>>> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                if !self.delay.is_zero() {
                    tokio::time::sleep(self.delay).await;
                }
                let next = self.script.lock().unwrap().pop_front();
                next.unwrap_or_else(|| Ok(self.steady.clone()))
            })
        }
    }

    pub(crate) fn unavailable() -> Error {
        Error::HttpStatus {
            method: "GET".into(),
            path: "/token/x/requests".into(),
            status: 503,
            body: String::new(),
            retry_after: None,
        }
    }

    fn settings() -> PollSettings {
        PollSettings {
            interval: Duration::from_secs(2),
            max_consecutive_failures: 3,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_when_nothing_arrives() {
        let source = ScriptedSource::new(Vec::new(), Vec::new());
        let matcher = NewerThan::new(Baseline::empty());
        let mut state = PollState::begin(Duration::from_secs(10));

        let result = poll_until(&source, &matcher, &settings(), &mut state).await;

        assert!(result.is_timed_out());
        assert_eq!(result.elapsed(), Duration::from_secs(10));
        // Fetches at t = 0, 2, 4, 6, 8, then the deadline check at 10.
        assert_eq!(source.calls(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_matches_newest_accepted_item() {
        let old = item("old", ItemKind::Web, 0, 0);
        let baseline = Baseline::capture(std::slice::from_ref(&old));
        let source = ScriptedSource::new(
            vec![Ok(vec![old.clone()])],
            vec![
                old.clone(),
                item("new-1", ItemKind::Web, 5, 0),
                item("new-2", ItemKind::Web, 6, 0),
            ],
        );
        let matcher = NewerThan::new(baseline);
        let mut state = PollState::begin(Duration::from_secs(30));

        let result = poll_until(&source, &matcher, &settings(), &mut state).await;

        assert_eq!(result.elapsed(), Duration::from_secs(2));
        assert_eq!(result.into_matched().unwrap().id, "new-2");
    }

    #[tokio::test(start_paused = true)]
    async fn test_tolerates_isolated_failures() {
        let source = ScriptedSource::new(
            vec![Err(unavailable()), Err(unavailable()), Ok(Vec::new()), Err(unavailable())],
            vec![item("a", ItemKind::Web, 1, 0)],
        );
        let matcher = NewerThan::new(Baseline::empty());
        let mut state = PollState::begin(Duration::from_secs(60));

        let result = poll_until(&source, &matcher, &settings(), &mut state).await;

        assert!(result.is_matched());
        assert_eq!(state.attempts(), 5);
        assert_eq!(state.consecutive_failures(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_consecutive_failures() {
        let source = ScriptedSource::new(
            vec![Err(unavailable()), Err(unavailable()), Err(unavailable())],
            vec![item("never", ItemKind::Web, 1, 0)],
        );
        let matcher = NewerThan::new(Baseline::empty());
        let mut state = PollState::begin(Duration::from_secs(60));

        let result = poll_until(&source, &matcher, &settings(), &mut state).await;

        assert_eq!(result.error().and_then(Error::status), Some(503));
        assert_eq!(result.elapsed(), Duration::from_secs(4));
        assert_eq!(source.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_last_sleep_is_truncated_to_deadline() {
        let source = ScriptedSource::new(Vec::new(), Vec::new());
        let matcher = NewerThan::new(Baseline::empty());
        let settings = PollSettings {
            interval: Duration::from_secs(4),
            max_consecutive_failures: 3,
        };
        let mut state = PollState::begin(Duration::from_secs(5));

        let result = poll_until(&source, &matcher, &settings, &mut state).await;

        assert_eq!(result.elapsed(), Duration::from_secs(5));
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_fetch_is_cut_off_at_deadline() {
        let source = ScriptedSource::new(Vec::new(), vec![item("late", ItemKind::Web, 1, 0)])
            .with_delay(Duration::from_secs(30));
        let matcher = NewerThan::new(Baseline::empty());
        let mut state = PollState::begin(Duration::from_secs(3));

        let result = poll_until(&source, &matcher, &settings(), &mut state).await;

        assert!(result.is_timed_out());
        assert_eq!(result.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_matcher_skips_rejected_items() {
        let source = ScriptedSource::new(
            vec![Ok(vec![item("get", ItemKind::Web, 1, 0)])],
            vec![item("get", ItemKind::Web, 1, 0), item("dns", ItemKind::Dns, 2, 0)],
        );
        let matcher = ClosureMatcher::new(|item| item.kind == ItemKind::Dns, "dns only");
        let mut state = PollState::begin(Duration::from_secs(30));

        let result = poll_until(&source, &matcher, &settings(), &mut state).await;

        assert_eq!(result.matched().map(|i| i.id.as_str()), Some("dns"));
    }

    #[test]
    fn test_map_preserves_outcome() {
        let matched: WaitResult<u32> = WaitResult::Matched {
            item: 2,
            elapsed: Duration::from_secs(1),
        };
        let mapped = matched.map(|n| n * 10);
        assert_eq!(mapped.matched(), Some(&20));

        let timed_out: WaitResult<u32> = WaitResult::TimedOut {
            elapsed: Duration::from_secs(3),
        };
        let mapped = timed_out.map(|n| n.to_string());
        assert!(mapped.is_timed_out());
        assert_eq!(mapped.elapsed(), Duration::from_secs(3));
    }
}
