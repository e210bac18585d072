//! Predicates over captured items.
//!
//! The poller asks an [`ItemMatcher`] whether an item ends the wait. Built-in
//! matchers cover "newer than what existed before the wait", "of this kind",
//! and their conjunction; [`ClosureMatcher`] covers anything else.
//!
//! # Example
//!
//! ```
//! use webhook_sync::matcher::{AllOf, Baseline, ClosureMatcher, ItemMatcher, KindMatcher, NewerThan};
//! use webhook_sync::ItemKind;
//!
//! let matcher = AllOf::new(vec![
//!     Box::new(NewerThan::new(Baseline::empty())),
//!     Box::new(KindMatcher::new(ItemKind::Web)),
//!     Box::new(ClosureMatcher::new(|item| item.method() == Some("POST"), "POST only")),
//! ]);
//! assert_eq!(matcher.description(), "newer than baseline AND kind web AND POST only");
//! ```

use crate::item::{CapturedItem, ItemKind};
use chrono::{DateTime, Utc};
use std::collections::HashSet;

/// Trait for deciding whether a captured item ends a wait.
///
/// Implement this trait to define custom matching logic.
pub trait ItemMatcher: Send + Sync {
    /// Returns `true` if the item satisfies this matcher.
    fn matches(&self, item: &CapturedItem) -> bool;

    /// Returns a human-readable description of what this matcher looks for.
    ///
    /// Used in logging.
    fn description(&self) -> &str;
}

/// Snapshot of the newest items that existed when a wait began.
///
/// The service stores timestamps with second precision, so the snapshot keeps
/// the highest ordering key plus every identifier sharing it. An item that
/// shares the key but is not in the snapshot arrived later.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Baseline {
    key: Option<(DateTime<Utc>, i64)>,
    ids_at_key: HashSet<String>,
}

impl Baseline {
    /// Baseline of a token with no history; every item is newer.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Records the newest key among `items`.
    #[must_use]
    pub fn capture(items: &[CapturedItem]) -> Self {
        let Some(key) = items.iter().map(CapturedItem::order_key).max() else {
            return Self::empty();
        };

        let ids_at_key = items
            .iter()
            .filter(|item| item.order_key() == key)
            .map(|item| item.id.clone())
            .collect();

        Self {
            key: Some(key),
            ids_at_key,
        }
    }

    /// Returns `true` if nothing existed when the baseline was taken.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.key.is_none()
    }

    /// Returns `true` if `item` is strictly newer than the baseline.
    #[must_use]
    pub fn admits(&self, item: &CapturedItem) -> bool {
        match self.key {
            None => true,
            Some(key) => {
                let item_key = item.order_key();
                item_key > key || (item_key == key && !self.ids_at_key.contains(&item.id))
            }
        }
    }
}

/// Matches items newer than a [`Baseline`].
#[derive(Debug, Clone)]
pub struct NewerThan {
    baseline: Baseline,
}

impl NewerThan {
    /// Creates a matcher admitting items newer than `baseline`.
    #[must_use]
    pub fn new(baseline: Baseline) -> Self {
        Self { baseline }
    }
}

impl ItemMatcher for NewerThan {
    fn matches(&self, item: &CapturedItem) -> bool {
        self.baseline.admits(item)
    }

    fn description(&self) -> &str {
        "newer than baseline"
    }
}

/// Matches items of one kind.
#[derive(Debug, Clone)]
pub struct KindMatcher {
    kind: ItemKind,
    description: String,
}

impl KindMatcher {
    /// Creates a matcher for items of `kind`.
    #[must_use]
    pub fn new(kind: ItemKind) -> Self {
        Self {
            kind,
            description: format!("kind {kind}"),
        }
    }
}

impl ItemMatcher for KindMatcher {
    fn matches(&self, item: &CapturedItem) -> bool {
        item.kind == self.kind
    }

    fn description(&self) -> &str {
        &self.description
    }
}

/// Matches items accepted by every inner matcher.
pub struct AllOf {
    matchers: Vec<Box<dyn ItemMatcher>>,
    description: String,
}

impl AllOf {
    /// Combines `matchers`; an empty list matches everything.
    #[must_use]
    pub fn new(matchers: Vec<Box<dyn ItemMatcher>>) -> Self {
        let description = if matchers.is_empty() {
            "any item".to_string()
        } else {
            matchers
                .iter()
                .map(|m| m.description())
                .collect::<Vec<_>>()
                .join(" AND ")
        };
        Self {
            matchers,
            description,
        }
    }
}

impl ItemMatcher for AllOf {
    fn matches(&self, item: &CapturedItem) -> bool {
        self.matchers.iter().all(|m| m.matches(item))
    }

    fn description(&self) -> &str {
        &self.description
    }
}

impl std::fmt::Debug for AllOf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AllOf")
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// Matcher using a closure for custom matching logic.
///
/// # Example
///
/// ```
/// use webhook_sync::matcher::{ClosureMatcher, ItemMatcher};
///
/// let matcher = ClosureMatcher::new(
///     |item| item.header("x-github-event") == Some("push"),
///     "GitHub push events",
/// );
/// assert_eq!(matcher.description(), "GitHub push events");
/// ```
pub struct ClosureMatcher<F>
where
    F: Fn(&CapturedItem) -> bool + Send + Sync,
{
    matcher_fn: F,
    description: String,
}

impl<F> ClosureMatcher<F>
where
    F: Fn(&CapturedItem) -> bool + Send + Sync,
{
    /// Creates a new closure-based matcher.
    #[must_use]
    pub fn new(matcher_fn: F, description: impl Into<String>) -> Self {
        Self {
            matcher_fn,
            description: description.into(),
        }
    }
}

impl<F> ItemMatcher for ClosureMatcher<F>
where
    F: Fn(&CapturedItem) -> bool + Send + Sync,
{
    fn matches(&self, item: &CapturedItem) -> bool {
        (self.matcher_fn)(item)
    }

    fn description(&self) -> &str {
        &self.description
    }
}

impl<F> std::fmt::Debug for ClosureMatcher<F>
where
    F: Fn(&CapturedItem) -> bool + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClosureMatcher")
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}
