// src/feeds/lossy.rs
//! Detects feeds whose bounded "latest" window rolled over between polls.
//!
//! Only used by feeds backed by a size-bounded listing. Change-log feeds
//! cannot lose entries to window truncation and skip this check.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use metrics::counter;

use super::types::Package;
use crate::events::{Event, EventHandler};

type PackageKey = (String, String);

/// Result of inspecting one poll's window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LossyCheck {
    /// First poll for this feed: nothing to compare against yet.
    Baseline,
    /// At least one key overlapped, or one side was empty.
    Covered { overlap: usize },
    /// Consecutive windows were fully disjoint; an alert was raised.
    Lossy,
}

/// One instance per feed. Holds the (name, version) keys seen by the
/// previous poll, in memory only.
pub struct LossyFeedAlerter {
    events: Arc<EventHandler>,
    previous: Mutex<Option<HashSet<PackageKey>>>,
}

impl LossyFeedAlerter {
    pub fn new(events: Arc<EventHandler>) -> Self {
        Self {
            events,
            previous: Mutex::new(None),
        }
    }

    /// Compares `packages` (the feed's raw window, before the cutoff) against
    /// the previous poll, replaces the stored keys, and alerts on a fully
    /// disjoint pair of non-empty windows.
    ///
    /// Alert delivery failures are logged; they never fail the poll.
    pub async fn process_packages(
        &self,
        feed: &str,
        packages: &[Package],
        now: DateTime<Utc>,
    ) -> LossyCheck {
        let current: HashSet<PackageKey> = packages.iter().map(Package::key).collect();
        let check = self.swap_window(current);

        if check == LossyCheck::Lossy {
            counter!("feeds_lossy_alerts_total", "feed" => feed.to_string()).increment(1);
            tracing::warn!(feed, "no overlap with previous poll; feed may be lossy");
            let event = Event::lossy_feed(feed, now);
            if let Err(e) = self.events.dispatch_event(&event).await {
                tracing::error!(
                    feed,
                    sink = self.events.sink_name(),
                    error = %e,
                    "failed to dispatch lossy feed event"
                );
            }
        }
        check
    }

    // The lock is released before any await.
    fn swap_window(&self, current: HashSet<PackageKey>) -> LossyCheck {
        let mut guard = match self.previous.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        let check = match guard.as_ref() {
            None => LossyCheck::Baseline,
            Some(previous) => {
                let overlap = previous.intersection(&current).count();
                if overlap == 0 && !previous.is_empty() && !current.is_empty() {
                    LossyCheck::Lossy
                } else {
                    LossyCheck::Covered { overlap }
                }
            }
        };
        *guard = Some(current);
        check
    }
}
