// src/feeds/mod.rs
pub mod lossy;
pub mod options;
pub mod providers;
pub mod scheduler;
pub mod types;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use once_cell::sync::OnceCell;

use crate::error::FeedError;
use crate::events::EventHandler;
use providers::{crates::CratesFeed, packagist::PackagistFeed, pypi::PypiFeed, rubygems::RubygemsFeed};

pub use options::FeedOptions;
pub use types::{Package, ScheduledFeed};

/// Transport-level timeout shared by every feed's HTTP calls.
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Every feed type the factory knows how to build.
pub const KNOWN_FEEDS: &[&str] = &[
    providers::crates::FEED_NAME,
    providers::packagist::FEED_NAME,
    providers::pypi::FEED_NAME,
    providers::rubygems::FEED_NAME,
];

/// One-time metrics registration (so series show up on /metrics).
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("feeds_polls_total", "Feed polls dispatched.");
        describe_counter!("feeds_poll_errors_total", "Feed polls that failed.");
        describe_counter!(
            "feeds_packages_total",
            "Packages returned by feeds after the cutoff."
        );
        describe_counter!(
            "feeds_lossy_alerts_total",
            "Polls whose window did not overlap the previous one."
        );
        describe_histogram!("feeds_poll_duration_ms", "Feed poll time in milliseconds.");
        describe_counter!("publisher_sent_total", "Packages handed to the publisher.");
        describe_counter!("publisher_errors_total", "Publisher send failures.");
        describe_gauge!(
            "scheduler_last_cycle_ts",
            "Unix ts when a poll cycle last finished."
        );
    });
}

/// Keeps only packages published at or after `cutoff`, preserving order.
pub fn apply_cutoff(packages: Vec<Package>, cutoff: DateTime<Utc>) -> Vec<Package> {
    packages
        .into_iter()
        .filter(|p| p.published_at >= cutoff)
        .collect()
}

/// Shared collaborators injected into every feed at construction.
#[derive(Clone)]
pub struct FeedContext {
    pub client: reqwest::Client,
    pub events: Arc<EventHandler>,
}

impl FeedContext {
    pub fn new(client: reqwest::Client, events: Arc<EventHandler>) -> Self {
        Self { client, events }
    }
}

/// Builds the HTTP client shared by all feeds.
pub fn http_client() -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .user_agent(concat!("package-feeds/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// Constructs the feed registered under `kind`, validating its options.
pub fn build_feed(
    kind: &str,
    options: &FeedOptions,
    ctx: &FeedContext,
) -> Result<Arc<dyn ScheduledFeed>, FeedError> {
    let feed: Arc<dyn ScheduledFeed> = match kind {
        providers::crates::FEED_NAME => Arc::new(CratesFeed::new(options, ctx)?),
        providers::packagist::FEED_NAME => Arc::new(PackagistFeed::new(options, ctx)?),
        providers::pypi::FEED_NAME => Arc::new(PypiFeed::new(options, ctx)?),
        providers::rubygems::FEED_NAME => Arc::new(RubygemsFeed::new(options, ctx)?),
        other => {
            return Err(FeedError::NotFound {
                feed: other.to_string(),
            })
        }
    };
    Ok(feed)
}
