// tests/common/mod.rs
//
// Shared helpers: an in-process mock registry server and canned feeds.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use chrono::{DateTime, TimeZone, Utc};

use package_feeds::events::{EventFilter, EventHandler, MemoryEventSink};
use package_feeds::feeds::FeedContext;
use package_feeds::{FeedError, Package, ScheduledFeed, Scheduler};

/// Serves `router` on an ephemeral localhost port and returns its base URL.
pub async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock server");
    let addr = listener.local_addr().expect("mock server addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });
    format!("http://{addr}")
}

/// Feed context with a short-timeout client and a recording event sink.
pub fn context() -> (FeedContext, Arc<MemoryEventSink>) {
    let sink = Arc::new(MemoryEventSink::new());
    let events = Arc::new(EventHandler::new(sink.clone(), EventFilter::default()));
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .expect("client");
    (FeedContext::new(client, events), sink)
}

pub fn ts(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

pub fn pkg(name: &str, version: &str, secs: i64, source: &str) -> Package {
    Package::new(ts(secs), name, version, source)
}

/// Returns a fixed list (cutoff-filtered), optionally after a delay.
pub struct StaticFeed {
    pub name: &'static str,
    pub packages: Vec<Package>,
    pub delay: Duration,
}

impl StaticFeed {
    pub fn new(name: &'static str, packages: Vec<Package>) -> Self {
        Self {
            name,
            packages,
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl ScheduledFeed for StaticFeed {
    async fn latest(&self, cutoff: DateTime<Utc>) -> Result<Vec<Package>, FeedError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(package_feeds::apply_cutoff(self.packages.clone(), cutoff))
    }

    fn poll_interval(&self) -> Duration {
        Duration::from_secs(300)
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

/// Always fails with a transport error.
pub struct FailingFeed {
    pub name: &'static str,
}

#[async_trait]
impl ScheduledFeed for FailingFeed {
    async fn latest(&self, _cutoff: DateTime<Utc>) -> Result<Vec<Package>, FeedError> {
        Err(FeedError::transport(self.name, "connection refused"))
    }

    fn poll_interval(&self) -> Duration {
        Duration::from_secs(300)
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

/// Registry entry for [`scheduler`].
pub fn entry<F: ScheduledFeed + 'static>(name: &str, feed: F) -> (String, Arc<dyn ScheduledFeed>) {
    (name.to_string(), Arc::new(feed))
}

pub fn scheduler(feeds: Vec<(String, Arc<dyn ScheduledFeed>)>) -> Scheduler {
    let registry: HashMap<String, Arc<dyn ScheduledFeed>> = feeds.into_iter().collect();
    Scheduler::new(registry)
}

pub fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}
