// src/feeds/scheduler.rs
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use metrics::{counter, gauge, histogram};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::error::FeedError;
use crate::feeds::{ensure_metrics_described, Package, ScheduledFeed};

pub const DEFAULT_MAX_CONCURRENCY: usize = 16;

/// Registry of configured feeds. Built once at startup and read-only while
/// polls are in flight.
pub struct Scheduler {
    registry: HashMap<String, Arc<dyn ScheduledFeed>>,
    max_concurrency: usize,
}

impl Scheduler {
    pub fn new(registry: HashMap<String, Arc<dyn ScheduledFeed>>) -> Self {
        Self {
            registry,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }

    /// Caps how many feeds are polled at once. Values below 1 become 1.
    pub fn with_max_concurrency(mut self, n: usize) -> Self {
        self.max_concurrency = n.max(1);
        self
    }

    /// Registered feed names, sorted.
    pub fn feed_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.registry.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn ScheduledFeed>> {
        self.registry.get(name)
    }

    /// Polls every registered feed.
    pub async fn poll_all(&self, cutoff: DateTime<Utc>) -> (Vec<Package>, Vec<FeedError>) {
        let names = self.feed_names();
        self.poll(cutoff, &names).await
    }

    /// Polls the named feeds concurrently and waits for all of them.
    ///
    /// A failing (or unregistered) feed contributes its error and no
    /// packages; it never prevents the others from completing. Packages are
    /// concatenated in completion order. Repeated names are polled once.
    pub async fn poll(
        &self,
        cutoff: DateTime<Utc>,
        feeds_to_poll: &[String],
    ) -> (Vec<Package>, Vec<FeedError>) {
        let requests: Vec<(String, DateTime<Utc>)> = feeds_to_poll
            .iter()
            .map(|name| (name.clone(), cutoff))
            .collect();
        self.poll_each(&requests).await
    }

    /// Like [`poll`](Self::poll), but every feed gets its own cutoff.
    /// For a repeated name the first request wins.
    pub async fn poll_each(
        &self,
        requests: &[(String, DateTime<Utc>)],
    ) -> (Vec<Package>, Vec<FeedError>) {
        ensure_metrics_described();

        let mut packages: Vec<Package> = Vec::new();
        let mut errs: Vec<FeedError> = Vec::new();
        if requests.is_empty() {
            tracing::warn!("poll called with no feeds");
            return (packages, errs);
        }

        let permits = Arc::new(Semaphore::new(self.max_concurrency));
        let mut tasks = JoinSet::new();
        let mut task_feeds: HashMap<tokio::task::Id, String> = HashMap::new();
        let mut dispatched: HashSet<&str> = HashSet::new();

        for (name, cutoff) in requests {
            let cutoff = *cutoff;
            if !dispatched.insert(name.as_str()) {
                continue;
            }
            let Some(feed) = self.registry.get(name).cloned() else {
                tracing::error!(feed = %name, "feed not registered");
                counter!("feeds_poll_errors_total", "feed" => name.clone()).increment(1);
                errs.push(FeedError::NotFound { feed: name.clone() });
                continue;
            };

            tracing::debug!(feed = %name, %cutoff, "dispatching poll");
            counter!("feeds_polls_total", "feed" => name.clone()).increment(1);

            let permits = Arc::clone(&permits);
            let feed_name = name.clone();
            let handle = tasks.spawn(async move {
                // The semaphore is never closed, so acquire only fails if it is.
                let _permit = permits.acquire_owned().await.ok();
                let t0 = Instant::now();
                let result = feed.latest(cutoff).await;
                (feed_name, result, t0.elapsed())
            });
            task_feeds.insert(handle.id(), name.clone());
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((name, result, elapsed)) => {
                    record_result(&name, result, elapsed, &mut packages, &mut errs)
                }
                Err(join_err) => {
                    let name = task_feeds
                        .get(&join_err.id())
                        .cloned()
                        .unwrap_or_else(|| "unknown".to_string());
                    tracing::error!(feed = %name, error = %join_err, "poll task failed");
                    counter!("feeds_poll_errors_total", "feed" => name.clone()).increment(1);
                    errs.push(FeedError::Task {
                        feed: name,
                        message: join_err.to_string(),
                    });
                }
            }
        }

        gauge!("scheduler_last_cycle_ts").set(Utc::now().timestamp().max(0) as f64);
        (packages, errs)
    }
}

fn record_result(
    name: &str,
    result: Result<Vec<Package>, FeedError>,
    elapsed: Duration,
    packages: &mut Vec<Package>,
    errs: &mut Vec<FeedError>,
) {
    histogram!("feeds_poll_duration_ms", "feed" => name.to_string())
        .record(elapsed.as_secs_f64() * 1_000.0);

    match result {
        Err(e) => {
            tracing::error!(feed = name, error = %e, "error fetching packages");
            counter!("feeds_poll_errors_total", "feed" => name.to_string()).increment(1);
            errs.push(e);
        }
        Ok(fetched) => {
            for pkg in &fetched {
                tracing::debug!(
                    feed = name,
                    name = %pkg.name,
                    version = %pkg.version,
                    "processing package"
                );
            }
            counter!("feeds_packages_total", "feed" => name.to_string())
                .increment(fetched.len() as u64);
            tracing::info!(feed = name, num_processed = fetched.len(), "processed packages");
            packages.extend(fetched);
        }
    }
}
