// src/trigger.rs
//! Drives poll cycles: computes cutoffs, runs the scheduler, and relays each
//! package to the publisher. Exposed over HTTP and, optionally, on a timer.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use axum::{extract::State, http::StatusCode, routing::get, Router};
use chrono::{DateTime, TimeDelta, Utc};
use metrics::counter;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tower_http::trace::TraceLayer;

use crate::error::{FeedError, TriggerError};
use crate::feeds::scheduler::Scheduler;
use crate::feeds::Package;
use crate::publisher::Publisher;

/// Feeds sharing a poll interval. The lock around `last_poll` is held for a
/// whole cycle, so two cycles for the same group never overlap.
///
/// Each feed keeps its own last successful start, so one feed that stays
/// down never holds back the cutoff of the others.
pub struct FeedGroup {
    feeds: Vec<String>,
    interval: Duration,
    last_poll: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl FeedGroup {
    pub fn new(feeds: Vec<String>, interval: Duration) -> Self {
        Self {
            feeds,
            interval,
            last_poll: Mutex::new(HashMap::new()),
        }
    }

    pub fn feeds(&self) -> &[String] {
        &self.feeds
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Start of the last cycle in which `feed` succeeded and all of its
    /// packages were delivered, if any.
    pub async fn last_poll(&self, feed: &str) -> Option<DateTime<Utc>> {
        self.last_poll.lock().await.get(feed).copied()
    }
}

/// Outcome of a cycle whose deliveries all succeeded.
#[derive(Debug, Default)]
pub struct CycleReport {
    pub processed: usize,
    pub errors: Vec<FeedError>,
}

impl CycleReport {
    pub fn is_partial(&self) -> bool {
        !self.errors.is_empty()
    }
}

pub struct FeedHandler {
    scheduler: Arc<Scheduler>,
    publisher: Arc<dyn Publisher>,
    groups: Vec<Arc<FeedGroup>>,
}

impl FeedHandler {
    /// Groups the scheduler's feeds by their preferred poll interval.
    pub fn new(scheduler: Arc<Scheduler>, publisher: Arc<dyn Publisher>) -> Self {
        let mut by_interval: BTreeMap<Duration, Vec<String>> = BTreeMap::new();
        for name in scheduler.feed_names() {
            if let Some(feed) = scheduler.get(&name) {
                by_interval.entry(feed.poll_interval()).or_default().push(name);
            }
        }
        let groups = by_interval
            .into_iter()
            .map(|(interval, feeds)| Arc::new(FeedGroup::new(feeds, interval)))
            .collect();
        Self::with_groups(scheduler, publisher, groups)
    }

    pub fn with_groups(
        scheduler: Arc<Scheduler>,
        publisher: Arc<dyn Publisher>,
        groups: Vec<Arc<FeedGroup>>,
    ) -> Self {
        Self {
            scheduler,
            publisher,
            groups,
        }
    }

    pub fn groups(&self) -> &[Arc<FeedGroup>] {
        &self.groups
    }

    /// Runs one cycle for every group. A publisher failure aborts the
    /// remaining deliveries and is returned; feed failures are reported in
    /// the (partial) [`CycleReport`].
    pub async fn poll_and_publish(&self) -> Result<CycleReport, TriggerError> {
        let mut report = CycleReport::default();
        for group in &self.groups {
            let r = self.run_group(group).await?;
            report.processed += r.processed;
            report.errors.extend(r.errors);
        }
        Ok(report)
    }

    pub async fn run_group(&self, group: &FeedGroup) -> Result<CycleReport, TriggerError> {
        self.run_group_at(group, Utc::now()).await
    }

    /// One cycle for `group` as if started at `now`.
    ///
    /// Each feed's cutoff is its previous successful start, else
    /// `now - interval`. A feed's start only advances when that feed
    /// succeeded and every package of the cycle was delivered, so a failed
    /// feed is retried from its old cutoff while its groupmates move on.
    pub async fn run_group_at(
        &self,
        group: &FeedGroup,
        now: DateTime<Utc>,
    ) -> Result<CycleReport, TriggerError> {
        let mut last_poll = group.last_poll.lock().await;
        let window = TimeDelta::from_std(group.interval).unwrap_or_else(|_| TimeDelta::zero());
        let default_cutoff = now - window;

        let requests: Vec<(String, DateTime<Utc>)> = group
            .feeds
            .iter()
            .map(|name| {
                let cutoff = last_poll.get(name).copied().unwrap_or(default_cutoff);
                (name.clone(), cutoff)
            })
            .collect();

        let (packages, errors) = self.scheduler.poll_each(&requests).await;
        for err in &errors {
            tracing::error!(feed = err.feed(), error = %err, "error polling for new packages");
        }

        let processed = self.publish(&packages).await?;

        let failed: HashSet<&str> = errors.iter().map(FeedError::feed).collect();
        for name in &group.feeds {
            if !failed.contains(name.as_str()) {
                last_poll.insert(name.clone(), now);
            }
        }
        tracing::info!(
            feeds = ?group.feeds,
            %default_cutoff,
            processed,
            failed_feeds = errors.len(),
            "poll cycle finished"
        );
        Ok(CycleReport { processed, errors })
    }

    async fn publish(&self, packages: &[Package]) -> Result<usize, TriggerError> {
        let mut processed = 0usize;
        for pkg in packages {
            tracing::info!(
                name = %pkg.name,
                feed = %pkg.source,
                created_date = %pkg.published_at,
                "sending package upstream"
            );
            let payload = serde_json::to_vec(pkg).map_err(|source| TriggerError::Encode {
                name: pkg.name.clone(),
                version: pkg.version.clone(),
                source,
            })?;
            if let Err(source) = self.publisher.send(&payload).await {
                counter!("publisher_errors_total").increment(1);
                return Err(TriggerError::Sink {
                    name: pkg.name.clone(),
                    version: pkg.version.clone(),
                    source,
                });
            }
            counter!("publisher_sent_total").increment(1);
            processed += 1;
        }
        Ok(processed)
    }

    /// Spawns one ticker per group; each tick runs that group's cycle.
    pub fn spawn_timers(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        self.groups
            .iter()
            .cloned()
            .map(|group| {
                let handler = Arc::clone(self);
                tokio::spawn(async move {
                    tracing::info!(feeds = ?group.feeds, interval = ?group.interval, "running timer");
                    let mut ticker = tokio::time::interval(group.interval);
                    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    loop {
                        ticker.tick().await;
                        match handler.run_group(&group).await {
                            Ok(report) if report.is_partial() => tracing::warn!(
                                processed = report.processed,
                                failed_feeds = report.errors.len(),
                                "timer cycle partially succeeded"
                            ),
                            Ok(_) => {}
                            Err(e) => tracing::error!(error = %e, "timer cycle failed"),
                        }
                    }
                })
            })
            .collect()
    }
}

/// `GET /` runs a cycle; `GET /healthz` is a liveness probe.
pub fn router(handler: Arc<FeedHandler>) -> Router {
    Router::new()
        .route("/", get(poll))
        .route("/healthz", get(|| async { "ok" }))
        .layer(TraceLayer::new_for_http())
        .with_state(handler)
}

async fn poll(State(handler): State<Arc<FeedHandler>>) -> (StatusCode, String) {
    match handler.poll_and_publish().await {
        Err(e) => {
            tracing::error!(error = %e, "error sending package to upstream publisher");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
        Ok(report) if report.is_partial() => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "error polling for packages - see logs for more information".to_string(),
        ),
        Ok(report) => (
            StatusCode::OK,
            format!("{} packages processed", report.processed),
        ),
    }
}
