// tests/trigger_cycle.rs
mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use chrono::{DateTime, TimeDelta, Utc};
use http::{Request, StatusCode};
use tower::ServiceExt;

use common::{entry, pkg, scheduler, ts, FailingFeed, StaticFeed};
use package_feeds::publisher::MemoryPublisher;
use package_feeds::trigger::{self, FeedGroup};
use package_feeds::{FeedError, FeedHandler, Package, ScheduledFeed, TriggerError};

/// Records every cutoff it is polled with.
struct RecordingFeed {
    cutoffs: Arc<Mutex<Vec<DateTime<Utc>>>>,
    fail: bool,
}

#[async_trait]
impl ScheduledFeed for RecordingFeed {
    async fn latest(&self, cutoff: DateTime<Utc>) -> Result<Vec<Package>, FeedError> {
        self.cutoffs.lock().unwrap().push(cutoff);
        if self.fail {
            return Err(FeedError::transport("rec", "timeout"));
        }
        Ok(vec![])
    }
    fn poll_interval(&self) -> Duration {
        Duration::from_secs(600)
    }
    fn name(&self) -> &'static str {
        "rec"
    }
}

/// Succeeds on its first poll, then fails every time.
struct GoesDownFeed {
    calls: AtomicUsize,
}

#[async_trait]
impl ScheduledFeed for GoesDownFeed {
    async fn latest(&self, _cutoff: DateTime<Utc>) -> Result<Vec<Package>, FeedError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            return Ok(vec![]);
        }
        Err(FeedError::transport("flaky", "connection reset"))
    }
    fn poll_interval(&self) -> Duration {
        Duration::from_secs(300)
    }
    fn name(&self) -> &'static str {
        "flaky"
    }
}

/// Serves whatever the test has published so far, cut off like a registry.
struct GrowingFeed {
    packages: Arc<Mutex<Vec<Package>>>,
}

#[async_trait]
impl ScheduledFeed for GrowingFeed {
    async fn latest(&self, cutoff: DateTime<Utc>) -> Result<Vec<Package>, FeedError> {
        let current = self.packages.lock().unwrap().clone();
        Ok(package_feeds::apply_cutoff(current, cutoff))
    }
    fn poll_interval(&self) -> Duration {
        Duration::from_secs(300)
    }
    fn name(&self) -> &'static str {
        "good"
    }
}

fn handler_with(
    feeds: Vec<(String, Arc<dyn ScheduledFeed>)>,
    publisher: Arc<MemoryPublisher>,
) -> FeedHandler {
    FeedHandler::new(Arc::new(scheduler(feeds)), publisher)
}

#[tokio::test]
async fn each_package_is_sent_once_as_json() {
    let publisher = Arc::new(MemoryPublisher::new());
    let now = Utc::now();
    let fresh = now.timestamp() - 10;
    let handler = handler_with(
        vec![entry(
            "a",
            StaticFeed::new("a", vec![pkg("left-pad", "1.0.0", fresh, "a"), pkg("tiny", "0.1", fresh, "a")]),
        )],
        publisher.clone(),
    );

    let report = handler.poll_and_publish().await.unwrap();
    assert_eq!(report.processed, 2);
    assert!(!report.is_partial());

    let sent = publisher.sent_json();
    assert_eq!(sent.len(), 2);
    let names: Vec<_> = sent.iter().map(|v| v["name"].as_str().unwrap().to_string()).collect();
    assert!(names.contains(&"left-pad".to_string()));
    assert!(names.contains(&"tiny".to_string()));
    assert!(sent.iter().all(|v| v["schema_ver"] == "1.0" && v["type"] == "a"));
}

#[tokio::test]
async fn feeds_are_grouped_by_poll_interval() {
    let cutoffs = Arc::new(Mutex::new(vec![]));
    let handler = handler_with(
        vec![
            entry("a", StaticFeed::new("a", vec![])),
            entry("b", StaticFeed::new("b", vec![])),
            entry("rec", RecordingFeed { cutoffs, fail: false }),
        ],
        Arc::new(MemoryPublisher::new()),
    );

    let mut groups: Vec<_> = handler
        .groups()
        .iter()
        .map(|g| (g.interval(), g.feeds().to_vec()))
        .collect();
    groups.sort();
    assert_eq!(
        groups,
        vec![
            (Duration::from_secs(300), vec!["a".to_string(), "b".to_string()]),
            (Duration::from_secs(600), vec!["rec".to_string()]),
        ]
    );
}

#[tokio::test]
async fn cutoff_defaults_to_one_interval_then_tracks_last_success() {
    let cutoffs = Arc::new(Mutex::new(vec![]));
    let handler = handler_with(
        vec![entry("rec", RecordingFeed { cutoffs: cutoffs.clone(), fail: false })],
        Arc::new(MemoryPublisher::new()),
    );
    let group = handler.groups()[0].clone();

    let t1 = ts(1_000_000);
    let t2 = ts(1_000_600);
    handler.run_group_at(&group, t1).await.unwrap();
    handler.run_group_at(&group, t2).await.unwrap();

    let seen = cutoffs.lock().unwrap().clone();
    assert_eq!(seen, vec![t1 - TimeDelta::seconds(600), t1]);
    assert_eq!(group.last_poll("rec").await, Some(t2));
}

#[tokio::test]
async fn feed_failure_does_not_advance_cutoff() {
    let cutoffs = Arc::new(Mutex::new(vec![]));
    let handler = handler_with(
        vec![entry("rec", RecordingFeed { cutoffs: cutoffs.clone(), fail: true })],
        Arc::new(MemoryPublisher::new()),
    );
    let group = handler.groups()[0].clone();

    let report = handler.run_group_at(&group, ts(2_000_000)).await.unwrap();
    assert!(report.is_partial());
    assert_eq!(group.last_poll("rec").await, None);

    handler.run_group_at(&group, ts(2_000_600)).await.unwrap();
    let seen = cutoffs.lock().unwrap().clone();
    assert_eq!(seen[1], ts(2_000_600) - TimeDelta::seconds(600));
}

#[tokio::test]
async fn feed_that_stays_down_does_not_hold_back_its_groupmate() {
    let releases = Arc::new(Mutex::new(vec![pkg("x", "1", 1_000_150, "good")]));
    let publisher = Arc::new(MemoryPublisher::new());
    let handler = handler_with(
        vec![
            entry("flaky", GoesDownFeed { calls: AtomicUsize::new(0) }),
            entry("good", GrowingFeed { packages: releases.clone() }),
        ],
        publisher.clone(),
    );
    assert_eq!(handler.groups().len(), 1, "both feeds share one interval");
    let group = handler.groups()[0].clone();

    let first = ts(1_000_200);
    handler.run_group_at(&group, first).await.unwrap();

    releases.lock().unwrap().push(pkg("y", "1", 1_000_350, "good"));
    for cycle in 1..=10 {
        let now = first + TimeDelta::seconds(300 * cycle);
        let report = handler.run_group_at(&group, now).await.unwrap();
        assert!(report.is_partial());
    }

    let sent: Vec<String> = publisher
        .sent_json()
        .iter()
        .map(|v| v["name"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(sent, vec!["x".to_string(), "y".to_string()]);

    assert_eq!(group.last_poll("flaky").await, Some(first));
    assert_eq!(
        group.last_poll("good").await,
        Some(first + TimeDelta::seconds(3_000))
    );
}

#[tokio::test]
async fn publisher_failure_stops_delivery_and_keeps_cutoff() {
    let publisher = Arc::new(MemoryPublisher::failing_after(1));
    let group = Arc::new(FeedGroup::new(vec!["a".into()], Duration::from_secs(300)));
    let handler = FeedHandler::with_groups(
        Arc::new(scheduler(vec![entry(
            "a",
            StaticFeed::new(
                "a",
                vec![pkg("one", "1", 1_000, "a"), pkg("two", "1", 1_001, "a"), pkg("three", "1", 1_002, "a")],
            ),
        )])),
        publisher.clone(),
        vec![group.clone()],
    );

    let err = handler.run_group_at(&group, ts(1_100)).await.unwrap_err();
    assert!(matches!(err, TriggerError::Sink { .. }));
    assert_eq!(publisher.sent().len(), 1, "no sends after the first failure");
    assert_eq!(group.last_poll("a").await, None);
}

#[tokio::test]
async fn http_trigger_reports_processed_count() {
    let now = Utc::now().timestamp();
    let handler = Arc::new(handler_with(
        vec![entry("a", StaticFeed::new("a", vec![pkg("p", "1", now - 5, "a")]))],
        Arc::new(MemoryPublisher::new()),
    ));

    let res = trigger::router(handler)
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&body[..], b"1 packages processed");
}

#[tokio::test]
async fn http_trigger_reports_partial_failure() {
    let handler = Arc::new(handler_with(
        vec![
            entry("a", StaticFeed::new("a", vec![])),
            entry("b", FailingFeed { name: "b" }),
        ],
        Arc::new(MemoryPublisher::new()),
    ));

    let res = trigger::router(handler)
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    assert_eq!(
        &body[..],
        b"error polling for packages - see logs for more information"
    );
}

#[tokio::test]
async fn http_trigger_surfaces_publisher_error() {
    let now = Utc::now().timestamp();
    let handler = Arc::new(handler_with(
        vec![entry("a", StaticFeed::new("a", vec![pkg("p", "1", now - 5, "a")]))],
        Arc::new(MemoryPublisher::failing_after(0)),
    ));

    let res = trigger::router(handler)
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn healthz_is_ok() {
    let handler = Arc::new(handler_with(vec![], Arc::new(MemoryPublisher::new())));
    let res = trigger::router(handler)
        .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}
