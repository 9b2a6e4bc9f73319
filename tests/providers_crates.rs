// tests/providers_crates.rs
mod common;

use std::sync::{Arc, Mutex};

use axum::{routing::get, Json, Router};
use serde_json::{json, Value};

use common::{context, serve, ts};
use package_feeds::feeds::providers::crates::CratesFeed;
use package_feeds::feeds::FeedOptions;
use package_feeds::{FeedError, ScheduledFeed};

async fn mock_crates(summary: Arc<Mutex<Value>>) -> String {
    let router = Router::new().route(
        "/api/v1/summary",
        get(move || {
            let summary = summary.clone();
            async move { Json(summary.lock().unwrap().clone()) }
        }),
    );
    serve(router).await
}

fn entry(name: &str, version: &str, updated_at: &str) -> Value {
    json!({ "name": name, "newest_version": version, "updated_at": updated_at })
}

#[tokio::test]
async fn summary_lists_are_merged() {
    let summary = Arc::new(Mutex::new(json!({
        "num_crates": 150000,
        "new_crates": [entry("fresh", "0.1.0", "2024-05-01T10:00:00.123456+00:00")],
        "just_updated": [
            entry("serde", "1.0.200", "2024-05-01T11:00:00+00:00"),
            entry("ancient", "0.0.1", "2019-01-01T00:00:00+00:00")
        ]
    })));
    let base = mock_crates(summary).await;
    let (ctx, _sink) = context();
    let feed = CratesFeed::new(&FeedOptions::default(), &ctx)
        .unwrap()
        .with_base_url(base);

    let mut got: Vec<_> = feed
        .latest(ts(1_704_067_200))
        .await
        .unwrap()
        .into_iter()
        .map(|p| (p.name, p.version, p.source))
        .collect();
    got.sort();
    assert_eq!(
        got,
        vec![
            ("fresh".into(), "0.1.0".into(), "crates".into()),
            ("serde".into(), "1.0.200".into(), "crates".into()),
        ]
    );
}

#[tokio::test]
async fn entry_without_version_is_decode_error() {
    let summary = Arc::new(Mutex::new(json!({
        "new_crates": [{ "name": "odd", "updated_at": "2024-05-01T10:00:00+00:00" }],
        "just_updated": []
    })));
    let base = mock_crates(summary).await;
    let (ctx, _sink) = context();
    let feed = CratesFeed::new(&FeedOptions::default(), &ctx)
        .unwrap()
        .with_base_url(base);

    let err = feed.latest(ts(0)).await.unwrap_err();
    assert!(matches!(err, FeedError::Decode { ref feed, .. } if feed == "crates"));
}

#[tokio::test]
async fn disjoint_summaries_raise_lossy_alert() {
    let summary = Arc::new(Mutex::new(json!({
        "new_crates": [entry("a", "1.0.0", "2024-05-01T10:00:00+00:00")],
        "just_updated": []
    })));
    let base = mock_crates(summary.clone()).await;
    let (ctx, sink) = context();
    let feed = CratesFeed::new(&FeedOptions::default(), &ctx)
        .unwrap()
        .with_base_url(base);

    feed.latest(ts(0)).await.unwrap();
    *summary.lock().unwrap() = json!({
        "new_crates": [entry("b", "1.0.0", "2024-05-01T11:00:00+00:00")],
        "just_updated": []
    });
    feed.latest(ts(0)).await.unwrap();

    let payloads = sink.payloads();
    assert_eq!(payloads.len(), 1);
    let alert: Value = serde_json::from_slice(&payloads[0]).unwrap();
    assert_eq!(alert["feed"], "crates");
    assert_eq!(alert["component"], "Feeds");
}
