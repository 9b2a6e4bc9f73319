//! scheduled-feed binary entrypoint.
//! Loads config, builds feeds/publisher/event sink, and serves the poll trigger.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use package_feeds::config::ScheduledFeedConfig;
use package_feeds::feeds::{http_client, FeedContext};
use package_feeds::metrics::Metrics;
use package_feeds::trigger::{self, FeedHandler};
use package_feeds::Scheduler;

/// `RUST_LOG` controls verbosity; `LOG_FORMAT=json` switches to JSON lines.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("package_feeds=info,scheduled_feed=info,warn"));

    let json = std::env::var("LOG_FORMAT")
        .ok()
        .is_some_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let (cfg, path) = ScheduledFeedConfig::load()?;
    match &path {
        Some(p) => tracing::info!(path = %p.display(), "using config from file"),
        None => tracing::info!("no config specified, using default configuration"),
    }

    let client = http_client().context("building http client")?;
    let events = cfg.events.build(client.clone())?;
    let publisher = cfg.publisher.build(client.clone())?;
    tracing::info!(publisher = publisher.name(), events = events.sink_name(), "sinks ready");

    let ctx = FeedContext::new(client, events);
    let registry = cfg.scheduled_feeds(&ctx)?;
    tracing::info!(feeds = %cfg.enabled_feed_names().join(", "), "watching feeds");

    // The recorder must exist before the first cycle records anything.
    let metrics = Metrics::init()?;

    let scheduler = Arc::new(Scheduler::new(registry).with_max_concurrency(cfg.max_concurrency));
    let handler = Arc::new(FeedHandler::new(scheduler, publisher));

    if cfg.timer {
        let _timers = handler.spawn_timers();
    }

    let app = trigger::router(handler).merge(metrics.router());

    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.http_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(%addr, "listening");
    axum::serve(listener, app).await.context("serving trigger endpoint")?;
    Ok(())
}
