// src/feeds/providers/crates.rs
use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::{get_json, join_url};
use crate::error::FeedError;
use crate::feeds::lossy::LossyFeedAlerter;
use crate::feeds::{apply_cutoff, FeedContext, FeedOptions, Package, ScheduledFeed, DEFAULT_POLL_INTERVAL};

pub const FEED_NAME: &str = "crates";
pub const DEFAULT_BASE_URL: &str = "https://crates.io";
const SUMMARY_PATH: &str = "/api/v1/summary";

#[derive(Debug, Deserialize)]
struct Summary {
    #[serde(default)]
    new_crates: Vec<CrateEntry>,
    #[serde(default)]
    just_updated: Vec<CrateEntry>,
}

#[derive(Debug, Deserialize)]
struct CrateEntry {
    name: String,
    #[serde(default)]
    newest_version: Option<String>,
    #[serde(default)]
    max_version: Option<String>,
    updated_at: DateTime<Utc>,
}

impl CrateEntry {
    fn version(&self) -> Option<&str> {
        self.newest_version
            .as_deref()
            .or(self.max_version.as_deref())
    }
}

/// crates.io summary: two short, fixed-size listings. Lossy-checked.
pub struct CratesFeed {
    base_url: String,
    client: reqwest::Client,
    poll_interval: Duration,
    alerter: LossyFeedAlerter,
}

impl CratesFeed {
    pub fn new(options: &FeedOptions, ctx: &FeedContext) -> Result<Self, FeedError> {
        options.reject_allowlist(FEED_NAME)?;
        let poll_interval = options.poll_interval_or(FEED_NAME, DEFAULT_POLL_INTERVAL)?;
        Ok(Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            client: ctx.client.clone(),
            poll_interval,
            alerter: LossyFeedAlerter::new(ctx.events.clone()),
        })
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

#[async_trait]
impl ScheduledFeed for CratesFeed {
    async fn latest(&self, cutoff: DateTime<Utc>) -> Result<Vec<Package>, FeedError> {
        let url = join_url(&self.base_url, SUMMARY_PATH);
        let summary: Summary = get_json(&self.client, FEED_NAME, &url, &[]).await?;

        let mut merged: BTreeMap<String, Package> = BTreeMap::new();
        for entry in summary.new_crates.into_iter().chain(summary.just_updated) {
            let Some(version) = entry.version().map(str::to_string) else {
                return Err(FeedError::decode(
                    FEED_NAME,
                    format!("crate {} has no version", entry.name),
                ));
            };
            let pkg = Package::new(entry.updated_at, entry.name.clone(), version, FEED_NAME);
            merged.insert(entry.name, pkg);
        }
        let pkgs: Vec<Package> = merged.into_values().collect();

        self.alerter
            .process_packages(FEED_NAME, &pkgs, Utc::now())
            .await;

        Ok(apply_cutoff(pkgs, cutoff))
    }

    fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    fn name(&self) -> &'static str {
        FEED_NAME
    }
}
