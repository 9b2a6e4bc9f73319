// src/feeds/providers/rubygems.rs
use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::{get_json, join_url};
use crate::error::FeedError;
use crate::feeds::lossy::LossyFeedAlerter;
use crate::feeds::{apply_cutoff, FeedContext, FeedOptions, Package, ScheduledFeed, DEFAULT_POLL_INTERVAL};

pub const FEED_NAME: &str = "rubygems";
pub const DEFAULT_BASE_URL: &str = "https://rubygems.org";
const ACTIVITY_PATH: &str = "/api/v1/activity";

#[derive(Debug, Deserialize)]
struct Gem {
    name: String,
    version: String,
    version_created_at: DateTime<Utc>,
}

/// RubyGems exposes only the 50 most recent new and updated gems, so every
/// poll is checked for window rollover.
pub struct RubygemsFeed {
    base_url: String,
    client: reqwest::Client,
    poll_interval: Duration,
    alerter: LossyFeedAlerter,
}

impl RubygemsFeed {
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

    async fn fetch(&self, listing: &str) -> Result<Vec<Gem>, FeedError> {
        let url = join_url(&self.base_url, &format!("{ACTIVITY_PATH}/{listing}"));
        get_json(&self.client, FEED_NAME, &url, &[]).await
    }
}

#[async_trait]
impl ScheduledFeed for RubygemsFeed {
    async fn latest(&self, cutoff: DateTime<Utc>) -> Result<Vec<Package>, FeedError> {
        let new_gems = self.fetch("latest.json").await?;
        let updated_gems = self.fetch("just_updated.json").await?;

        // just_updated wins for gems present in both listings
        let mut merged: BTreeMap<String, Gem> = BTreeMap::new();
        for gem in new_gems.into_iter().chain(updated_gems) {
            merged.insert(gem.name.clone(), gem);
        }

        let pkgs: Vec<Package> = merged
            .into_values()
            .map(|g| Package::new(g.version_created_at, g.name, g.version, FEED_NAME))
            .collect();

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
