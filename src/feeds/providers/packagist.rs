// src/feeds/providers/packagist.rs
use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::{get_json, join_url};
use crate::error::FeedError;
use crate::feeds::{apply_cutoff, FeedContext, FeedOptions, Package, ScheduledFeed, DEFAULT_POLL_INTERVAL};

pub const FEED_NAME: &str = "packagist";
pub const DEFAULT_UPDATE_HOST: &str = "https://packagist.org";
pub const DEFAULT_VERSION_HOST: &str = "https://repo.packagist.org";

#[derive(Debug, Deserialize)]
struct ChangesResponse {
    #[serde(default)]
    actions: Vec<Action>,
    /// Set instead of `actions` when `since` predates the retained log.
    #[serde(default)]
    error: Option<ChangesError>,
}

#[derive(Debug, Deserialize)]
struct ChangesError {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Action {
    #[serde(rename = "type")]
    kind: String,
    package: String,
    time: i64,
}

#[derive(Debug, Deserialize)]
struct VersionsResponse {
    #[serde(default)]
    packages: HashMap<String, Vec<VersionEntry>>,
}

#[derive(Debug, Deserialize)]
struct VersionEntry {
    version: String,
    #[serde(default)]
    time: Option<String>,
}

/// `since` is expressed in 1/10000ths of a second.
fn since_param(cutoff: DateTime<Utc>) -> String {
    cutoff.timestamp().saturating_mul(10_000).to_string()
}

/// Packagist's p2 metadata is minified: a version that omits `time`
/// inherits the previous entry's value.
fn packages_from_versions(resp: VersionsResponse) -> Vec<Package> {
    let mut out = Vec::new();
    for (name, versions) in resp.packages {
        let mut last_time: Option<DateTime<Utc>> = None;
        for v in versions {
            if let Some(raw) = v.time.as_deref() {
                last_time = DateTime::parse_from_rfc3339(raw)
                    .ok()
                    .map(|dt| dt.with_timezone(&Utc));
            }
            if let Some(ts) = last_time {
                out.push(Package::new(ts, name.clone(), v.version, FEED_NAME));
            }
        }
    }
    out
}

/// Packagist exposes a genuine change log, so it is not lossy-checked.
pub struct PackagistFeed {
    update_host: String,
    version_host: String,
    client: reqwest::Client,
    poll_interval: Duration,
}

impl PackagistFeed {
    pub fn new(options: &FeedOptions, ctx: &FeedContext) -> Result<Self, FeedError> {
        options.reject_allowlist(FEED_NAME)?;
        let poll_interval = options.poll_interval_or(FEED_NAME, DEFAULT_POLL_INTERVAL)?;
        Ok(Self {
            update_host: DEFAULT_UPDATE_HOST.to_string(),
            version_host: DEFAULT_VERSION_HOST.to_string(),
            client: ctx.client.clone(),
            poll_interval,
        })
    }

    /// Points both the change log and the version metadata at `url`.
    pub fn with_base_url(self, url: impl Into<String>) -> Self {
        let url = url.into();
        self.with_hosts(url.clone(), url)
    }

    pub fn with_hosts(mut self, update_host: impl Into<String>, version_host: impl Into<String>) -> Self {
        self.update_host = update_host.into();
        self.version_host = version_host.into();
        self
    }

    async fn fetch_changes(&self, cutoff: DateTime<Utc>) -> Result<Vec<Action>, FeedError> {
        let url = join_url(&self.update_host, "/metadata/changes.json");
        let resp: ChangesResponse =
            get_json(&self.client, FEED_NAME, &url, &[("since", since_param(cutoff))]).await?;
        if let Some(err) = resp.error {
            // A resync means changes since the cutoff are no longer listed.
            return Err(FeedError::decode(
                FEED_NAME,
                format!(
                    "change log answered {:?} for since={}: {}",
                    err.kind,
                    since_param(cutoff),
                    err.message.as_deref().unwrap_or("no message")
                ),
            ));
        }
        Ok(resp.actions)
    }

    async fn fetch_versions(&self, package: &str) -> Result<Vec<Package>, FeedError> {
        let url = join_url(&self.version_host, &format!("/p2/{package}.json"));
        let resp: VersionsResponse = get_json(&self.client, FEED_NAME, &url, &[]).await?;
        Ok(packages_from_versions(resp))
    }
}

#[async_trait]
impl ScheduledFeed for PackagistFeed {
    async fn latest(&self, cutoff: DateTime<Utc>) -> Result<Vec<Package>, FeedError> {
        let actions = self.fetch_changes(cutoff).await?;

        let mut seen: HashSet<String> = HashSet::new();
        let mut pkgs = Vec::new();
        for action in actions {
            if action.kind == "delete" || action.time < cutoff.timestamp() {
                continue;
            }
            if !seen.insert(action.package.clone()) {
                continue;
            }
            let updates = self.fetch_versions(&action.package).await?;
            pkgs.extend(updates);
        }

        Ok(apply_cutoff(pkgs, cutoff))
    }

    fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    fn name(&self) -> &'static str {
        FEED_NAME
    }
}
