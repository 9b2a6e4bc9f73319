// src/feeds/providers/pypi.rs
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use quick_xml::de::from_str;
use regex::Regex;
use serde::Deserialize;
use tokio::task::JoinSet;

use super::{get_text, join_url};
use crate::error::FeedError;
use crate::feeds::lossy::LossyFeedAlerter;
use crate::feeds::{apply_cutoff, FeedContext, FeedOptions, Package, ScheduledFeed, DEFAULT_POLL_INTERVAL};

pub const FEED_NAME: &str = "pypi";
pub const DEFAULT_BASE_URL: &str = "https://pypi.org";
const UPDATES_PATH: &str = "/rss/updates.xml";

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
}

fn parse_rss(feed: &str, xml: &str) -> Result<Vec<Item>, FeedError> {
    let rss: Rss = from_str(xml).map_err(|e| FeedError::decode(feed, format!("rss: {e}")))?;
    Ok(rss.channel.item)
}

fn parse_pub_date(raw: Option<&str>) -> Result<DateTime<Utc>, FeedError> {
    let raw = raw.ok_or_else(|| FeedError::decode(FEED_NAME, "item without pubDate"))?;
    DateTime::parse_from_rfc2822(raw.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| FeedError::decode(FEED_NAME, format!("pubDate {raw:?}: {e}")))
}

/// Global updates: titles are `"<name> <version>"`.
fn packages_from_updates(items: Vec<Item>) -> Result<Vec<Package>, FeedError> {
    items
        .into_iter()
        .map(|it| {
            let title = it.title.as_deref().unwrap_or_default().trim();
            let (name, version) = title
                .split_once(' ')
                .map(|(n, v)| (n.trim(), v.trim()))
                .filter(|(n, v)| !n.is_empty() && !v.is_empty())
                .ok_or_else(|| FeedError::decode(FEED_NAME, format!("title {title:?}")))?;
            let published_at = parse_pub_date(it.pub_date.as_deref())?;
            Ok(Package::new(published_at, name, version, FEED_NAME))
        })
        .collect()
}

/// Per-project releases: titles are just the version.
fn packages_from_releases(name: &str, items: Vec<Item>) -> Result<Vec<Package>, FeedError> {
    items
        .into_iter()
        .map(|it| {
            let version = it.title.as_deref().unwrap_or_default().trim();
            if version.is_empty() {
                return Err(FeedError::decode(
                    FEED_NAME,
                    format!("{name}: release without version"),
                ));
            }
            let published_at = parse_pub_date(it.pub_date.as_deref())?;
            Ok(Package::new(published_at, name, version, FEED_NAME))
        })
        .collect()
}

/// PyPI project names: ASCII letters and digits, with `.`, `_` and `-`
/// allowed only between them.
fn is_project_name(name: &str) -> bool {
    static RE_NAME: OnceCell<Regex> = OnceCell::new();
    let re = RE_NAME.get_or_init(|| {
        Regex::new(r"(?i)^([a-z0-9]|[a-z0-9][a-z0-9._-]*[a-z0-9])$").expect("project name regex")
    });
    re.is_match(name)
}

/// PyPI RSS. Without an allowlist it reads the bounded global updates feed
/// (lossy-checked); with one, it reads each project's releases feed.
pub struct PypiFeed {
    base_url: String,
    client: reqwest::Client,
    poll_interval: Duration,
    packages: Option<Vec<String>>,
    alerter: LossyFeedAlerter,
}

impl PypiFeed {
    pub fn new(options: &FeedOptions, ctx: &FeedContext) -> Result<Self, FeedError> {
        let poll_interval = options.poll_interval_or(FEED_NAME, DEFAULT_POLL_INTERVAL)?;
        let packages = options.allowlist();
        if let Some(bad) = packages.iter().flatten().find(|n| !is_project_name(n)) {
            return Err(FeedError::InvalidOption {
                feed: FEED_NAME.to_string(),
                option: "packages".to_string(),
                message: format!("{bad:?} is not a valid project name"),
            });
        }
        Ok(Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            client: ctx.client.clone(),
            poll_interval,
            packages,
            alerter: LossyFeedAlerter::new(ctx.events.clone()),
        })
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    async fn latest_global(&self) -> Result<Vec<Package>, FeedError> {
        let url = join_url(&self.base_url, UPDATES_PATH);
        let body = get_text(&self.client, FEED_NAME, &url, &[]).await?;
        let pkgs = packages_from_updates(parse_rss(FEED_NAME, &body)?)?;
        self.alerter
            .process_packages(FEED_NAME, &pkgs, Utc::now())
            .await;
        Ok(pkgs)
    }

    /// Fetches every project concurrently; the first failure fails the poll.
    async fn latest_for(&self, names: &[String]) -> Result<Vec<Package>, FeedError> {
        let mut tasks = JoinSet::new();
        for (idx, name) in names.iter().enumerate() {
            let client = self.client.clone();
            let url = join_url(&self.base_url, &format!("/rss/project/{name}/releases.xml"));
            let name = name.clone();
            tasks.spawn(async move {
                let body = get_text(&client, FEED_NAME, &url, &[]).await?;
                let pkgs = packages_from_releases(&name, parse_rss(FEED_NAME, &body)?)?;
                Ok::<_, FeedError>((idx, pkgs))
            });
        }

        let mut per_project: Vec<Option<Vec<Package>>> = vec![None; names.len()];
        while let Some(joined) = tasks.join_next().await {
            let (idx, pkgs) = joined.map_err(|e| FeedError::Task {
                feed: FEED_NAME.to_string(),
                message: e.to_string(),
            })??;
            per_project[idx] = Some(pkgs);
        }
        Ok(per_project.into_iter().flatten().flatten().collect())
    }
}

#[async_trait]
impl ScheduledFeed for PypiFeed {
    async fn latest(&self, cutoff: DateTime<Utc>) -> Result<Vec<Package>, FeedError> {
        let pkgs = match &self.packages {
            None => self.latest_global().await?,
            Some(names) => self.latest_for(names).await?,
        };
        Ok(apply_cutoff(pkgs, cutoff))
    }

    fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    fn name(&self) -> &'static str {
        FEED_NAME
    }
}
