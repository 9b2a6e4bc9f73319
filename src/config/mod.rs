// src/config/mod.rs
//! Application configuration: which feeds run, where packages and alerts go,
//! and how the trigger server behaves.

pub mod sinks;

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;

use crate::feeds::options::parse_duration;
use crate::feeds::scheduler::DEFAULT_MAX_CONCURRENCY;
use crate::feeds::{build_feed, FeedContext, FeedOptions, ScheduledFeed, KNOWN_FEEDS};

pub use sinks::{EventsConfig, PublisherConfig};

pub const ENV_CONFIG_PATH: &str = "PACKAGE_FEEDS_CONFIG_PATH";

fn default_http_port() -> u16 {
    8080
}
fn default_poll_rate() -> String {
    "5m".to_string()
}
fn default_max_concurrency() -> usize {
    DEFAULT_MAX_CONCURRENCY
}
fn default_enabled_feeds() -> Vec<FeedConfig> {
    KNOWN_FEEDS
        .iter()
        .map(|kind| FeedConfig {
            kind: kind.to_string(),
            options: FeedOptions::default(),
        })
        .collect()
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct FeedConfig {
    /// Feed type; also the name the feed is registered under.
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub options: FeedOptions,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScheduledFeedConfig {
    #[serde(default)]
    pub publisher: PublisherConfig,
    #[serde(default = "default_enabled_feeds")]
    pub enabled_feeds: Vec<FeedConfig>,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    /// Default poll interval for feeds without their own `poll_rate`.
    #[serde(default = "default_poll_rate")]
    pub poll_rate: String,
    /// Run cycles on an internal ticker in addition to `GET /`.
    #[serde(default)]
    pub timer: bool,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default)]
    pub events: EventsConfig,
}

impl Default for ScheduledFeedConfig {
    fn default() -> Self {
        Self {
            publisher: PublisherConfig::default(),
            enabled_feeds: default_enabled_feeds(),
            http_port: default_http_port(),
            poll_rate: default_poll_rate(),
            timer: false,
            max_concurrency: default_max_concurrency(),
            events: EventsConfig::default(),
        }
    }
}

impl ScheduledFeedConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let cfg: ScheduledFeedConfig = toml::from_str(s).context("parsing feeds config")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        Self::from_toml_str(&content).with_context(|| format!("in {}", path.display()))
    }

    /// Loads `$PACKAGE_FEEDS_CONFIG_PATH` if set, else the built-in default.
    /// Returns the path that was used, if any.
    pub fn load() -> Result<(Self, Option<PathBuf>)> {
        match std::env::var(ENV_CONFIG_PATH) {
            Ok(p) if !p.trim().is_empty() => {
                let path = PathBuf::from(p);
                if !path.exists() {
                    bail!("{ENV_CONFIG_PATH} points to non-existent path {}", path.display());
                }
                Ok((Self::from_file(&path)?, Some(path)))
            }
            _ => Ok((Self::default(), None)),
        }
    }

    pub fn poll_interval(&self) -> Result<Duration> {
        parse_duration(self.poll_rate.trim())
            .ok_or_else(|| anyhow!("invalid poll_rate {:?}", self.poll_rate))
    }

    pub fn validate(&self) -> Result<()> {
        self.poll_interval()?;
        if self.enabled_feeds.is_empty() {
            bail!("enabled_feeds must name at least one feed");
        }
        let mut seen = HashSet::new();
        for feed in &self.enabled_feeds {
            if !KNOWN_FEEDS.contains(&feed.kind.as_str()) {
                bail!(
                    "unknown feed type {:?} (known: {})",
                    feed.kind,
                    KNOWN_FEEDS.join(", ")
                );
            }
            if !seen.insert(feed.kind.as_str()) {
                bail!("feed {:?} is enabled more than once", feed.kind);
            }
        }
        self.publisher.validate()?;
        self.events.validate()?;
        Ok(())
    }

    pub fn enabled_feed_names(&self) -> Vec<String> {
        self.enabled_feeds.iter().map(|f| f.kind.clone()).collect()
    }

    /// Constructs every enabled feed. Feeds without a `poll_rate` inherit the
    /// global one. Any construction failure (e.g. an unsupported option)
    /// fails the whole registry.
    pub fn scheduled_feeds(
        &self,
        ctx: &FeedContext,
    ) -> Result<HashMap<String, Arc<dyn ScheduledFeed>>> {
        let mut registry: HashMap<String, Arc<dyn ScheduledFeed>> = HashMap::new();
        for feed in &self.enabled_feeds {
            let mut options = feed.options.clone();
            if options.poll_rate.as_deref().map_or(true, |r| r.trim().is_empty()) {
                options.poll_rate = Some(self.poll_rate.clone());
            }
            let built = build_feed(&feed.kind, &options, ctx)
                .with_context(|| format!("constructing feed {:?}", feed.kind))?;
            registry.insert(feed.kind.clone(), built);
        }
        Ok(registry)
    }
}
