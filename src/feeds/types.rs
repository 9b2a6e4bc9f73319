// src/feeds/types.rs
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::FeedError;

pub const SCHEMA_VERSION: &str = "1.0";

/// A single published release, normalized from any registry.
///
/// Field names on the wire (`created_date`, `type`) are a contract with the
/// downstream consumer and must not change.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct Package {
    pub name: String,
    pub version: String,
    #[serde(rename = "created_date")]
    pub published_at: DateTime<Utc>,
    #[serde(rename = "type")]
    pub source: String,
    pub schema_ver: String,
}

impl Package {
    pub fn new(
        published_at: DateTime<Utc>,
        name: impl Into<String>,
        version: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            published_at,
            source: source.into(),
            schema_ver: SCHEMA_VERSION.to_string(),
        }
    }

    /// Identity used for overlap checks between consecutive polls.
    pub fn key(&self) -> (String, String) {
        (self.name.clone(), self.version.clone())
    }
}

/// Contract every registry feed implements.
///
/// `latest` must apply [`apply_cutoff`](crate::feeds::apply_cutoff) as its last
/// step and must return no packages alongside an error.
#[async_trait::async_trait]
pub trait ScheduledFeed: Send + Sync {
    async fn latest(&self, cutoff: DateTime<Utc>) -> Result<Vec<Package>, FeedError>;

    /// Preferred re-poll cadence: the configured override or the feed default.
    fn poll_interval(&self) -> Duration;

    fn name(&self) -> &'static str;
}
