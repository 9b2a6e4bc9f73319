// src/config/sinks.rs
use std::sync::Arc;

use anyhow::{bail, Result};
use serde::Deserialize;

use crate::events::{
    DiscardEventSink, EventFilter, EventHandler, EventSink, LogEventSink, StdoutEventSink,
    WebhookEventSink,
};
use crate::publisher::{HttpPublisher, Publisher, StdoutPublisher};

fn default_publisher_kind() -> String {
    "stdout".to_string()
}
fn default_event_sink() -> String {
    "log".to_string()
}

/// `[publisher]` table. `type = "http"` requires `url`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PublisherConfig {
    #[serde(rename = "type", default = "default_publisher_kind")]
    pub kind: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub max_attempts: Option<u8>,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            kind: default_publisher_kind(),
            url: None,
            timeout_secs: None,
            max_attempts: None,
        }
    }
}

impl PublisherConfig {
    pub fn validate(&self) -> Result<()> {
        match self.kind.as_str() {
            "stdout" => Ok(()),
            "http" if self.url.is_some() => Ok(()),
            "http" => bail!("publisher type \"http\" requires url"),
            other => bail!("unknown publisher type {other:?}"),
        }
    }

    pub fn build(&self, client: reqwest::Client) -> Result<Arc<dyn Publisher>> {
        self.validate()?;
        let publisher: Arc<dyn Publisher> = match (self.kind.as_str(), &self.url) {
            ("http", Some(url)) => {
                let mut p = HttpPublisher::new(url.clone(), client);
                if let Some(secs) = self.timeout_secs {
                    p = p.with_timeout(secs);
                }
                if let Some(n) = self.max_attempts {
                    p = p.with_max_attempts(n);
                }
                Arc::new(p)
            }
            _ => Arc::new(StdoutPublisher),
        };
        Ok(publisher)
    }
}

/// `[events]` table: the alert sink and its filter.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct EventsConfig {
    /// "log" | "stdout" | "webhook" | "none"
    #[serde(default = "default_event_sink")]
    pub sink: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub filter: EventFilter,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            sink: default_event_sink(),
            url: None,
            filter: EventFilter::default(),
        }
    }
}

impl EventsConfig {
    pub fn validate(&self) -> Result<()> {
        match self.sink.as_str() {
            "log" | "stdout" | "none" => Ok(()),
            "webhook" if self.url.is_some() => Ok(()),
            "webhook" => bail!("event sink \"webhook\" requires url"),
            other => bail!("unknown event sink {other:?}"),
        }
    }

    pub fn build(&self, client: reqwest::Client) -> Result<Arc<EventHandler>> {
        self.validate()?;
        let sink: Arc<dyn EventSink> = match (self.sink.as_str(), &self.url) {
            ("webhook", Some(url)) => Arc::new(WebhookEventSink::new(url.clone(), client)),
            ("stdout", _) => Arc::new(StdoutEventSink),
            ("none", _) => Arc::new(DiscardEventSink),
            _ => Arc::new(LogEventSink),
        };
        Ok(Arc::new(EventHandler::new(sink, self.filter.clone())))
    }
}
