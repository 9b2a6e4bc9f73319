//! Operational events (e.g. a detected lossy feed) and the sink they go to.
//!
//! This channel is independent from the package publisher: alerts never flow
//! through the package data path.

pub mod sinks;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SinkError;

pub use sinks::{DiscardEventSink, LogEventSink, MemoryEventSink, StdoutEventSink, WebhookEventSink};

pub const LOSSY_FEED_EVENT: &str = "LOSSY_FEED";
pub const FEEDS_COMPONENT: &str = "Feeds";

/// Send-only contract for operational alerts. Implementations do not buffer
/// or batch; retry policy belongs to the concrete transport.
#[async_trait::async_trait]
pub trait EventSink: Send + Sync {
    async fn send(&self, payload: &[u8]) -> Result<(), SinkError>;
    fn name(&self) -> &'static str;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Event {
    #[serde(rename = "type")]
    pub event_type: String,
    pub component: String,
    pub message: String,
    pub feed: String,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    pub fn lossy_feed(feed: &str, timestamp: DateTime<Utc>) -> Self {
        Self {
            event_type: LOSSY_FEED_EVENT.to_string(),
            component: FEEDS_COMPONENT.to_string(),
            message: format!(
                "detected a potentially lossy feed ({feed}): no overlap with the previous poll's packages"
            ),
            feed: feed.to_string(),
            timestamp,
        }
    }
}

/// Which events reach the sink. A type listed as disabled is always dropped;
/// otherwise the event passes if its type or its component is enabled.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EventFilter {
    pub enabled_event_types: Vec<String>,
    pub disabled_event_types: Vec<String>,
    pub enabled_components: Vec<String>,
}

impl Default for EventFilter {
    fn default() -> Self {
        Self {
            enabled_event_types: vec![LOSSY_FEED_EVENT.to_string()],
            disabled_event_types: Vec::new(),
            enabled_components: Vec::new(),
        }
    }
}

impl EventFilter {
    pub fn should_dispatch(&self, event: &Event) -> bool {
        if self.disabled_event_types.contains(&event.event_type) {
            return false;
        }
        self.enabled_event_types.contains(&event.event_type)
            || self.enabled_components.contains(&event.component)
    }
}

/// Filter + sink, shared by every feed that raises alerts.
pub struct EventHandler {
    sink: Arc<dyn EventSink>,
    filter: EventFilter,
}

impl EventHandler {
    pub fn new(sink: Arc<dyn EventSink>, filter: EventFilter) -> Self {
        Self { sink, filter }
    }

    /// Serializes and sends `event` unless the filter drops it.
    /// Returns `Ok(false)` when filtered out.
    pub async fn dispatch_event(&self, event: &Event) -> Result<bool, SinkError> {
        if !self.filter.should_dispatch(event) {
            tracing::debug!(event_type = %event.event_type, feed = %event.feed, "event filtered");
            return Ok(false);
        }
        let payload = serde_json::to_vec(event).map_err(|e| SinkError::Encode {
            sink: self.sink.name().to_string(),
            message: e.to_string(),
        })?;
        self.sink.send(&payload).await?;
        Ok(true)
    }

    pub fn sink_name(&self) -> &'static str {
        self.sink.name()
    }
}
