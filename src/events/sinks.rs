use std::io::Write;
use std::sync::Mutex;
use std::time::Duration;

use reqwest::Client;

use super::EventSink;
use crate::error::SinkError;

/// Emits alerts as `warn` log lines.
#[derive(Debug, Default, Clone)]
pub struct LogEventSink;

#[async_trait::async_trait]
impl EventSink for LogEventSink {
    async fn send(&self, payload: &[u8]) -> Result<(), SinkError> {
        let event = String::from_utf8_lossy(payload);
        tracing::warn!(target: "events", %event, "operational event");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

/// Drops every alert.
#[derive(Debug, Default, Clone)]
pub struct DiscardEventSink;

#[async_trait::async_trait]
impl EventSink for DiscardEventSink {
    async fn send(&self, _payload: &[u8]) -> Result<(), SinkError> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "none"
    }
}

/// Writes one JSON line per alert to stdout.
#[derive(Debug, Default, Clone)]
pub struct StdoutEventSink;

#[async_trait::async_trait]
impl EventSink for StdoutEventSink {
    async fn send(&self, payload: &[u8]) -> Result<(), SinkError> {
        let mut out = std::io::stdout().lock();
        out.write_all(payload)
            .and_then(|_| out.write_all(b"\n"))
            .map_err(|e| SinkError::send(self.name(), e))
    }

    fn name(&self) -> &'static str {
        "stdout"
    }
}

/// POSTs the alert JSON to a webhook.
#[derive(Clone)]
pub struct WebhookEventSink {
    url: String,
    client: Client,
    timeout: Duration,
}

impl WebhookEventSink {
    pub fn new(url: String, client: Client) -> Self {
        Self {
            url,
            client,
            timeout: Duration::from_secs(5),
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }
}

#[async_trait::async_trait]
impl EventSink for WebhookEventSink {
    async fn send(&self, payload: &[u8]) -> Result<(), SinkError> {
        self.client
            .post(&self.url)
            .timeout(self.timeout)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(payload.to_vec())
            .send()
            .await
            .map_err(|e| SinkError::send(self.name(), e))?
            .error_for_status()
            .map_err(|e| SinkError::send(self.name(), e))?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "webhook"
    }
}

// --- Test helper ---
pub struct MemoryEventSink {
    payloads: Mutex<Vec<Vec<u8>>>,
    fail: bool,
}

impl MemoryEventSink {
    pub fn new() -> Self {
        Self {
            payloads: Mutex::new(vec![]),
            fail: false,
        }
    }

    /// A sink whose every send fails.
    pub fn failing() -> Self {
        Self {
            payloads: Mutex::new(vec![]),
            fail: true,
        }
    }

    pub fn payloads(&self) -> Vec<Vec<u8>> {
        self.payloads
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }
}

impl Default for MemoryEventSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl EventSink for MemoryEventSink {
    async fn send(&self, payload: &[u8]) -> Result<(), SinkError> {
        if self.fail {
            return Err(SinkError::send(self.name(), "sink configured to fail"));
        }
        self.payloads
            .lock()
            .map_err(|e| SinkError::send(self.name(), e))?
            .push(payload.to_vec());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
