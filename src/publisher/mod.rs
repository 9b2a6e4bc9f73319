//! Outbound delivery of serialized packages.

pub mod http;

use std::io::Write;
use std::sync::Mutex;

use crate::error::SinkError;

pub use http::HttpPublisher;

/// Send-only contract for package records. One call per package; no
/// buffering or batching. Retry policy, if any, lives in the transport.
#[async_trait::async_trait]
pub trait Publisher: Send + Sync {
    async fn send(&self, payload: &[u8]) -> Result<(), SinkError>;
    fn name(&self) -> &'static str;
}

/// Writes one JSON line per package to stdout.
#[derive(Debug, Default, Clone)]
pub struct StdoutPublisher;

#[async_trait::async_trait]
impl Publisher for StdoutPublisher {
    async fn send(&self, payload: &[u8]) -> Result<(), SinkError> {
        let mut out = std::io::stdout().lock();
        out.write_all(payload)
            .and_then(|_| out.write_all(b"\n"))
            .and_then(|_| out.flush())
            .map_err(|e| SinkError::send(self.name(), e))
    }

    fn name(&self) -> &'static str {
        "stdout"
    }
}

// --- Test helper ---
pub struct MemoryPublisher {
    sent: Mutex<Vec<Vec<u8>>>,
    fail_after: Option<usize>,
}

impl MemoryPublisher {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(vec![]),
            fail_after: None,
        }
    }

    /// Accepts `n` payloads, then fails every send.
    pub fn failing_after(n: usize) -> Self {
        Self {
            sent: Mutex::new(vec![]),
            fail_after: Some(n),
        }
    }

    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Sent payloads decoded as JSON.
    pub fn sent_json(&self) -> Vec<serde_json::Value> {
        self.sent()
            .iter()
            .filter_map(|b| serde_json::from_slice(b).ok())
            .collect()
    }
}

impl Default for MemoryPublisher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Publisher for MemoryPublisher {
    async fn send(&self, payload: &[u8]) -> Result<(), SinkError> {
        let mut sent = self
            .sent
            .lock()
            .map_err(|e| SinkError::send(self.name(), e))?;
        if self.fail_after.is_some_and(|n| sent.len() >= n) {
            return Err(SinkError::send(self.name(), "publisher configured to fail"));
        }
        sent.push(payload.to_vec());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
