use std::time::Duration;

use reqwest::Client;

use super::Publisher;
use crate::error::SinkError;

/// POSTs each package record as JSON to a downstream endpoint, retrying
/// with exponential backoff before giving up.
#[derive(Clone)]
pub struct HttpPublisher {
    url: String,
    client: Client,
    timeout: Duration,
    max_attempts: u8,
}

impl HttpPublisher {
    pub fn new(url: String, client: Client) -> Self {
        Self {
            url,
            client,
            timeout: Duration::from_secs(5),
            max_attempts: 3,
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    /// Total attempts per payload; 0 is treated as 1.
    pub fn with_max_attempts(mut self, attempts: u8) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }
}

#[async_trait::async_trait]
impl Publisher for HttpPublisher {
    async fn send(&self, payload: &[u8]) -> Result<(), SinkError> {
        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let res = self
                .client
                .post(&self.url)
                .timeout(self.timeout)
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(payload.to_vec())
                .send()
                .await
                .and_then(|rsp| rsp.error_for_status());

            match res {
                Ok(_) => return Ok(()),
                Err(e) if attempt < self.max_attempts => {
                    tracing::debug!(attempt, error = %e, "publisher send failed; retrying");
                    tokio::time::sleep(Duration::from_millis(500u64 << (attempt - 1).min(6))).await;
                }
                Err(e) => return Err(SinkError::send(self.name(), e)),
            }
        }
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
