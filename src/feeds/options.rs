// src/feeds/options.rs
use std::time::Duration;

use serde::Deserialize;

use crate::error::FeedError;

/// Per-feed options as they appear under `enabled_feeds[].options`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct FeedOptions {
    /// Restrict polling to these package names. `None` (or an empty list)
    /// means the registry's global activity.
    #[serde(default)]
    pub packages: Option<Vec<String>>,
    /// Duration string such as `"5m"` or `"1h30m"`.
    #[serde(default)]
    pub poll_rate: Option<String>,
}

impl FeedOptions {
    /// Trimmed, de-duplicated allowlist, or `None` when unrestricted.
    pub fn allowlist(&self) -> Option<Vec<String>> {
        use std::collections::BTreeSet;
        let set: BTreeSet<String> = self
            .packages
            .iter()
            .flatten()
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect();
        if set.is_empty() {
            None
        } else {
            Some(set.into_iter().collect())
        }
    }

    /// Rejects an allowlist for feeds that only expose a global stream.
    pub fn reject_allowlist(&self, feed: &str) -> Result<(), FeedError> {
        if self.allowlist().is_some() {
            return Err(FeedError::unsupported_option(feed, "packages"));
        }
        Ok(())
    }

    /// Configured poll rate, falling back to `default`.
    pub fn poll_interval_or(&self, feed: &str, default: Duration) -> Result<Duration, FeedError> {
        match self.poll_rate.as_deref().map(str::trim) {
            None | Some("") => Ok(default),
            Some(raw) => parse_duration(raw).ok_or_else(|| FeedError::InvalidOption {
                feed: feed.to_string(),
                option: "poll_rate".to_string(),
                message: format!("cannot parse duration {raw:?}"),
            }),
        }
    }
}

/// Parses `<int><unit>` sequences (`ms`, `s`, `m`, `h`), e.g. `"1h30m"`.
/// Zero-length results are rejected.
pub fn parse_duration(literal: &str) -> Option<Duration> {
    let bytes = literal.as_bytes();
    if bytes.is_empty() {
        return None;
    }
    let mut total_ms = 0u64;
    let mut idx = 0usize;
    while idx < bytes.len() {
        let start = idx;
        while idx < bytes.len() && bytes[idx].is_ascii_digit() {
            idx += 1;
        }
        if start == idx {
            return None;
        }
        let value: u64 = literal[start..idx].parse().ok()?;
        let unit_start = idx;
        while idx < bytes.len() && bytes[idx].is_ascii_alphabetic() {
            idx += 1;
        }
        let factor = match &literal[unit_start..idx] {
            "ms" => 1,
            "s" => 1_000,
            "m" => 60_000,
            "h" => 3_600_000,
            _ => return None,
        };
        total_ms = total_ms.checked_add(value.checked_mul(factor)?)?;
    }
    if total_ms == 0 {
        return None;
    }
    Some(Duration::from_millis(total_ms))
}
