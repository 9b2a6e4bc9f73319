// src/feeds/providers/mod.rs
//! Registry-specific feeds. Each is a thin implementation of
//! [`ScheduledFeed`](crate::feeds::ScheduledFeed): fetch, normalize into
//! [`Package`](crate::feeds::Package), apply the cutoff last.

pub mod crates;
pub mod packagist;
pub mod pypi;
pub mod rubygems;

use serde::de::DeserializeOwned;

use crate::error::FeedError;

/// Joins a base URL and an absolute path without doubling the slash.
pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// GET `url` and return the body, mapping failures (including non-2xx) to
/// transport errors.
pub(crate) async fn get_text(
    client: &reqwest::Client,
    feed: &str,
    url: &str,
    query: &[(&str, String)],
) -> Result<String, FeedError> {
    let resp = client
        .get(url)
        .query(query)
        .send()
        .await
        .map_err(|e| FeedError::transport(feed, format!("GET {url}: {e}")))?;
    let resp = resp
        .error_for_status()
        .map_err(|e| FeedError::transport(feed, format!("GET {url}: {e}")))?;
    resp.text()
        .await
        .map_err(|e| FeedError::transport(feed, format!("reading {url}: {e}")))
}

/// GET `url` and decode the JSON body.
pub(crate) async fn get_json<T: DeserializeOwned>(
    client: &reqwest::Client,
    feed: &str,
    url: &str,
    query: &[(&str, String)],
) -> Result<T, FeedError> {
    let body = get_text(client, feed, url, query).await?;
    serde_json::from_str(&body).map_err(|e| FeedError::decode(feed, format!("{url}: {e}")))
}
