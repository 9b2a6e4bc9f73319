//! Error kinds for feeds, sinks, and poll cycles.

use thiserror::Error;

/// Failure of a single feed, either at construction, dispatch, or poll time.
///
/// Every variant carries the name of the feed it belongs to so the scheduler's
/// aggregate error list can be reported without extra bookkeeping.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FeedError {
    /// Network or HTTP failure reaching the upstream registry.
    #[error("{feed}: transport error: {message}")]
    Transport { feed: String, message: String },

    /// The upstream payload could not be decoded.
    #[error("{feed}: decode error: {message}")]
    Decode { feed: String, message: String },

    /// The feed structurally cannot honor a configuration option.
    #[error("{feed}: unsupported option {option:?}")]
    UnsupportedOption { feed: String, option: String },

    /// A configuration option was supplied but could not be parsed.
    #[error("{feed}: invalid option {option:?}: {message}")]
    InvalidOption {
        feed: String,
        option: String,
        message: String,
    },

    /// The scheduler was asked to poll a name absent from its registry.
    #[error("feed not found: {feed}")]
    NotFound { feed: String },

    /// The feed's task panicked or was cancelled before returning.
    #[error("{feed}: poll task failed: {message}")]
    Task { feed: String, message: String },
}

impl FeedError {
    pub fn transport(feed: &str, err: impl std::fmt::Display) -> Self {
        Self::Transport {
            feed: feed.to_string(),
            message: err.to_string(),
        }
    }

    pub fn decode(feed: &str, err: impl std::fmt::Display) -> Self {
        Self::Decode {
            feed: feed.to_string(),
            message: err.to_string(),
        }
    }

    pub fn unsupported_option(feed: &str, option: &str) -> Self {
        Self::UnsupportedOption {
            feed: feed.to_string(),
            option: option.to_string(),
        }
    }

    /// Name of the feed this error belongs to.
    pub fn feed(&self) -> &str {
        match self {
            Self::Transport { feed, .. }
            | Self::Decode { feed, .. }
            | Self::UnsupportedOption { feed, .. }
            | Self::InvalidOption { feed, .. }
            | Self::NotFound { feed }
            | Self::Task { feed, .. } => feed,
        }
    }
}

/// Failure to hand a payload to a publish or event sink.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    #[error("{sink}: send failed: {message}")]
    Send { sink: String, message: String },

    #[error("{sink}: encode failed: {message}")]
    Encode { sink: String, message: String },
}

impl SinkError {
    pub fn send(sink: &str, err: impl std::fmt::Display) -> Self {
        Self::Send {
            sink: sink.to_string(),
            message: err.to_string(),
        }
    }
}

/// Delivery failure that aborts the remainder of a poll cycle.
#[derive(Error, Debug)]
pub enum TriggerError {
    #[error("publishing package {name}@{version} failed: {source}")]
    Sink {
        name: String,
        version: String,
        #[source]
        source: SinkError,
    },

    #[error("encoding package {name}@{version} failed: {source}")]
    Encode {
        name: String,
        version: String,
        #[source]
        source: serde_json::Error,
    },
}
