// src/lib.rs
//! Polls package registries for newly published releases, filters them by a
//! cutoff, flags registries whose bounded listings may have dropped entries,
//! and forwards each release to a publisher.

pub mod config;
pub mod error;
pub mod events;
pub mod feeds;
pub mod metrics;
pub mod publisher;
pub mod trigger;

// ---- Re-exports for stable public API ----
pub use crate::error::{FeedError, SinkError, TriggerError};
pub use crate::feeds::scheduler::Scheduler;
pub use crate::feeds::{apply_cutoff, Package, ScheduledFeed};
pub use crate::trigger::FeedHandler;
