//! # sentmetrics-core
//!
//! Conversation-based engagement classification for sent mail.
//!
//! This crate provides:
//! - Domain models (sent messages, daily metrics snapshots)
//! - Bounce and reply/forward-prefix heuristics
//! - The engagement engine: grouping, per-conversation evaluation and
//!   clean/raw aggregation
//! - The [`MessageSource`] trait the engine fetches conversation heads from
//! - Upstream send filtering, environment settings, and the per-account job
//! - Local storage (`SQLite`)

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod config;
pub mod engine;
mod error;
pub mod filter;
pub mod job;
pub mod model;
pub mod repository;
pub mod source;

pub use config::{ConfigError, Settings};
pub use engine::{
    ConversationOutcome, EngagementEngine, EngagementStatus, EngineConfig, IgnoredPrefixes,
};
pub use error::{Error, Result};
pub use filter::SendFilter;
pub use job::{AccountRun, MetricsJob};
pub use model::{Counters, MetricsSnapshot, SentMessage, TemperatureLabel};
pub use repository::{MetricsRepository, StoredMetrics};
pub use source::{DEFAULT_HEAD_LIMIT, MessageSource};
