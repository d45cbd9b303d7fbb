//! Domain models: sent messages and metrics snapshots.

mod message;
mod metrics;

pub use message::{SentMessage, TemperatureLabel};
pub use metrics::{Counters, MetricsSnapshot};
