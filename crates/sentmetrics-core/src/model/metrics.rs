//! Daily metrics snapshot.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::message::TemperatureLabel;

/// The five outcome counters, computed once over distinct conversations and
/// once over every message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Counters {
    /// Messages (or conversations) sent.
    pub sent: u32,
    /// Sent minus bounced.
    pub delivered: u32,
    /// Bounced.
    pub bounced: u32,
    /// Replied.
    pub replied: u32,
    /// Delivered minus replied.
    pub no_reply: u32,
}

impl Counters {
    /// Build counters from the three measured totals.
    ///
    /// `delivered` and `no_reply` are derived so the identities
    /// `delivered = sent - bounced` and `no_reply = delivered - replied`
    /// always hold. Callers guarantee `bounced + replied <= sent`; excess is
    /// clamped at zero rather than wrapping.
    #[must_use]
    pub const fn from_totals(sent: u32, bounced: u32, replied: u32) -> Self {
        let delivered = sent.saturating_sub(bounced);
        Self {
            sent,
            delivered,
            bounced,
            replied,
            no_reply: delivered.saturating_sub(replied),
        }
    }

    /// Delivered over sent, guarded against an empty batch.
    #[must_use]
    pub fn delivery_rate(&self) -> f64 {
        f64::from(self.delivered) / f64::from(self.sent.max(1))
    }

    /// Replied over delivered, guarded against zero deliveries.
    #[must_use]
    pub fn reply_rate(&self) -> f64 {
        f64::from(self.replied) / f64::from(self.delivered.max(1))
    }
}

/// Immutable result of one classification run for one account.
///
/// `clean` counts distinct conversations whose subject carries no
/// reply/forward prefix; `raw` counts every message in the batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Generated run identifier.
    pub id: Uuid,
    /// When the run happened.
    pub run_at: DateTime<Utc>,
    /// Business date: date of the first sent message, or today when empty.
    pub date: NaiveDate,
    /// Deduplicated conversation counters.
    pub clean: Counters,
    /// Per-message counters.
    pub raw: Counters,
    /// Mean of the positive reply latencies, in seconds.
    pub avg_reply_latency_secs: Option<f64>,
    /// Run-level label from the clean reply rate.
    pub temperature: TemperatureLabel,
}

impl MetricsSnapshot {
    /// Snapshot for a run that had nothing to classify.
    #[must_use]
    pub fn empty(run_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            run_at,
            date: run_at.date_naive(),
            clean: Counters::default(),
            raw: Counters::default(),
            avg_reply_latency_secs: None,
            temperature: TemperatureLabel::Cold,
        }
    }

    /// Clean delivery rate.
    #[must_use]
    pub fn delivery_rate(&self) -> f64 {
        self.clean.delivery_rate()
    }

    /// Clean reply rate.
    #[must_use]
    pub fn reply_rate(&self) -> f64 {
        self.clean.reply_rate()
    }
}
