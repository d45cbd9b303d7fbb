//! Folding conversation outcomes into clean and raw totals.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use super::evaluator::ConversationOutcome;
use crate::model::{Counters, MetricsSnapshot, TemperatureLabel};

/// Running totals for one classification run.
///
/// Fed once per successfully evaluated conversation. Skipped conversations
/// are simply never recorded, so they drop out of both the clean and the raw
/// totals.
#[derive(Debug, Clone, Default)]
pub struct Aggregator {
    clean_conversations: HashSet<String>,
    bounced_conversations: u32,
    replied_conversations: u32,
    raw_sent: u32,
    raw_bounced: u32,
    raw_replied: u32,
    latencies: Vec<f64>,
}

/// What the aggregator needs to know about one evaluated conversation.
#[derive(Debug, Clone, Copy)]
pub struct ConversationRecord<'a> {
    /// Conversation identifier.
    pub conversation_id: &'a str,
    /// Number of batch messages in the conversation.
    pub batch_size: usize,
    /// Whether at least one batch message has no ignored prefix.
    pub has_clean_message: bool,
}

impl Aggregator {
    /// Create an empty aggregator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one evaluated conversation.
    ///
    /// Conversations whose batch messages are all reply/forward-prefixed
    /// count toward the raw totals only.
    pub fn record(&mut self, conversation: ConversationRecord<'_>, outcome: &ConversationOutcome) {
        let size = u32::try_from(conversation.batch_size).unwrap_or(u32::MAX);
        self.raw_sent = self.raw_sent.saturating_add(size);

        let clean = conversation.has_clean_message
            && self
                .clean_conversations
                .insert(conversation.conversation_id.to_string());

        if outcome.is_bounced() {
            self.raw_bounced = self.raw_bounced.saturating_add(size);
            if clean {
                self.bounced_conversations += 1;
            }
        } else if outcome.is_replied() {
            self.raw_replied = self.raw_replied.saturating_add(size);
            if clean {
                self.replied_conversations += 1;
            }
            if let Some(latency) = outcome.reply_latency_secs {
                self.latencies.push(latency);
            }
        }
    }

    /// Mean of the recorded positive latencies.
    #[must_use]
    #[allow(clippy::cast_precision_loss)] // Latency counts are small
    pub fn average_latency(&self) -> Option<f64> {
        if self.latencies.is_empty() {
            return None;
        }
        Some(self.latencies.iter().sum::<f64>() / self.latencies.len() as f64)
    }

    /// Clean (deduplicated) counters.
    #[must_use]
    pub fn clean_counters(&self) -> Counters {
        let sent = u32::try_from(self.clean_conversations.len()).unwrap_or(u32::MAX);
        Counters::from_totals(sent, self.bounced_conversations, self.replied_conversations)
    }

    /// Raw (per message) counters.
    #[must_use]
    pub const fn raw_counters(&self) -> Counters {
        Counters::from_totals(self.raw_sent, self.raw_bounced, self.raw_replied)
    }

    /// Assemble the immutable snapshot.
    #[must_use]
    pub fn finish(self, date: NaiveDate, run_at: DateTime<Utc>) -> MetricsSnapshot {
        let clean = self.clean_counters();
        MetricsSnapshot {
            id: Uuid::new_v4(),
            run_at,
            date,
            clean,
            raw: self.raw_counters(),
            avg_reply_latency_secs: self.average_latency(),
            temperature: TemperatureLabel::from_reply_rate(clean.reply_rate()),
        }
    }
}
