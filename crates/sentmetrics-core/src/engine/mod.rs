//! Conversation-based engagement classification.
//!
//! The engine turns one account's sent batch into a [`MetricsSnapshot`]:
//!
//! 1. group the batch by conversation id
//! 2. fetch each conversation's current head from the [`MessageSource`]
//! 3. evaluate bounce/reply, latency and score per conversation
//! 4. write the outcome onto the conversation's representative message
//! 5. fold outcomes into clean and raw totals
//!
//! A conversation whose head cannot be fetched is logged and skipped: it
//! contributes to no total and its messages are left untouched, including
//! their `classified` marker.
//!
//! # Example
//!
//! ```ignore
//! use sentmetrics_core::{EngagementEngine, EngineConfig};
//!
//! let engine = EngagementEngine::new(graph_client, EngineConfig::default());
//! let snapshot = engine.classify(&mut messages, "sales@acme.com").await;
//!
//! println!("{} sent, {} replied", snapshot.clean.sent, snapshot.clean.replied);
//! ```

mod aggregator;
mod evaluator;
mod grouping;
mod heuristics;

pub use aggregator::{Aggregator, ConversationRecord};
pub use evaluator::{
    BOUNCE_SCORE, ConversationOutcome, EngagementStatus, REPLY_BASE_SCORE, SPEED_BONUS_BANDS,
    apply_outcome, engagement_score, evaluate, speed_bonus,
};
pub use grouping::{ConversationGroup, group_by_conversation};
pub use heuristics::{DEFAULT_IGNORED_PREFIXES, IgnoredPrefixes, has_ignored_prefix, is_bounce};

use chrono::Utc;
use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::model::{MetricsSnapshot, SentMessage};
use crate::source::{DEFAULT_HEAD_LIMIT, MessageSource};

/// Engine tuning.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Messages fetched per conversation head.
    pub head_limit: usize,
    /// Conversation heads fetched concurrently. `1` is fully sequential.
    pub concurrency: usize,
    /// Reply/forward prefixes excluded from the clean set and from replies.
    pub prefixes: IgnoredPrefixes,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            head_limit: DEFAULT_HEAD_LIMIT,
            concurrency: 1,
            prefixes: IgnoredPrefixes::default(),
        }
    }
}

/// Classifies sent batches against a [`MessageSource`].
pub struct EngagementEngine<S> {
    source: S,
    config: EngineConfig,
}

impl<S: MessageSource> EngagementEngine<S> {
    /// Create an engine over a message source.
    #[must_use]
    pub const fn new(source: S, config: EngineConfig) -> Self {
        Self { source, config }
    }

    /// The underlying message source.
    #[must_use]
    pub const fn source(&self) -> &S {
        &self.source
    }

    /// The engine configuration.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Classify a sent batch for `account`.
    ///
    /// Writes derived fields onto the representative message of every
    /// successfully evaluated conversation and returns the run's snapshot.
    /// Head fetches may run concurrently; outcomes are merged in
    /// conversation order afterwards, so results do not depend on
    /// concurrency.
    pub async fn classify(&self, messages: &mut [SentMessage], account: &str) -> MetricsSnapshot {
        let run_at = Utc::now();
        info!(account, total_sent = messages.len(), "Starting classification run");

        let Some(first) = messages.first() else {
            info!(account, "Empty batch, nothing to classify");
            return MetricsSnapshot::empty(run_at);
        };
        let date = first.sent_at.date_naive();

        let groups = group_by_conversation(messages);
        let limit = self.config.head_limit;

        let mut heads: Vec<_> = stream::iter(groups.iter().enumerate())
            .map(|(n, group)| async move {
                debug!(
                    account,
                    n,
                    conversation_id = %group.conversation_id,
                    "Fetching conversation head"
                );
                let head = self
                    .source
                    .conversation_head(account, &group.conversation_id, limit)
                    .await;
                (n, head)
            })
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await;
        heads.sort_by_key(|(n, _)| *n);

        let mut aggregator = Aggregator::new();
        let mut skipped = 0_usize;

        for (n, head) in heads {
            let group = &groups[n];
            let mut head = match head {
                Ok(head) => head,
                Err(e) => {
                    warn!(
                        account,
                        conversation_id = %group.conversation_id,
                        error = %e,
                        "Failed to fetch conversation head, skipping"
                    );
                    skipped += 1;
                    continue;
                }
            };

            let rep = group.representative();
            let outcome = evaluate(
                &mut head,
                account,
                &self.config.prefixes,
                messages[rep].sent_at,
            );
            trace_outcome(&group.conversation_id, &outcome);
            apply_outcome(&mut messages[rep], &outcome);
            for &i in &group.members {
                messages[i].classified = true;
            }

            let has_clean_message = group
                .members
                .iter()
                .any(|&i| !self.config.prefixes.matches(messages[i].subject_str()));
            aggregator.record(
                ConversationRecord {
                    conversation_id: &group.conversation_id,
                    batch_size: group.members.len(),
                    has_clean_message,
                },
                &outcome,
            );
        }

        let snapshot = aggregator.finish(date, run_at);
        info!(
            account,
            date = %snapshot.date,
            conversations = groups.len(),
            skipped,
            "Classification run complete"
        );
        log_snapshot(account, &snapshot);
        snapshot
    }
}

fn trace_outcome(conversation_id: &str, outcome: &ConversationOutcome) {
    match outcome.status {
        EngagementStatus::Bounced => debug!(conversation_id, "Bounce detected"),
        EngagementStatus::Replied => debug!(
            conversation_id,
            latency_secs = ?outcome.reply_latency_secs,
            "Reply detected"
        ),
        EngagementStatus::Unanswered => {}
    }
}

fn log_snapshot(account: &str, snapshot: &MetricsSnapshot) {
    info!(
        account,
        total_sent = snapshot.clean.sent,
        total_delivered = snapshot.clean.delivered,
        total_bounced = snapshot.clean.bounced,
        total_replied = snapshot.clean.replied,
        total_no_reply = snapshot.clean.no_reply,
        raw_total_sent = snapshot.raw.sent,
        raw_total_bounced = snapshot.raw.bounced,
        raw_total_replied = snapshot.raw.replied,
        delivery_rate = snapshot.delivery_rate(),
        reply_rate = snapshot.reply_rate(),
        avg_reply_latency_secs = ?snapshot.avg_reply_latency_secs,
        temperature = %snapshot.temperature,
        "Metrics snapshot"
    );
}
