//! Per-conversation engagement evaluation.
//!
//! Evaluation is pure: it turns a conversation head into a
//! [`ConversationOutcome`]. Writing the outcome onto the representative
//! message is a separate step, so heads can be fetched and evaluated
//! concurrently and merged afterwards.

use chrono::{DateTime, Utc};

use super::heuristics::{IgnoredPrefixes, is_bounce};
use crate::model::{SentMessage, TemperatureLabel};

/// Score of a bounced conversation.
pub const BOUNCE_SCORE: i32 = -100;
/// Base score of a replied conversation.
pub const REPLY_BASE_SCORE: i32 = 50;

/// Speed bonus bands as `(exclusive upper bound in seconds, bonus)`,
/// ascending. The first band whose bound exceeds the latency applies.
pub const SPEED_BONUS_BANDS: [(f64, i32); 3] = [
    (4.0 * 3600.0, 20),
    (12.0 * 3600.0, 10),
    (48.0 * 3600.0, 5),
];

/// What happened to a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngagementStatus {
    /// A head message looks like a non-delivery report.
    Bounced,
    /// Someone other than the account answered.
    Replied,
    /// Neither.
    Unanswered,
}

/// Result of evaluating one conversation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConversationOutcome {
    /// Bounce/reply status.
    pub status: EngagementStatus,
    /// Seconds from the representative to the first reply, only when
    /// strictly positive.
    pub reply_latency_secs: Option<f64>,
    /// Engagement score.
    pub engagement_score: i32,
    /// Label from the score sign.
    pub temperature: TemperatureLabel,
}

impl ConversationOutcome {
    /// Whether the conversation bounced.
    #[must_use]
    pub fn is_bounced(&self) -> bool {
        self.status == EngagementStatus::Bounced
    }

    /// Whether the conversation was replied to.
    #[must_use]
    pub fn is_replied(&self) -> bool {
        self.status == EngagementStatus::Replied
    }
}

/// Speed bonus for a measured reply latency.
#[must_use]
pub fn speed_bonus(latency_secs: f64) -> i32 {
    SPEED_BONUS_BANDS
        .iter()
        .find(|(bound, _)| latency_secs < *bound)
        .map_or(0, |&(_, bonus)| bonus)
}

/// Engagement score for a status and optional measured latency.
///
/// A replied conversation without a measurable (positive) latency gets the
/// base score only.
#[must_use]
pub fn engagement_score(status: EngagementStatus, latency_secs: Option<f64>) -> i32 {
    match status {
        EngagementStatus::Bounced => BOUNCE_SCORE,
        EngagementStatus::Unanswered => 0,
        EngagementStatus::Replied => REPLY_BASE_SCORE + latency_secs.map_or(0, speed_bonus),
    }
}

/// Evaluate a conversation head.
///
/// `head` is sorted in place by send time. Bounce takes precedence: when any
/// head message is a bounce, reply detection is skipped. Otherwise the first
/// head message from a sender other than `account` (case-insensitive) whose
/// subject carries no ignored prefix is the first reply.
#[must_use]
pub fn evaluate(
    head: &mut [SentMessage],
    account: &str,
    prefixes: &IgnoredPrefixes,
    representative_sent_at: DateTime<Utc>,
) -> ConversationOutcome {
    head.sort_by_key(|m| m.sent_at);

    if head.iter().any(is_bounce) {
        return outcome(EngagementStatus::Bounced, None);
    }

    let account = account.to_lowercase();
    let first_reply = head.iter().find(|m| {
        m.sender_str().to_lowercase() != account && !prefixes.matches(m.subject_str())
    });

    match first_reply {
        Some(reply) => {
            let latency = latency_secs(representative_sent_at, reply.sent_at);
            outcome(
                EngagementStatus::Replied,
                Some(latency).filter(|l| *l > 0.0),
            )
        }
        None => outcome(EngagementStatus::Unanswered, None),
    }
}

/// Write an outcome onto the representative message.
pub fn apply_outcome(representative: &mut SentMessage, outcome: &ConversationOutcome) {
    representative.is_bounced = outcome.is_bounced();
    representative.is_replied = outcome.is_replied();
    representative.reply_latency_secs = outcome.reply_latency_secs;
    representative.engagement_score = outcome.engagement_score;
    representative.temperature = outcome.temperature;
}

fn outcome(status: EngagementStatus, reply_latency_secs: Option<f64>) -> ConversationOutcome {
    let engagement_score = engagement_score(status, reply_latency_secs);
    ConversationOutcome {
        status,
        reply_latency_secs,
        engagement_score,
        temperature: TemperatureLabel::from_score(engagement_score),
    }
}

#[allow(clippy::cast_precision_loss)] // Millisecond spans are far below 2^52
fn latency_secs(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_milliseconds() as f64 / 1000.0
}
