//! Sent message record and engagement labels.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Three-valued engagement summary.
///
/// Used both per message (from the sign of the engagement score) and per run
/// (from the clean reply rate). The persisted form keeps the Portuguese
/// labels the dashboards were built around.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TemperatureLabel {
    /// Engaged: replied, or a high reply rate.
    Hot,
    /// Neutral: no reply yet, or a moderate reply rate.
    Warm,
    /// Disengaged: bounced, or a low reply rate.
    #[default]
    Cold,
}

impl TemperatureLabel {
    /// Derive the per-message label from an engagement score.
    #[must_use]
    pub const fn from_score(score: i32) -> Self {
        if score > 0 {
            Self::Hot
        } else if score < 0 {
            Self::Cold
        } else {
            Self::Warm
        }
    }

    /// Derive the run-level label from the clean reply rate.
    #[must_use]
    pub fn from_reply_rate(rate: f64) -> Self {
        if rate >= 0.50 {
            Self::Hot
        } else if rate >= 0.20 {
            Self::Warm
        } else {
            Self::Cold
        }
    }

    /// Parse from database string representation.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "quente" | "hot" => Self::Hot,
            "morno" | "warm" => Self::Warm,
            _ => Self::Cold,
        }
    }

    /// Convert to database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Hot => "quente",
            Self::Warm => "morno",
            Self::Cold => "frio",
        }
    }
}

impl std::fmt::Display for TemperatureLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TemperatureLabel {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

/// A message taken from an account's Sent folder, or from a conversation head.
///
/// The derived fields at the bottom are written by the classification engine,
/// and only on the representative (chronologically first) message of each
/// conversation in the batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[allow(clippy::struct_excessive_bools)] // Mirrors the mail service's flags
pub struct SentMessage {
    /// Internal identifier, generated locally.
    pub id: Uuid,
    /// Mail service message id.
    pub message_id: String,
    /// RFC 5322 `Message-ID` header, when known.
    pub internet_message_id: Option<String>,
    /// Conversation the message belongs to.
    pub conversation_id: String,
    /// Subject line.
    pub subject: Option<String>,
    /// First characters of the body.
    pub body_preview: Option<String>,
    /// When the message was sent.
    pub sent_at: DateTime<Utc>,
    /// Sender address.
    pub from_address: Option<String>,
    /// Recipient addresses.
    pub to_addresses: Vec<String>,
    /// Whether the message has been read.
    pub is_read: bool,
    /// Whether the message has attachments.
    pub has_attachments: bool,
    /// Importance as reported by the mail service (`low`, `normal`, `high`).
    pub importance: Option<String>,
    /// Whether a read receipt was requested.
    pub is_read_receipt_requested: bool,

    /// The conversation bounced.
    pub is_bounced: bool,
    /// The conversation received a reply.
    pub is_replied: bool,
    /// Seconds between this message and the first reply, when positive.
    pub reply_latency_secs: Option<f64>,
    /// Engagement score (-100 bounced, 0 unanswered, 50..=70 replied).
    pub engagement_score: i32,
    /// Label derived from the engagement score.
    pub temperature: TemperatureLabel,
    /// Set by the engine on every batch message of a conversation evaluated
    /// in the current run. Derived fields are only persisted when set.
    #[serde(skip)]
    pub classified: bool,
}

impl SentMessage {
    /// Create a message with the identity fields set and everything else
    /// defaulted.
    #[must_use]
    pub fn new(
        message_id: impl Into<String>,
        conversation_id: impl Into<String>,
        sent_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            message_id: message_id.into(),
            internet_message_id: None,
            conversation_id: conversation_id.into(),
            subject: None,
            body_preview: None,
            sent_at,
            from_address: None,
            to_addresses: Vec::new(),
            is_read: false,
            has_attachments: false,
            importance: None,
            is_read_receipt_requested: false,
            is_bounced: false,
            is_replied: false,
            reply_latency_secs: None,
            engagement_score: 0,
            temperature: TemperatureLabel::Cold,
            classified: false,
        }
    }

    /// Sets the subject.
    #[must_use]
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Sets the sender address.
    #[must_use]
    pub fn with_from(mut self, from: impl Into<String>) -> Self {
        self.from_address = Some(from.into());
        self
    }

    /// Sets the body preview.
    #[must_use]
    pub fn with_body_preview(mut self, preview: impl Into<String>) -> Self {
        self.body_preview = Some(preview.into());
        self
    }

    /// Sets the recipient addresses.
    #[must_use]
    pub fn with_recipients(mut self, to: Vec<String>) -> Self {
        self.to_addresses = to;
        self
    }

    /// Subject, or an empty string when absent.
    #[must_use]
    pub fn subject_str(&self) -> &str {
        self.subject.as_deref().unwrap_or_default()
    }

    /// Body preview, or an empty string when absent.
    #[must_use]
    pub fn body_preview_str(&self) -> &str {
        self.body_preview.as_deref().unwrap_or_default()
    }

    /// Sender address, or an empty string when absent.
    #[must_use]
    pub fn sender_str(&self) -> &str {
        self.from_address.as_deref().unwrap_or_default()
    }
}
