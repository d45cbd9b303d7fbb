//! Upstream selection of sent messages worth classifying.

use crate::model::SentMessage;

/// Drops test sends and internal traffic before classification.
///
/// All comparisons are case-insensitive substring matches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendFilter {
    subject_filter: Vec<String>,
    excluded_subjects: Vec<String>,
    ignored_recipients: Vec<String>,
}

impl SendFilter {
    /// Build a filter from pattern lists.
    ///
    /// An empty `subject_filter` keeps every subject.
    #[must_use]
    pub fn new<S: AsRef<str>>(
        subject_filter: &[S],
        excluded_subjects: &[S],
        ignored_recipients: &[S],
    ) -> Self {
        Self {
            subject_filter: lowered(subject_filter),
            excluded_subjects: lowered(excluded_subjects),
            ignored_recipients: lowered(ignored_recipients),
        }
    }

    /// Whether a message passes the filter.
    ///
    /// An empty subject filter accepts every subject. Recipients are joined
    /// with `,` before the ignored-pattern test.
    #[must_use]
    pub fn accepts(&self, message: &SentMessage) -> bool {
        let subject = message.subject_str().to_lowercase();

        if !self.subject_filter.is_empty()
            && !self.subject_filter.iter().any(|p| subject.contains(p))
        {
            return false;
        }
        if self.excluded_subjects.iter().any(|p| subject.contains(p)) {
            return false;
        }
        if self.ignored_recipients.is_empty() {
            return true;
        }

        let recipients = message.to_addresses.join(",").to_lowercase();
        !self.ignored_recipients.iter().any(|p| recipients.contains(p))
    }

    /// Keep only accepted messages, preserving order.
    #[must_use]
    pub fn apply(&self, messages: Vec<SentMessage>) -> Vec<SentMessage> {
        messages.into_iter().filter(|m| self.accepts(m)).collect()
    }
}

fn lowered<S: AsRef<str>>(patterns: &[S]) -> Vec<String> {
    patterns
        .iter()
        .map(|p| p.as_ref().trim().to_lowercase())
        .filter(|p| !p.is_empty())
        .collect()
}
