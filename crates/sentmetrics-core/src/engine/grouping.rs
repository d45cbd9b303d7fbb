//! Partitioning a sent batch by conversation.

use std::collections::BTreeMap;

use crate::model::SentMessage;

/// Messages of one conversation within the batch, as indices into the batch
/// slice, ordered by send time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationGroup {
    /// Conversation identifier shared by every member.
    pub conversation_id: String,
    /// Batch indices, earliest message first.
    pub members: Vec<usize>,
}

impl ConversationGroup {
    /// Index of the representative: the chronologically first member.
    #[must_use]
    pub fn representative(&self) -> usize {
        self.members[0]
    }
}

/// Group a batch by exact conversation id.
///
/// Every message lands in exactly one group. Members are sorted by
/// `sent_at`; ties keep batch order. The order of groups carries no meaning.
#[must_use]
pub fn group_by_conversation(messages: &[SentMessage]) -> Vec<ConversationGroup> {
    let mut by_id: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (idx, message) in messages.iter().enumerate() {
        by_id
            .entry(message.conversation_id.as_str())
            .or_default()
            .push(idx);
    }

    by_id
        .into_iter()
        .map(|(conversation_id, mut members)| {
            members.sort_by_key(|&idx| messages[idx].sent_at);
            ConversationGroup {
                conversation_id: conversation_id.to_string(),
                members,
            }
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::*;

    #[test]
    fn test_groups_preserve_every_message() {
        let t0 = Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap();
        let batch = vec![
            SentMessage::new("a2", "conv-a", t0 + Duration::hours(2)),
            SentMessage::new("b1", "conv-b", t0),
            SentMessage::new("a1", "conv-a", t0),
            SentMessage::new("c1", "Conv-A", t0),
        ];

        let groups = group_by_conversation(&batch);
        assert_eq!(groups.len(), 3);
        assert_eq!(groups.iter().map(|g| g.members.len()).sum::<usize>(), 4);

        let a = groups.iter().find(|g| g.conversation_id == "conv-a").unwrap();
        assert_eq!(a.members, vec![2, 0]);
        assert_eq!(batch[a.representative()].message_id, "a1");
    }

    #[test]
    fn test_empty_batch() {
        assert!(group_by_conversation(&[]).is_empty());
    }
}
