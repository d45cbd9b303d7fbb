//! The mail service as seen by the classification engine.

use std::future::Future;

use crate::model::SentMessage;

/// Default number of messages fetched per conversation head.
pub const DEFAULT_HEAD_LIMIT: usize = 10;

/// Source of sent messages and conversation heads for an account.
///
/// Implemented by the Graph adapter in production and by in-memory fakes in
/// tests.
pub trait MessageSource: Send + Sync {
    /// Transport-level error.
    type Error: std::error::Error + Send + Sync + 'static;

    /// All messages in the account's Sent folder.
    fn sent_messages(
        &self,
        account: &str,
    ) -> impl Future<Output = Result<Vec<SentMessage>, Self::Error>> + Send;

    /// Up to `limit` messages sharing `conversation_id`, from any folder, in
    /// no particular order.
    fn conversation_head(
        &self,
        account: &str,
        conversation_id: &str,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<SentMessage>, Self::Error>> + Send;
}
