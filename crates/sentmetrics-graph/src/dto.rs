//! Graph JSON payloads and their conversion into domain messages.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use sentmetrics_core::SentMessage;

use crate::error::{Error, Result};

/// Fields requested when looking up a conversation head.
pub const MESSAGE_SELECT: &str = "id,subject,from,conversationId,sentDateTime,isRead,\
hasAttachments,toRecipients,bodyPreview,internetMessageId,importance,isReadReceiptRequested";

/// One page of a Graph collection.
#[derive(Debug, Deserialize)]
pub struct Page<T> {
    /// Items on this page.
    #[serde(default = "Vec::new")]
    pub value: Vec<T>,
    /// Link to the next page, if any.
    #[serde(rename = "@odata.nextLink")]
    pub next_link: Option<String>,
}

/// A mail folder.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MailFolder {
    /// Folder id.
    pub id: String,
    /// Display name as shown in Outlook.
    pub display_name: String,
    /// All messages.
    #[serde(default, rename = "totalItemCount")]
    pub total_count: u32,
}

impl MailFolder {
    /// Whether the display name, trimmed and lower-cased, equals `name`.
    #[must_use]
    pub fn is_named(&self, name: &str) -> bool {
        self.display_name.trim().to_lowercase() == name.trim().to_lowercase()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct EmailAddress {
    #[serde(default)]
    address: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Recipient {
    #[serde(default)]
    email_address: EmailAddress,
}

/// A Graph message resource, as far as classification needs it.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(clippy::struct_excessive_bools)]
pub struct GraphMessage {
    id: String,
    #[serde(default)]
    subject: Option<String>,
    sent_date_time: Option<String>,
    #[serde(default)]
    is_read: bool,
    #[serde(default)]
    conversation_id: Option<String>,
    #[serde(default)]
    has_attachments: bool,
    #[serde(default)]
    from: Option<Recipient>,
    #[serde(default)]
    to_recipients: Vec<Recipient>,
    #[serde(default)]
    internet_message_id: Option<String>,
    #[serde(default)]
    importance: Option<String>,
    #[serde(default)]
    is_read_receipt_requested: bool,
    #[serde(default)]
    body_preview: Option<String>,
}

impl GraphMessage {
    /// Graph message id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Convert into a domain message.
    ///
    /// # Errors
    ///
    /// Returns an error if `sentDateTime` is missing or not RFC 3339, or the
    /// conversation id is missing.
    pub fn into_sent_message(self) -> Result<SentMessage> {
        let raw_sent = self.sent_date_time.ok_or_else(|| {
            Error::InvalidPayload(format!("message {} has no sentDateTime", self.id))
        })?;
        let sent_at = DateTime::parse_from_rfc3339(&raw_sent)
            .map_err(|e| {
                Error::InvalidPayload(format!("message {} sentDateTime {raw_sent:?}: {e}", self.id))
            })?
            .with_timezone(&Utc);
        let conversation_id = self.conversation_id.ok_or_else(|| {
            Error::InvalidPayload(format!("message {} has no conversationId", self.id))
        })?;

        let mut message = SentMessage::new(self.id, conversation_id, sent_at);
        message.subject = self.subject;
        message.body_preview = self.body_preview;
        message.from_address = self.from.and_then(|f| f.email_address.address);
        message.to_addresses = self
            .to_recipients
            .into_iter()
            .filter_map(|r| r.email_address.address)
            .collect();
        message.is_read = self.is_read;
        message.has_attachments = self.has_attachments;
        message.internet_message_id = self.internet_message_id;
        message.importance = self.importance;
        message.is_read_receipt_requested = self.is_read_receipt_requested;
        Ok(message)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_full_message() {
        let json = r#"{
            "id": "AAMk1",
            "subject": "Proposta",
            "sentDateTime": "2025-03-10T09:00:00Z",
            "isRead": true,
            "conversationId": "conv-1",
            "hasAttachments": true,
            "from": {"emailAddress": {"name": "Sales", "address": "sales@acme.com"}},
            "toRecipients": [
                {"emailAddress": {"address": "a@x.com"}},
                {"emailAddress": {"name": "No address"}}
            ],
            "internetMessageId": "<abc@acme.com>",
            "importance": "high",
            "isReadReceiptRequested": true,
            "bodyPreview": "Segue proposta"
        }"#;

        let message: GraphMessage = serde_json::from_str(json).unwrap();
        let message = message.into_sent_message().unwrap();

        assert_eq!(message.message_id, "AAMk1");
        assert_eq!(message.conversation_id, "conv-1");
        assert_eq!(
            message.sent_at,
            Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap()
        );
        assert_eq!(message.sender_str(), "sales@acme.com");
        assert_eq!(message.to_addresses, vec!["a@x.com"]);
        assert!(message.is_read);
        assert!(message.has_attachments);
        assert!(message.is_read_receipt_requested);
        assert_eq!(message.importance.as_deref(), Some("high"));
        assert_eq!(message.body_preview_str(), "Segue proposta");
    }

    #[test]
    fn test_sparse_message_and_offset() {
        let json = r#"{
            "id": "AAMk2",
            "sentDateTime": "2025-03-10T06:00:00-03:00",
            "conversationId": "conv-2"
        }"#;

        let message: GraphMessage = serde_json::from_str(json).unwrap();
        let message = message.into_sent_message().unwrap();

        assert_eq!(
            message.sent_at,
            Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap()
        );
        assert!(message.subject.is_none());
        assert!(message.from_address.is_none());
        assert!(message.to_addresses.is_empty());
    }

    #[test]
    fn test_missing_sent_time_is_rejected() {
        let message: GraphMessage =
            serde_json::from_str(r#"{"id": "x", "conversationId": "c"}"#).unwrap();
        assert!(matches!(
            message.into_sent_message(),
            Err(Error::InvalidPayload(_))
        ));
    }

    #[test]
    fn test_folder_name_match() {
        let folder: MailFolder = serde_json::from_str(
            r#"{"id": "f1", "displayName": " Itens Enviados ", "unreadItemCount": 0, "totalItemCount": 12}"#,
        )
        .unwrap();
        assert!(folder.is_named("itens enviados"));
        assert!(!folder.is_named("sent items"));
        assert_eq!(folder.total_count, 12);
    }

    #[test]
    fn test_page_next_link() {
        let page: Page<MailFolder> = serde_json::from_str(
            r#"{"value": [], "@odata.nextLink": "https://graph.microsoft.com/v1.0/next"}"#,
        )
        .unwrap();
        assert!(page.value.is_empty());
        assert_eq!(
            page.next_link.as_deref(),
            Some("https://graph.microsoft.com/v1.0/next")
        );
    }
}
