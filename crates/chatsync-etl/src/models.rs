//! Shared data model: record types, source pages and normalized rows

use crate::error::EtlError;
use crate::normalize::{NormalizedConversation, NormalizedMessage};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Raw record exactly as returned by the source API
pub type RawRecord = Value;

/// The two entities fetched from the chat platform and stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordType {
    Conversation,
    Message,
}

impl RecordType {
    /// Default processing order for a full day
    pub const ALL: [RecordType; 2] = [RecordType::Message, RecordType::Conversation];

    pub fn as_str(self) -> &'static str {
        match self {
            RecordType::Conversation => "conversation",
            RecordType::Message => "message",
        }
    }

    /// Plural name used for both the API endpoint and the destination table
    pub fn collection(self) -> &'static str {
        match self {
            RecordType::Conversation => "conversations",
            RecordType::Message => "messages",
        }
    }
}

impl std::str::FromStr for RecordType {
    type Err = EtlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "conversation" | "conversations" => Ok(RecordType::Conversation),
            "message" | "messages" => Ok(RecordType::Message),
            _ => Err(EtlError::UnsupportedRecordType(s.to_string())),
        }
    }
}

impl std::fmt::Display for RecordType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One page of the source API's cursor pagination
#[derive(Debug, Clone, Deserialize)]
pub struct Page {
    pub data: Vec<RawRecord>,

    /// Empty or null once the last page has been served
    #[serde(default)]
    pub next_page_uri: Option<String>,
}

impl Page {
    pub fn next_uri(&self) -> Option<&str> {
        self.next_page_uri
            .as_deref()
            .map(str::trim)
            .filter(|uri| !uri.is_empty())
    }
}

/// A row ready for the warehouse, one shape per record type
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum NormalizedRecord {
    Conversation(NormalizedConversation),
    Message(NormalizedMessage),
}

impl NormalizedRecord {
    pub fn record_type(&self) -> RecordType {
        match self {
            NormalizedRecord::Conversation(_) => RecordType::Conversation,
            NormalizedRecord::Message(_) => RecordType::Message,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_type_from_str() {
        assert_eq!("conversation".parse::<RecordType>().unwrap(), RecordType::Conversation);
        assert_eq!("Messages".parse::<RecordType>().unwrap(), RecordType::Message);
        assert!(matches!(
            "Incorrect API type input".parse::<RecordType>(),
            Err(EtlError::UnsupportedRecordType(_))
        ));
    }

    #[test]
    fn test_record_type_names() {
        assert_eq!(RecordType::Conversation.collection(), "conversations");
        assert_eq!(RecordType::Message.to_string(), "message");
    }

    #[test]
    fn test_page_next_uri() {
        let page: Page = serde_json::from_value(json!({
            "data": [{"_id": "a"}],
            "next_page_uri": "/data_api/v1/messages?cursor=abc"
        }))
        .unwrap();
        assert_eq!(page.next_uri(), Some("/data_api/v1/messages?cursor=abc"));

        let last: Page = serde_json::from_value(json!({"data": [], "next_page_uri": ""})).unwrap();
        assert_eq!(last.next_uri(), None);

        let missing: Page = serde_json::from_value(json!({"data": []})).unwrap();
        assert_eq!(missing.next_uri(), None);
    }
}
