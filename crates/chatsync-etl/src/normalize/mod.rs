//! Record normalization
//!
//! Turns raw API records into flat rows for the warehouse. Field mapping is pure;
//! the only side effect is the redaction call made for customer-authored text.

pub mod conversation;
pub mod fields;
pub mod message;

pub use conversation::{
    parse_conversation, ConversationMetavariables, ConversationVariables, NormalizedConversation,
};
pub use fields::{check_int, check_order_num};
pub use message::{
    parse_message, ListSelectionData, MessagePayload, NormalizedMessage, PayloadParser,
    PresenceData, QuickRepliesData, SurfaceableListSelectionData, TextData, TriggerData,
};

use crate::error::Result;
use crate::models::{NormalizedRecord, RawRecord, RecordType};
use crate::redaction::Redactor;
use tracing::info;

/// Normalize a batch of raw records of one type, preserving order.
pub async fn normalize(
    records: &[RawRecord],
    record_type: RecordType,
    redactor: &Redactor,
) -> Result<Vec<NormalizedRecord>> {
    info!(record_type = %record_type, records = records.len(), "Begin parsing records");

    let mut rows = Vec::with_capacity(records.len());
    for raw in records {
        let row = match record_type {
            RecordType::Conversation => {
                NormalizedRecord::Conversation(parse_conversation(raw, redactor).await?)
            },
            RecordType::Message => NormalizedRecord::Message(parse_message(raw, redactor).await?),
        };
        rows.push(row);
    }

    info!(record_type = %record_type, rows = rows.len(), "Done parsing records");
    Ok(rows)
}

/// [`normalize`] for a record type given by name, e.g. from a trigger payload.
pub async fn normalize_raw(
    records: &[RawRecord],
    record_type: &str,
    redactor: &Redactor,
) -> Result<Vec<NormalizedRecord>> {
    let record_type: RecordType = record_type.parse()?;
    normalize(records, record_type, redactor).await
}
