//! Message records
//!
//! A message carries a `message_data` object whose `_type` decides which payload
//! columns are filled. [`MessagePayload`] is the single dispatch on that discriminator;
//! each payload type can also be parsed on its own through [`PayloadParser::parse`],
//! which yields `None` when the discriminator belongs to another type.

use super::fields::{ascii_only, field, render, strip_offset};
use crate::error::{EtlError, Result};
use crate::models::RecordType;
use crate::redaction::Redactor;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

const TEXT: &str = "text";
const QUICK_REPLIES: &str = "quick_replies";
const TRIGGER: &str = "trigger";
const PRESENCE: &str = "presence";
const LIST_SELECTION: &str = "list_selection";
const SURFACEABLE_LIST_SELECTION: &str = "surfaceable_list_selection";

/// Senders whose text is authored by the bot and never redacted
const BOT_SENDERS: [&str; 2] = ["bot", "ada"];

/// The `_type` discriminator of a `message_data` object, if any
pub fn message_type(data: &Map<String, Value>) -> Option<&str> {
    data.get("_type").and_then(Value::as_str)
}

/// A payload shape selected by `message_data._type`
pub trait PayloadParser: Sized {
    const TYPE: &'static str;

    /// Build the payload, assuming the discriminator already matched.
    fn read(data: &Map<String, Value>) -> Result<Self>;

    /// `Some` payload when `data` is of this type, `None` otherwise.
    fn parse(data: &Map<String, Value>) -> Result<Option<Self>> {
        if message_type(data) == Some(Self::TYPE) {
            Self::read(data).map(Some)
        } else {
            Ok(None)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextData {
    pub body: String,
    pub has_variables: Value,
    pub reviewable_message: Value,
    pub has_forced_quick_replies: Value,
}

impl PayloadParser for TextData {
    const TYPE: &'static str = TEXT;

    fn read(data: &Map<String, Value>) -> Result<Self> {
        let body = data.get("body").and_then(Value::as_str).ok_or_else(|| {
            EtlError::malformed(RecordType::Message, "text message without a string body")
        })?;

        Ok(Self {
            body: ascii_only(body),
            has_variables: field(data, "has_variables"),
            reviewable_message: field(data, "reviewable_message"),
            has_forced_quick_replies: field(data, "has_forced_quick_replies"),
        })
    }
}

/// Button prompt; the options stay one opaque JSON string
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuickRepliesData {
    pub is_forced: Value,
    pub has_variables: Value,
    pub quick_replies: String,
    pub reviewable_message: Value,
}

impl PayloadParser for QuickRepliesData {
    const TYPE: &'static str = QUICK_REPLIES;

    fn read(data: &Map<String, Value>) -> Result<Self> {
        Ok(Self {
            is_forced: field(data, "is_forced"),
            has_variables: field(data, "has_variables"),
            quick_replies: render(&field(data, "quick_replies")),
            reviewable_message: field(data, "reviewable_message"),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TriggerData {
    pub body: Value,
    pub button_type: Value,
    pub external_chat_id: Value,
    pub reviewable_message: Value,
}

impl PayloadParser for TriggerData {
    const TYPE: &'static str = TRIGGER;

    fn read(data: &Map<String, Value>) -> Result<Self> {
        Ok(Self {
            body: field(data, "body"),
            button_type: field(data, "button_type"),
            external_chat_id: field(data, "external_chat_id"),
            reviewable_message: field(data, "reviewable_message"),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PresenceData {
    pub body: Value,
    pub event: Value,
    pub has_variables: Value,
    pub reviewable_message: Value,
}

impl PayloadParser for PresenceData {
    const TYPE: &'static str = PRESENCE;

    fn read(data: &Map<String, Value>) -> Result<Self> {
        Ok(Self {
            body: field(data, "body"),
            event: field(data, "event"),
            has_variables: field(data, "has_variables"),
            reviewable_message: field(data, "reviewable_message"),
        })
    }
}

/// List pick; the nested `data` blob stays one opaque JSON string
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListSelectionData {
    pub body: Value,
    pub by: Value,
    pub created: Value,
    pub data: String,
    pub external_chat_id: Value,
    pub platform: Value,
    pub reviewable_message: Value,
    pub temp_message_uuid: Value,
    pub to: Value,
}

impl PayloadParser for ListSelectionData {
    const TYPE: &'static str = LIST_SELECTION;

    fn read(data: &Map<String, Value>) -> Result<Self> {
        Ok(Self {
            body: field(data, "body"),
            by: field(data, "by"),
            created: field(data, "created"),
            data: render(&field(data, "data")),
            external_chat_id: field(data, "external_chat_id"),
            platform: field(data, "platform"),
            reviewable_message: field(data, "reviewable_message"),
            temp_message_uuid: field(data, "temp_message_uuid"),
            to: field(data, "to"),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SurfaceableListSelectionData {
    pub has_variables: Value,
    pub is_expired: Value,
    pub locked: Value,
    pub multiple: Value,
    pub prompt: Value,
    pub reviewable_message: Value,
    pub selectables: String,
}

impl PayloadParser for SurfaceableListSelectionData {
    const TYPE: &'static str = SURFACEABLE_LIST_SELECTION;

    fn read(data: &Map<String, Value>) -> Result<Self> {
        Ok(Self {
            has_variables: field(data, "has_variables"),
            is_expired: field(data, "is_expired"),
            locked: field(data, "locked"),
            multiple: field(data, "multiple"),
            prompt: field(data, "prompt"),
            reviewable_message: field(data, "reviewable_message"),
            selectables: render(&field(data, "selectables")),
        })
    }
}

/// The type-specific part of a message
#[derive(Debug, Clone, PartialEq)]
pub enum MessagePayload {
    Text(TextData),
    QuickReplies(QuickRepliesData),
    Trigger(TriggerData),
    Presence(PresenceData),
    ListSelection(ListSelectionData),
    SurfaceableListSelection(SurfaceableListSelectionData),
    /// Any other `_type`, or none at all. Stored with every payload column null.
    Unrecognized,
}

impl MessagePayload {
    pub fn from_message_data(data: &Map<String, Value>) -> Result<Self> {
        let payload = match message_type(data) {
            Some(TEXT) => Self::Text(TextData::read(data)?),
            Some(QUICK_REPLIES) => Self::QuickReplies(QuickRepliesData::read(data)?),
            Some(TRIGGER) => Self::Trigger(TriggerData::read(data)?),
            Some(PRESENCE) => Self::Presence(PresenceData::read(data)?),
            Some(LIST_SELECTION) => Self::ListSelection(ListSelectionData::read(data)?),
            Some(SURFACEABLE_LIST_SELECTION) => {
                Self::SurfaceableListSelection(SurfaceableListSelectionData::read(data)?)
            },
            _ => Self::Unrecognized,
        };
        Ok(payload)
    }

    /// Redact customer-authored text bodies.
    pub async fn redact(self, sender: &Value, redactor: &Redactor) -> Result<Self> {
        match self {
            Self::Text(mut text) if !is_bot_sender(sender) => {
                text.body = redactor
                    .redact(Some(&text.body))
                    .await?
                    .unwrap_or_default();
                Ok(Self::Text(text))
            },
            other => Ok(other),
        }
    }
}

fn is_bot_sender(sender: &Value) -> bool {
    sender
        .as_str()
        .map(|s| BOT_SENDERS.contains(&s))
        .unwrap_or(false)
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    #[serde(rename = "_id")]
    id: Value,
    date_created: String,
    #[serde(default)]
    conversation_id: Value,
    message_data: Map<String, Value>,
    #[serde(default)]
    sender: Value,
    #[serde(default)]
    recipient: Value,
    #[serde(default)]
    review: Value,
    #[serde(default)]
    answer_title: Value,
}

/// A message row. At most one of the `*_data` columns is populated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedMessage {
    pub message_id: Value,
    pub date_created: String,
    pub conversation_id: Value,
    pub message_type: Value,
    pub text_data: Option<TextData>,
    pub quick_replies_data: Option<QuickRepliesData>,
    pub trigger_data: Option<TriggerData>,
    pub presence_data: Option<PresenceData>,
    pub list_selection_data: Option<ListSelectionData>,
    pub surfaceable_list_selection_data: Option<SurfaceableListSelectionData>,
    pub sender: Value,
    pub recipient: Value,
    pub review: Value,
    pub answer_title: Value,
    /// The raw record serialized as JSON, kept for auditing
    pub message_obj: String,
}

/// Flatten one raw message.
pub async fn parse_message(raw: &Value, redactor: &Redactor) -> Result<NormalizedMessage> {
    let message = RawMessage::deserialize(raw)
        .map_err(|e| EtlError::malformed(RecordType::Message, e.to_string()))?;

    let payload = MessagePayload::from_message_data(&message.message_data)?
        .redact(&message.sender, redactor)
        .await?;

    let mut row = NormalizedMessage {
        message_id: message.id,
        date_created: strip_offset(&message.date_created),
        conversation_id: message.conversation_id,
        message_type: field(&message.message_data, "_type"),
        text_data: None,
        quick_replies_data: None,
        trigger_data: None,
        presence_data: None,
        list_selection_data: None,
        surfaceable_list_selection_data: None,
        sender: message.sender,
        recipient: message.recipient,
        review: message.review,
        answer_title: message.answer_title,
        message_obj: serde_json::to_string(raw)?,
    };

    match payload {
        MessagePayload::Text(data) => row.text_data = Some(data),
        MessagePayload::QuickReplies(data) => row.quick_replies_data = Some(data),
        MessagePayload::Trigger(data) => row.trigger_data = Some(data),
        MessagePayload::Presence(data) => row.presence_data = Some(data),
        MessagePayload::ListSelection(data) => row.list_selection_data = Some(data),
        MessagePayload::SurfaceableListSelection(data) => {
            row.surfaceable_list_selection_data = Some(data)
        },
        MessagePayload::Unrecognized => {},
    }

    Ok(row)
}
