//! Conversation records

use super::fields::{check_int, check_order_num, field, render, strip_offset};
use crate::error::{EtlError, Result};
use crate::models::RecordType;
use crate::redaction::Redactor;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Deserialize)]
struct RawConversation {
    #[serde(rename = "_id")]
    id: Value,
    date_updated: String,
    date_created: String,
    #[serde(default)]
    chatter_id: Value,
    #[serde(default)]
    platform: Value,
    #[serde(default)]
    is_engaged: Value,
    #[serde(default)]
    is_escalated: Value,
    #[serde(default)]
    csat: Value,
    variables: Map<String, Value>,
    metavariables: Map<String, Value>,
}

/// A conversation row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedConversation {
    pub conversation_id: Value,
    pub date_updated: String,
    pub date_created: String,
    pub chatter_id: Value,
    pub platform: Value,
    pub is_engaged: Value,
    pub is_escalated: Value,
    pub csat: String,
    pub variables: ConversationVariables,
    pub metavariables: ConversationMetavariables,
    /// The raw record serialized as JSON, kept for auditing
    pub conversation_obj: String,
}

/// Bot variables captured during the conversation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversationVariables {
    pub domain_name: Value,
    pub lob: Value,
    pub order_number: i64,
}

impl ConversationVariables {
    pub fn parse(variables: &Map<String, Value>) -> Self {
        Self {
            domain_name: field(variables, "domain_name"),
            lob: field(variables, "lob"),
            order_number: check_order_num(&field(variables, "order number")),
        }
    }
}

/// Client metadata captured by the chat widget
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversationMetavariables {
    pub browser: Value,
    pub browser_version: Value,
    pub chattertoken: Value,
    pub created: i64,
    pub device: Value,
    pub embed: i64,
    pub followupresponseid: Value,
    pub initialurl: Value,
    pub introshown: Value,
    pub language: Value,
    pub last_answer_id: Value,
    /// Free text typed by the customer, redacted
    pub last_question_asked: Option<String>,
    pub user_agent: Value,
}

impl ConversationMetavariables {
    pub async fn parse(meta: &Map<String, Value>, redactor: &Redactor) -> Result<Self> {
        let last_question = match meta.get("last_question_asked") {
            None | Some(Value::Null) => None,
            Some(value) => Some(render(value)),
        };

        Ok(Self {
            browser: field(meta, "browser"),
            browser_version: field(meta, "browser_version"),
            chattertoken: field(meta, "chattertoken"),
            created: check_int(&field(meta, "created")),
            device: field(meta, "device"),
            embed: check_int(&field(meta, "embed")),
            followupresponseid: field(meta, "followupresponseid"),
            initialurl: field(meta, "initialurl"),
            introshown: field(meta, "introshown"),
            language: field(meta, "language"),
            last_answer_id: field(meta, "last_answer_id"),
            last_question_asked: redactor.redact(last_question.as_deref()).await?,
            user_agent: field(meta, "user_agent"),
        })
    }
}

/// Flatten one raw conversation.
pub async fn parse_conversation(raw: &Value, redactor: &Redactor) -> Result<NormalizedConversation> {
    let conversation = RawConversation::deserialize(raw)
        .map_err(|e| EtlError::malformed(RecordType::Conversation, e.to_string()))?;

    Ok(NormalizedConversation {
        conversation_id: conversation.id,
        date_updated: strip_offset(&conversation.date_updated),
        date_created: strip_offset(&conversation.date_created),
        chatter_id: conversation.chatter_id,
        platform: conversation.platform,
        is_engaged: conversation.is_engaged,
        is_escalated: conversation.is_escalated,
        csat: render(&conversation.csat),
        variables: ConversationVariables::parse(&conversation.variables),
        metavariables: ConversationMetavariables::parse(&conversation.metavariables, redactor)
            .await?,
        conversation_obj: serde_json::to_string(raw)?,
    })
}
