//! Typed messages and the frame parser
//!
//! The CLI puts a `type` tag at the top level of every frame. User and
//! assistant frames nest the conversational payload under `message`, while
//! system and result frames are flat.
//!
//! # Message Types
//!
//! - `user`: echoed user input and tool results
//! - `assistant`: model output as content blocks
//! - `system`: CLI lifecycle notices (`init`, ...)
//! - `result`: end of a turn, with timing, cost and the session id

use crate::content::ContentBlock;
use crate::error::{ProtocolError, Result};
use crate::frame::{RawMessage, user_frame};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// A user message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserMessage {
    /// Message content
    pub content: Vec<ContentBlock>,

    /// Tool use this message answers, for tool results
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_tool_use_id: Option<String>,
}

impl UserMessage {
    /// A plain text user message
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentBlock::text(text)],
            parent_tool_use_id: None,
        }
    }

    /// Build the streaming input frame for this message
    ///
    /// A single text block goes out as a plain string, which is what the CLI
    /// expects for typed prompts; anything else is sent as a block list.
    pub fn to_frame(&self, session_id: &str) -> RawMessage {
        if let [ContentBlock::Text { text }] = self.content.as_slice() {
            let mut frame = user_frame(text.clone(), session_id);
            if let Some(parent) = &self.parent_tool_use_id {
                frame.insert("parent_tool_use_id".into(), Value::String(parent.clone()));
            }
            return frame;
        }

        let mut frame = user_frame(String::new(), session_id);
        frame.insert(
            "message".into(),
            json!({"role": "user", "content": self.content}),
        );
        if let Some(parent) = &self.parent_tool_use_id {
            frame.insert("parent_tool_use_id".into(), Value::String(parent.clone()));
        }
        frame
    }
}

/// An assistant message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssistantMessage {
    /// Content blocks produced by the model
    pub content: Vec<ContentBlock>,

    /// Model that produced the message, when reported
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Tool use this message belongs to, for subagent output
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_tool_use_id: Option<String>,
}

impl AssistantMessage {
    /// Concatenate all text blocks
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(ContentBlock::as_text)
            .collect::<Vec<_>>()
            .join("")
    }
}

/// A system message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemMessage {
    /// System message subtype (`init`, ...)
    pub subtype: String,

    /// The complete frame
    pub data: Value,
}

/// The result message closing a turn
///
/// Every field defaults, so partial result frames still parse.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResultMessage {
    /// Result subtype (`success`, `error_max_turns`, ...)
    pub subtype: String,

    /// Wall-clock duration of the turn
    pub duration_ms: u64,

    /// Time spent waiting on the API
    pub duration_api_ms: u64,

    /// Whether the turn ended in an error
    pub is_error: bool,

    /// Number of conversation turns
    pub num_turns: u32,

    /// Session the turn belongs to
    pub session_id: String,

    /// Total cost in USD
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_cost_usd: Option<f64>,

    /// Token usage
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Value>,

    /// Final result text
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}

/// A parsed message from the CLI
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// User message
    User(UserMessage),

    /// Assistant message
    Assistant(AssistantMessage),

    /// System message
    System(SystemMessage),

    /// Result message
    Result(ResultMessage),
}

impl Message {
    /// The `type` tag this message was parsed from
    pub fn message_type(&self) -> &'static str {
        match self {
            Self::User(_) => "user",
            Self::Assistant(_) => "assistant",
            Self::System(_) => "system",
            Self::Result(_) => "result",
        }
    }

    /// Check if this is a result message
    pub fn is_result(&self) -> bool {
        matches!(self, Self::Result(_))
    }

    /// Get the result message, if this is one
    pub fn as_result(&self) -> Option<&ResultMessage> {
        match self {
            Self::Result(result) => Some(result),
            _ => None,
        }
    }
}

/// Parse a raw frame into a typed [`Message`]
///
/// # Errors
///
/// Returns `ProtocolError` if:
/// - The frame has no string `type` field
/// - The type is unknown
/// - An assistant frame has no `message.content` array
/// - A system frame has no `subtype`
/// - A result frame has fields of the wrong JSON type
pub fn parse_message(frame: RawMessage) -> Result<Message> {
    let message_type = frame
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| ProtocolError::MissingField("type".into()))?
        .to_string();

    match message_type.as_str() {
        "user" => parse_user_message(&frame),
        "assistant" => parse_assistant_message(&frame),
        "system" => parse_system_message(frame),
        "result" => parse_result_message(frame),
        _ => Err(ProtocolError::UnknownType(message_type)),
    }
}

/// Parse a JSON string into a typed [`Message`]
///
/// # Errors
///
/// Returns `ProtocolError` if the string is not a JSON object or the frame
/// cannot be parsed.
pub fn parse_message_str(s: &str) -> Result<Message> {
    match serde_json::from_str::<Value>(s)? {
        Value::Object(frame) => parse_message(frame),
        other => Err(ProtocolError::InvalidFormat(format!(
            "Expected object, got {}",
            other
        ))),
    }
}

/// Parse a user message
///
/// Accepts both the nested CLI shape (`message.content`) and a flat
/// top-level `content`.
fn parse_user_message(frame: &RawMessage) -> Result<Message> {
    let content = frame
        .get("message")
        .and_then(|message| message.get("content"))
        .or_else(|| frame.get("content"))
        .ok_or_else(|| ProtocolError::MissingField("message.content".into()))?;

    Ok(Message::User(UserMessage {
        content: parse_content_blocks(content)?,
        parent_tool_use_id: string_field(frame, "parent_tool_use_id"),
    }))
}

/// Parse an assistant message
fn parse_assistant_message(frame: &RawMessage) -> Result<Message> {
    let message = frame
        .get("message")
        .ok_or_else(|| ProtocolError::MissingField("message".into()))?;

    let content = message
        .get("content")
        .filter(|content| content.is_array())
        .ok_or_else(|| ProtocolError::InvalidFormat("invalid assistant message structure".into()))?;

    let model = message
        .get("model")
        .and_then(Value::as_str)
        .map(String::from);

    Ok(Message::Assistant(AssistantMessage {
        content: parse_content_blocks(content)?,
        model,
        parent_tool_use_id: string_field(frame, "parent_tool_use_id"),
    }))
}

/// Parse a system message
fn parse_system_message(frame: RawMessage) -> Result<Message> {
    let subtype = string_field(&frame, "subtype")
        .ok_or_else(|| ProtocolError::MissingField("subtype".into()))?;

    Ok(Message::System(SystemMessage {
        subtype,
        data: Value::Object(frame),
    }))
}

/// Parse a result message
fn parse_result_message(frame: RawMessage) -> Result<Message> {
    let result: ResultMessage = serde_json::from_value(Value::Object(frame))?;
    Ok(Message::Result(result))
}

/// Parse content blocks from JSON
///
/// String content becomes a single text block. Blocks of unknown type or
/// malformed blocks are skipped.
fn parse_content_blocks(content: &Value) -> Result<Vec<ContentBlock>> {
    if let Some(text) = content.as_str() {
        return Ok(vec![ContentBlock::text(text)]);
    }

    let blocks = content
        .as_array()
        .ok_or_else(|| ProtocolError::InvalidFormat("content must be string or array".into()))?;

    Ok(blocks
        .iter()
        .filter_map(|block| serde_json::from_value::<ContentBlock>(block.clone()).ok())
        .collect())
}

fn string_field(frame: &RawMessage, key: &str) -> Option<String> {
    frame.get(key).and_then(Value::as_str).map(String::from)
}
