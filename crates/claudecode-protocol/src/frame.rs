//! Raw protocol frames
//!
//! Every frame exchanged with the CLI is one JSON object. Below the parser the
//! frames stay untyped as [`RawMessage`]; the helpers here build the frames the
//! client writes and inspect the `type` tag of frames it reads.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use uuid::Uuid;

/// One protocol frame, in either direction
pub type RawMessage = Map<String, Value>;

/// Frame type acknowledging a control request; never surfaced to callers
pub const CONTROL_RESPONSE: &str = "control_response";

/// Frame type for control requests written to the CLI
pub const CONTROL_REQUEST: &str = "control_request";

/// Get the `type` tag of a frame
pub fn frame_type(frame: &RawMessage) -> Option<&str> {
    frame.get("type").and_then(Value::as_str)
}

/// Check whether a frame is a result frame
pub fn is_result_frame(frame: &RawMessage) -> bool {
    frame_type(frame) == Some("result")
}

/// Unique identifier for a control request
///
/// Format: `req_<uuid>`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(String);

impl RequestId {
    /// Generate a new random request ID
    pub fn new() -> Self {
        Self(format!("req_{}", Uuid::new_v4().simple()))
    }

    /// Create from raw string
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Build the user input frame for streaming mode
///
/// ```
/// let frame = claudecode_protocol::user_frame("hi", "default");
/// assert_eq!(frame["message"]["content"], "hi");
/// ```
pub fn user_frame(content: impl Into<String>, session_id: impl Into<String>) -> RawMessage {
    into_map(json!({
        "type": "user",
        "message": {
            "role": "user",
            "content": content.into(),
        },
        "parent_tool_use_id": null,
        "session_id": session_id.into(),
    }))
}

/// Build the interrupt control request frame
pub fn interrupt_frame(request_id: &RequestId) -> RawMessage {
    into_map(json!({
        "type": CONTROL_REQUEST,
        "request_id": request_id.as_str(),
        "request": {
            "subtype": "interrupt",
        },
    }))
}

fn into_map(value: Value) -> RawMessage {
    match value {
        Value::Object(map) => map,
        _ => RawMessage::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_id_prefix_and_uniqueness() {
        let a = RequestId::new();
        let b = RequestId::new();
        assert!(a.as_str().starts_with("req_"));
        assert_ne!(a, b);
        assert_eq!(RequestId::from_string("req_1").to_string(), "req_1");
    }

    #[test]
    fn test_user_frame_shape() {
        let frame = user_frame("What is 2+2?", "s1");
        assert_eq!(
            Value::Object(frame),
            json!({
                "type": "user",
                "message": {"role": "user", "content": "What is 2+2?"},
                "parent_tool_use_id": null,
                "session_id": "s1"
            })
        );
    }

    #[test]
    fn test_interrupt_frame_shape() {
        let id = RequestId::from_string("req_42");
        let frame = interrupt_frame(&id);
        assert_eq!(frame_type(&frame), Some(CONTROL_REQUEST));
        assert_eq!(frame["request_id"], "req_42");
        assert_eq!(frame["request"]["subtype"], "interrupt");
    }

    #[test]
    fn test_frame_type_helpers() {
        let result = into_map(json!({"type": "result"}));
        let untyped = into_map(json!({"kind": "result"}));
        assert!(is_result_frame(&result));
        assert!(!is_result_frame(&untyped));
        assert_eq!(frame_type(&untyped), None);
    }
}
