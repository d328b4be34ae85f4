//! Wire frames and typed messages for the Claude Code CLI
//!
//! The CLI speaks newline-delimited JSON over stdin/stdout when launched with
//! `--output-format stream-json`. This crate holds everything about that
//! protocol that does not touch a process or a pipe.
//!
//! # Type Organization
//!
//! - **Frames**: [`frame`] - Raw JSON frames, input frame builders, request ids
//! - **Messages**: [`message`] - Typed user/assistant/system/result messages and the parser
//! - **Content**: [`content`] - Content blocks carried inside messages
//! - **Options types**: [`types`] - Permission modes and MCP server definitions
//! - **Error types**: [`error`] - Parse and validation errors

#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! # Usage
//!
//! ```
//! use claudecode_protocol::{parse_message, Message};
//! use serde_json::json;
//!
//! let raw = json!({"type": "result", "session_id": "s1", "duration_ms": 120});
//! let message = parse_message(raw.as_object().cloned().unwrap_or_default()).unwrap();
//! assert!(message.is_result());
//! ```

pub mod content;
pub mod error;
pub mod frame;
pub mod message;
pub mod types;

// Re-export commonly used types at crate level
pub use content::ContentBlock;
pub use error::{ProtocolError, Result};
pub use frame::{
    CONTROL_REQUEST, CONTROL_RESPONSE, RawMessage, RequestId, frame_type, interrupt_frame,
    is_result_frame, user_frame,
};
pub use message::{
    AssistantMessage, Message, ResultMessage, SystemMessage, UserMessage, parse_message,
    parse_message_str,
};
pub use types::{McpServer, McpServerType, PermissionMode};
