//! Error types for protocol operations
//!
//! Returned when a raw frame cannot be turned into a typed [`Message`](crate::Message).

/// Result type for protocol operations
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors that can occur while parsing protocol frames
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Frame has the wrong shape (not an object, wrong field types)
    #[error("Invalid message format: {0}")]
    InvalidFormat(String),

    /// Missing required field
    #[error("Missing required field: {0}")]
    MissingField(String),

    /// Frame `type` is not one the parser understands
    #[error("Unknown message type: {0}")]
    UnknownType(String),

    /// Content block is malformed
    #[error("Invalid content block: {0}")]
    InvalidContentBlock(String),
}
