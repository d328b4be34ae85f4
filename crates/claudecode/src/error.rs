//! Error types for the client

use claudecode_protocol::ProtocolError;
use claudecode_transport::{OptionsError, TransportError};
use thiserror::Error;

/// Result type for client operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by [`Client`](crate::Client) and [`Session`](crate::Session)
#[derive(Debug, Error)]
pub enum Error {
    /// Transport failure (discovery, spawn, I/O, lifecycle)
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Options failed validation
    #[error(transparent)]
    InvalidOptions(#[from] OptionsError),

    /// A frame could not be parsed into a message
    #[error("Failed to parse message: {0}")]
    Parse(#[from] ProtocolError),

    /// The session was closed
    #[error("stream closed")]
    StreamClosed,

    /// The message cannot be sent
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}

impl Error {
    /// Check whether the CLI (or Node.js) is missing
    pub fn is_not_installed(&self) -> bool {
        matches!(self, Error::Transport(e) if e.is_not_installed())
    }
}
