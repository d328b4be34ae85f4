//! Transport error types

use crate::subprocess::ProcessExit;
use std::path::PathBuf;

/// Result type for transport operations
pub type Result<T> = std::result::Result<T, TransportError>;

/// Broad class of a [`TransportError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The CLI executable could not be located
    Discovery,
    /// The process could not be started or its pipes created
    Connection,
    /// A frame could not be encoded
    Protocol,
    /// The operation is not valid in the transport's current state or mode
    State,
    /// The process or a pipe failed while running
    Runtime,
}

/// Errors that can occur in transport operations
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The CLI could not be found; the message carries install instructions
    #[error("{0}")]
    NotInstalled(String),

    /// An explicit CLI path was configured but does not exist
    #[error("claude CLI not found at specified path: {}", .0.display())]
    CliPathNotFound(PathBuf),

    /// The process could not be started
    #[error("Connection error: {0}")]
    Connection(String),

    /// The configured working directory does not exist
    #[error("Connection error: working directory does not exist: {}", .0.display())]
    WorkingDirectory(PathBuf),

    /// Operation requires a connected transport
    #[error("Not connected")]
    NotConnected,

    /// The transport was closed and cannot be reused
    #[error("Transport closed")]
    Closed,

    /// The input pipe has already been closed
    #[error("stdin closed - stream may have ended")]
    InputClosed,

    /// Operation is only available in streaming mode
    #[error("{operation} requires streaming mode")]
    StreamingRequired {
        /// The rejected operation
        operation: &'static str,
    },

    /// The output channel was already handed out
    #[error("Output already being received")]
    AlreadyReceiving,

    /// A frame could not be encoded
    #[error("Failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),

    /// The process exited abnormally
    #[error("Claude Code failed with {exit}{}", stderr_suffix(.stderr))]
    Process {
        /// How the process ended
        exit: ProcessExit,
        /// Captured stderr tail, when available
        stderr: Option<String>,
    },

    /// The operation was cancelled
    #[error("Operation cancelled")]
    Cancelled,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn stderr_suffix(stderr: &Option<String>) -> String {
    match stderr {
        Some(stderr) if !stderr.is_empty() => format!("\nError details:\n{stderr}"),
        _ => String::new(),
    }
}

impl TransportError {
    /// Classify the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotInstalled(_) | Self::CliPathNotFound(_) => ErrorKind::Discovery,
            Self::Connection(_) | Self::WorkingDirectory(_) => ErrorKind::Connection,
            Self::Encode(_) => ErrorKind::Protocol,
            Self::NotConnected
            | Self::Closed
            | Self::InputClosed
            | Self::StreamingRequired { .. }
            | Self::AlreadyReceiving
            | Self::Cancelled => ErrorKind::State,
            Self::Process { .. } | Self::Io(_) => ErrorKind::Runtime,
        }
    }

    /// Check whether the CLI is missing
    pub fn is_not_installed(&self) -> bool {
        self.kind() == ErrorKind::Discovery
    }
}
