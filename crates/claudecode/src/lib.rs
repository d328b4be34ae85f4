//! Rust SDK for the Claude Code CLI
//!
//! Drives the `claude` executable as a subprocess:
//!
//! - [`Client::query`] sends one prompt and collects every message up to the result
//! - [`Client::query_stream`] streams those messages as they arrive
//! - [`Client::new_session`] opens an interactive, multi-turn [`Session`]
//!
//! # Example
//!
//! ```no_run
//! use claudecode::{Client, Options};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> claudecode::Result<()> {
//! let client = Client::new(Options::new().with_max_turns(1))?;
//! let messages = client
//!     .query("What is 2 + 2?", &CancellationToken::new())
//!     .await?;
//!
//! for message in &messages {
//!     if let claudecode::Message::Assistant(assistant) = message {
//!         println!("{}", assistant.text());
//!     }
//! }
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod client;
pub mod error;
pub mod session;
pub mod stream;

pub use client::{Client, DEFAULT_SESSION_ID, QueryOptions};
pub use error::{Error, Result};
pub use session::{Session, SessionOptions};
pub use stream::MessageStream;

// Re-export the building blocks
pub use claudecode_protocol::{
    AssistantMessage, ContentBlock, McpServer, Message, PermissionMode, ResultMessage,
    SystemMessage, UserMessage,
};
pub use claudecode_transport::{Options, OptionsError, TransportError};
pub use tokio_util::sync::CancellationToken;
