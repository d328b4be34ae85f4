//! Transport trait
//!
//! The contract a CLI transport offers to the client layer. Every blocking
//! operation takes a [`CancellationToken`].

use crate::error::Result;
use async_trait::async_trait;
use claudecode_protocol::RawMessage;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Bidirectional frame transport to a Claude Code CLI
///
/// Lifecycle: unconnected → connected → closed. A closed transport cannot be
/// reconnected.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Start the CLI
    ///
    /// `cancel` governs the background input task for the lifetime of the
    /// connection. Connecting twice is a no-op.
    async fn connect(&self, cancel: &CancellationToken) -> Result<()>;

    /// Write frames to the CLI in order (streaming mode only)
    async fn send(&self, messages: Vec<RawMessage>, cancel: &CancellationToken) -> Result<()>;

    /// Take the output channel
    ///
    /// The channel closes when the CLI exits, when `cancel` fires, or when
    /// the transport is closed. It can be taken once.
    async fn receive(&self, cancel: &CancellationToken) -> Result<mpsc::Receiver<RawMessage>>;

    /// Ask the CLI to interrupt the current turn (streaming mode only)
    async fn interrupt(&self, cancel: &CancellationToken) -> Result<()>;

    /// Check if the transport is connected and the CLI still running
    fn is_connected(&self) -> bool;

    /// Shut the CLI down and release its resources; idempotent
    async fn close(&self) -> Result<()>;
}
