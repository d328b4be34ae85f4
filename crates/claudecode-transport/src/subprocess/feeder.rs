//! Input feeder task
//!
//! Drains the prompt source of a streaming transport onto the child's stdin,
//! one JSON line per frame.

use crate::error::TransportError;
use crate::subprocess::stdin::StdinPipe;
use claudecode_protocol::RawMessage;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Why the feeder stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeederExit {
    /// The source ran dry and input auto-closes
    SourceExhausted,
    /// The output decoder finished while the feeder was idle
    SessionEnded,
    /// Stdin was closed by someone else
    InputClosed,
    /// The governing token was cancelled
    Cancelled,
    /// A frame could not be encoded or written
    WriteFailed,
}

/// Everything the feeder task needs
pub(crate) struct Feeder {
    pub source: mpsc::Receiver<RawMessage>,
    pub stdin: Arc<StdinPipe>,
    pub cancel: CancellationToken,
    pub decoder_done: CancellationToken,
    pub close_after_source: bool,
}

impl Feeder {
    /// Run until one of the exit conditions, then close stdin
    pub(crate) async fn run(self) -> FeederExit {
        let stdin = Arc::clone(&self.stdin);
        let exit = self.feed().await;
        stdin.close().await;
        debug!(reason = ?exit, "Input feeder stopped");
        exit
    }

    async fn feed(mut self) -> FeederExit {
        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return FeederExit::Cancelled,
                _ = self.stdin.closed() => return FeederExit::InputClosed,
                next = self.source.recv() => next,
            };

            let Some(frame) = next else {
                break;
            };

            match self.stdin.write_frame(&frame, &self.cancel).await {
                Ok(()) => {}
                Err(TransportError::Cancelled) => return FeederExit::Cancelled,
                Err(TransportError::InputClosed) => return FeederExit::InputClosed,
                Err(e) => {
                    warn!("Failed to write frame to stdin: {}", e);
                    return FeederExit::WriteFailed;
                }
            }
        }

        if self.close_after_source {
            return FeederExit::SourceExhausted;
        }

        // Interactive: keep stdin open for `send` until the session ends
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => FeederExit::Cancelled,
            _ = self.decoder_done.cancelled() => FeederExit::SessionEnded,
            _ = self.stdin.closed() => FeederExit::InputClosed,
        }
    }
}
