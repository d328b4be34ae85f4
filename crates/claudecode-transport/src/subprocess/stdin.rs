//! Shared write end of the child's stdin

use crate::error::{Result, TransportError};
use claudecode_protocol::RawMessage;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

type Writer = Pin<Box<dyn AsyncWrite + Send>>;

/// The input pipe, shared by `send`, `interrupt` and the feeder
///
/// Each frame is written as one JSON line under the lock, so frames from
/// different writers never interleave. The pipe is closed at most once.
pub struct StdinPipe {
    writer: Mutex<Option<Writer>>,
    closed: AtomicBool,
    closed_token: CancellationToken,
}

impl std::fmt::Debug for StdinPipe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StdinPipe")
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl StdinPipe {
    /// Wrap a writer
    pub fn new<W>(writer: W) -> Self
    where
        W: AsyncWrite + Send + 'static,
    {
        Self {
            writer: Mutex::new(Some(Box::pin(writer))),
            closed: AtomicBool::new(false),
            closed_token: CancellationToken::new(),
        }
    }

    /// Check whether the pipe has been closed
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Resolves once the pipe is closed
    pub async fn closed(&self) {
        self.closed_token.cancelled().await
    }

    /// Encode `frame` and write it followed by a newline
    ///
    /// If `cancel` fires first the write is abandoned and the pipe is closed,
    /// since a partially written line cannot be recovered.
    ///
    /// # Errors
    ///
    /// - `InputClosed` if the pipe is closed before or during the write
    /// - `Encode` if the frame cannot be serialized
    /// - `Cancelled` if `cancel` fires first
    /// - `Io` if the write fails
    pub async fn write_frame(&self, frame: &RawMessage, cancel: &CancellationToken) -> Result<()> {
        if self.is_closed() {
            return Err(TransportError::InputClosed);
        }

        let mut line = serde_json::to_vec(frame).map_err(TransportError::Encode)?;
        line.push(b'\n');

        let mut guard = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TransportError::Cancelled),
            _ = self.closed_token.cancelled() => return Err(TransportError::InputClosed),
            guard = self.writer.lock() => guard,
        };
        let Some(writer) = guard.as_mut() else {
            return Err(TransportError::InputClosed);
        };

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(TransportError::Cancelled),
            _ = self.closed_token.cancelled() => Err(TransportError::InputClosed),
            written = write_line(writer, &line) => written.map_err(TransportError::Io),
        };

        if matches!(outcome, Err(TransportError::Cancelled | TransportError::InputClosed)) {
            self.mark_closed();
            if let Some(mut writer) = guard.take() {
                let _ = writer.shutdown().await;
            }
        }
        outcome
    }

    /// Close the pipe
    ///
    /// Returns `true` for the call that actually closed it.
    pub async fn close(&self) -> bool {
        if !self.mark_closed() {
            return false;
        }
        if let Some(mut writer) = self.writer.lock().await.take() {
            let _ = writer.shutdown().await;
        }
        debug!("Closed stdin");
        true
    }

    fn mark_closed(&self) -> bool {
        let first = !self.closed.swap(true, Ordering::AcqRel);
        self.closed_token.cancel();
        first
    }
}

async fn write_line(writer: &mut Writer, line: &[u8]) -> std::io::Result<()> {
    writer.write_all(line).await?;
    writer.flush().await
}
