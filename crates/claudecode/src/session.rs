//! Interactive sessions

use crate::client::DEFAULT_SESSION_ID;
use crate::error::{Error, Result};
use crate::stream::{dispatched, parse_frame};
use claudecode_protocol::{Message, RawMessage, user_frame};
use claudecode_transport::{SubprocessTransport, Transport, TransportError};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Options for [`Client::new_session`](crate::Client::new_session)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionOptions {
    /// Prompt sent as soon as the session starts
    pub initial_prompt: Option<String>,
}

impl SessionOptions {
    /// Send `prompt` when the session starts
    pub fn with_initial_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.initial_prompt = Some(prompt.into());
        self
    }
}

/// A multi-turn conversation with one CLI process
///
/// All operations use the cancellation token the session was created with.
#[derive(Debug)]
pub struct Session {
    transport: SubprocessTransport,
    frames: tokio::sync::Mutex<mpsc::Receiver<RawMessage>>,
    session_id: Mutex<String>,
    closed: AtomicBool,
    cancel: CancellationToken,
    logger: Option<tracing::Dispatch>,
}

impl Session {
    pub(crate) fn new(
        transport: SubprocessTransport,
        frames: mpsc::Receiver<RawMessage>,
        cancel: CancellationToken,
        logger: Option<tracing::Dispatch>,
    ) -> Self {
        Self {
            transport,
            frames: tokio::sync::Mutex::new(frames),
            session_id: Mutex::new(DEFAULT_SESSION_ID.to_string()),
            closed: AtomicBool::new(false),
            cancel,
            logger,
        }
    }

    /// Session id reported by the last result message, `"default"` before that
    pub fn session_id(&self) -> String {
        self.session_id
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Check whether the CLI process is still running
    pub fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::SeqCst) && self.transport.is_connected()
    }

    /// Send a text prompt
    pub async fn send(&self, text: impl Into<String>) -> Result<()> {
        self.ensure_open()?;
        let frame = user_frame(text, self.session_id());
        self.send_frame(frame).await
    }

    /// Send a pre-built message; only user messages can be sent
    pub async fn send_message(&self, message: &Message) -> Result<()> {
        self.ensure_open()?;
        let Message::User(user) = message else {
            return Err(Error::InvalidMessage(format!(
                "only user messages can be sent, got {}",
                message.message_type()
            )));
        };
        let frame = user.to_frame(&self.session_id());
        self.send_frame(frame).await
    }

    /// Next message from the CLI, or `None` once output has ended
    ///
    /// Frames that do not parse are logged and skipped.
    pub async fn next_message(&self) -> Option<Message> {
        dispatched(self.logger.as_ref(), self.next_inner()).await
    }

    async fn next_inner(&self) -> Option<Message> {
        let mut frames = self.frames.lock().await;
        loop {
            let frame = frames.recv().await?;
            let Some(message) = parse_frame(frame) else {
                continue;
            };
            if let Message::Result(result) = &message
                && !result.session_id.is_empty()
            {
                *self
                    .session_id
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner()) = result.session_id.clone();
            }
            return Some(message);
        }
    }

    /// Collect messages up to and including the next result message
    ///
    /// Returns what arrived if output ends first; fails with
    /// [`TransportError::Cancelled`] if the session was cancelled.
    pub async fn receive_one(&self) -> Result<Vec<Message>> {
        let mut messages = Vec::new();
        while let Some(message) = self.next_message().await {
            let done = message.is_result();
            messages.push(message);
            if done {
                return Ok(messages);
            }
        }

        if self.cancel.is_cancelled() {
            return Err(TransportError::Cancelled.into());
        }
        Ok(messages)
    }

    /// Ask the CLI to interrupt the current turn
    pub async fn interrupt(&self) -> Result<()> {
        self.ensure_open()?;
        dispatched(
            self.logger.as_ref(),
            self.transport.interrupt(&self.cancel),
        )
        .await?;
        Ok(())
    }

    /// End the session and shut the CLI down
    ///
    /// Idempotent; later sends fail with [`Error::StreamClosed`].
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.transport.close().await?;
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(Error::StreamClosed)
        } else {
            Ok(())
        }
    }

    async fn send_frame(&self, frame: RawMessage) -> Result<()> {
        dispatched(
            self.logger.as_ref(),
            self.transport.send(vec![frame], &self.cancel),
        )
        .await?;
        Ok(())
    }
}
