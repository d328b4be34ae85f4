//! Main client for the SDK

use crate::error::{Error, Result};
use crate::session::{Session, SessionOptions};
use crate::stream::{MessageStream, dispatched, forward_until_result, parse_frame};
use claudecode_protocol::{Message, user_frame};
use claudecode_transport::{Options, SubprocessTransport, Transport, TransportError};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Session id used until the CLI reports one
pub const DEFAULT_SESSION_ID: &str = "default";

/// Options for a streaming query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryOptions {
    /// Session id stamped on the prompt frame
    pub session_id: String,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            session_id: DEFAULT_SESSION_ID.to_string(),
        }
    }
}

impl QueryOptions {
    /// Use a specific session id
    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self
    }
}

/// Client for the Claude Code CLI
///
/// Each query or session launches its own CLI process.
#[derive(Debug, Clone)]
pub struct Client {
    options: Options,
}

impl Client {
    /// Create a client, validating `options`
    pub fn new(options: Options) -> Result<Self> {
        options.validate()?;
        Ok(Self { options })
    }

    /// Launch options shared by every query and session
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Send one prompt and collect messages up to and including the result
    ///
    /// Frames that do not parse are logged and skipped. The transport is
    /// closed before returning, whatever the outcome.
    pub async fn query(
        &self,
        prompt: impl Into<String>,
        cancel: &CancellationToken,
    ) -> Result<Vec<Message>> {
        let prompt = prompt.into();
        dispatched(self.options.logger.as_ref(), self.query_inner(prompt, cancel)).await
    }

    async fn query_inner(&self, prompt: String, cancel: &CancellationToken) -> Result<Vec<Message>> {
        let transport = SubprocessTransport::one_shot(self.options.clone(), prompt);
        transport.connect(cancel).await?;

        let collected = collect_until_result(&transport, cancel).await;
        let closed = transport.close().await;
        let messages = collected?;
        closed?;
        Ok(messages)
    }

    /// Send one prompt over stdin and stream the messages as they arrive
    ///
    /// The stream ends after the result message; the transport is closed in
    /// the background once it does, or once the stream is dropped.
    pub async fn query_stream(
        &self,
        prompt: impl Into<String>,
        options: QueryOptions,
        cancel: &CancellationToken,
    ) -> Result<MessageStream> {
        let (prompt_tx, source) = mpsc::channel(1);
        prompt_tx
            .send(user_frame(prompt, options.session_id))
            .await
            .map_err(|_| Error::StreamClosed)?;
        drop(prompt_tx);

        let transport = SubprocessTransport::streaming(self.options.clone(), source, true);
        let frames = connect_and_receive(&transport, cancel).await?;

        let (messages_tx, messages_rx) = mpsc::channel(1);
        let cancel = cancel.clone();
        tokio::spawn(dispatched(self.options.logger.as_ref(), async move {
            forward_until_result(frames, messages_tx, &cancel).await;
            if let Err(e) = transport.close().await {
                warn!(error = %e, "Failed to close transport");
            }
        }));

        Ok(MessageStream::new(messages_rx))
    }

    /// Start an interactive session
    ///
    /// Input stays open until the session is closed. An initial prompt, if
    /// given, is sent as soon as the CLI starts.
    pub async fn new_session(
        &self,
        options: SessionOptions,
        cancel: &CancellationToken,
    ) -> Result<Session> {
        let (prompt_tx, source) = mpsc::channel(1);
        if let Some(prompt) = options.initial_prompt {
            prompt_tx
                .send(user_frame(prompt, DEFAULT_SESSION_ID))
                .await
                .map_err(|_| Error::StreamClosed)?;
        }
        drop(prompt_tx);

        let transport = SubprocessTransport::streaming(self.options.clone(), source, false);
        let frames = connect_and_receive(&transport, cancel).await?;
        Ok(Session::new(
            transport,
            frames,
            cancel.clone(),
            self.options.logger.clone(),
        ))
    }
}

async fn connect_and_receive(
    transport: &SubprocessTransport,
    cancel: &CancellationToken,
) -> Result<mpsc::Receiver<claudecode_protocol::RawMessage>> {
    transport.connect(cancel).await?;
    match transport.receive(cancel).await {
        Ok(frames) => Ok(frames),
        Err(e) => {
            if let Err(close) = transport.close().await {
                debug!(error = %close, "Failed to close transport after receive error");
            }
            Err(e.into())
        }
    }
}

async fn collect_until_result(
    transport: &SubprocessTransport,
    cancel: &CancellationToken,
) -> Result<Vec<Message>> {
    let mut frames = transport.receive(cancel).await?;
    let mut messages = Vec::new();
    while let Some(frame) = frames.recv().await {
        let Some(message) = parse_frame(frame) else {
            continue;
        };
        let done = message.is_result();
        messages.push(message);
        if done {
            return Ok(messages);
        }
    }

    if cancel.is_cancelled() {
        return Err(TransportError::Cancelled.into());
    }
    Ok(messages)
}
