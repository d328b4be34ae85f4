//! Typed message streams

use claudecode_protocol::{Message, RawMessage, parse_message};
use futures::Stream;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::instrument::{WithDispatch, WithSubscriber};
use tracing::warn;

/// Messages of a streaming query, ending after the result message
///
/// Consume it with [`next_message`](Self::next_message) or as a
/// [`futures::Stream`].
#[derive(Debug)]
pub struct MessageStream {
    messages: mpsc::Receiver<Message>,
}

impl MessageStream {
    pub(crate) fn new(messages: mpsc::Receiver<Message>) -> Self {
        Self { messages }
    }

    /// Next message, or `None` once the stream has ended
    pub async fn next_message(&mut self) -> Option<Message> {
        self.messages.recv().await
    }
}

impl Stream for MessageStream {
    type Item = Message;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Message>> {
        self.messages.poll_recv(cx)
    }
}

/// Run `fut` under `logger`, or the caller's dispatcher
pub(crate) fn dispatched<F: Future>(
    logger: Option<&tracing::Dispatch>,
    fut: F,
) -> WithDispatch<F> {
    match logger {
        Some(dispatch) => fut.with_subscriber(dispatch.clone()),
        None => fut.with_current_subscriber(),
    }
}

/// Parse a frame, logging and skipping frames that are not messages
pub(crate) fn parse_frame(frame: RawMessage) -> Option<Message> {
    match parse_message(frame) {
        Ok(message) => Some(message),
        Err(e) => {
            warn!(error = %e, "Failed to parse message");
            None
        }
    }
}

/// Parse frames into `messages` until the result message
pub(crate) async fn forward_until_result(
    mut frames: mpsc::Receiver<RawMessage>,
    messages: mpsc::Sender<Message>,
    cancel: &CancellationToken,
) {
    loop {
        let frame = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            frame = frames.recv() => frame,
        };
        let Some(frame) = frame else {
            return;
        };
        let Some(message) = parse_frame(frame) else {
            continue;
        };

        let done = message.is_result();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            sent = messages.send(message) => {
                if sent.is_err() {
                    return;
                }
            }
        }
        if done {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use serde_json::json;

    fn frame(value: serde_json::Value) -> RawMessage {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_parse_frame_skips_unknown_types() {
        assert!(parse_frame(frame(json!({"type": "mystery"}))).is_none());
        assert!(parse_frame(frame(json!({"no_type": true}))).is_none());

        let message = parse_frame(frame(json!({"type": "result", "session_id": "s"}))).unwrap();
        assert!(message.is_result());
    }

    #[tokio::test]
    async fn test_forward_stops_after_result() {
        let (frames_tx, frames_rx) = mpsc::channel(8);
        for value in [
            json!({"type": "system", "subtype": "init"}),
            json!({"type": "mystery"}),
            json!({"type": "result", "session_id": "s"}),
            json!({"type": "system", "subtype": "late"}),
        ] {
            frames_tx.send(frame(value)).await.unwrap();
        }

        let (tx, rx) = mpsc::channel(8);
        forward_until_result(frames_rx, tx, &CancellationToken::new()).await;

        let types: Vec<_> = MessageStream::new(rx)
            .map(|m| m.message_type())
            .collect()
            .await;
        assert_eq!(types, vec!["system", "result"]);
    }

    #[tokio::test]
    async fn test_forward_stops_on_cancel() {
        let (_frames_tx, frames_rx) = mpsc::channel::<RawMessage>(1);
        let (tx, mut rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        cancel.cancel();

        forward_until_result(frames_rx, tx, &cancel).await;
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_forward_stops_when_consumer_is_gone() {
        let (frames_tx, frames_rx) = mpsc::channel(1);
        let (tx, rx) = mpsc::channel(1);
        drop(rx);

        frames_tx
            .send(frame(json!({"type": "system", "subtype": "init"})))
            .await
            .unwrap();
        // Returns although the frame source stays open
        forward_until_result(frames_rx, tx, &CancellationToken::new()).await;
        assert!(frames_tx.is_closed());
    }
}
