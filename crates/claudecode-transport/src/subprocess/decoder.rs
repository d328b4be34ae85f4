//! Output decoder task
//!
//! Reads the child's stdout line by line, reassembles JSON objects that the
//! CLI split across lines, and delivers each object on the output channel.
//! Once stdout ends it reaps the process and reports abnormal exits.

use crate::error::TransportError;
use crate::subprocess::process::{ProcessExit, ProcessHandle, STDERR_TAIL_LINES};
use bytes::BytesMut;
use claudecode_protocol::{CONTROL_RESPONSE, RawMessage, frame_type};
use futures::StreamExt;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio_util::codec::{Decoder, FramedRead, LinesCodec, LinesCodecError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

/// Maximum size of a single output line and of a partially decoded frame: 1 MiB
pub const MAX_BUFFER_SIZE: usize = 1024 * 1024;

/// One line read from stdout
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputLine {
    /// A complete line, without its terminator
    Text(String),
    /// A line longer than the limit; its bytes were dropped
    Oversized,
    /// A line that was not valid UTF-8; its bytes were dropped
    NotUtf8,
}

/// Line codec for stdout that reports oversized and non-UTF-8 lines as
/// items instead of errors, so one bad line never ends the stream
#[derive(Debug)]
pub struct OutputLineCodec(LinesCodec);

impl OutputLineCodec {
    /// Codec with the default [`MAX_BUFFER_SIZE`] limit
    pub fn new() -> Self {
        Self::with_max_length(MAX_BUFFER_SIZE)
    }

    /// Codec with a custom line limit
    pub fn with_max_length(max_length: usize) -> Self {
        Self(LinesCodec::new_with_max_length(max_length))
    }
}

impl Default for OutputLineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for OutputLineCodec {
    type Item = OutputLine;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> std::io::Result<Option<OutputLine>> {
        classify(self.0.decode(src))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> std::io::Result<Option<OutputLine>> {
        classify(self.0.decode_eof(src))
    }
}

fn classify(
    decoded: Result<Option<String>, LinesCodecError>,
) -> std::io::Result<Option<OutputLine>> {
    match decoded {
        Ok(line) => Ok(line.map(OutputLine::Text)),
        Err(LinesCodecError::MaxLineLengthExceeded) => Ok(Some(OutputLine::Oversized)),
        // LinesCodec only fails with InvalidData on a line it already split off
        Err(LinesCodecError::Io(e)) if e.kind() == std::io::ErrorKind::InvalidData => {
            Ok(Some(OutputLine::NotUtf8))
        }
        Err(LinesCodecError::Io(e)) => Err(e),
    }
}

/// Reassembles JSON objects from output lines
///
/// Every non-empty, trimmed fragment is appended to a pending buffer, which
/// is parsed after each append. A successful parse clears the buffer; a
/// failed one keeps accumulating until the buffer passes its size limit, at
/// which point it is discarded.
#[derive(Debug)]
pub struct FrameDecoder {
    pending: String,
    max_buffer_size: usize,
    discarded: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    /// Decoder with the default [`MAX_BUFFER_SIZE`] limit
    pub fn new() -> Self {
        Self::with_max_buffer_size(MAX_BUFFER_SIZE)
    }

    /// Decoder with a custom buffer limit
    pub fn with_max_buffer_size(max_buffer_size: usize) -> Self {
        Self {
            pending: String::new(),
            max_buffer_size,
            discarded: 0,
        }
    }

    /// Feed one line and collect the frames it completes
    ///
    /// `control_response` frames are consumed and not returned.
    pub fn push_line(&mut self, line: &str) -> Vec<RawMessage> {
        let mut frames = Vec::new();

        for fragment in line.split('\n') {
            let fragment = fragment.trim();
            if fragment.is_empty() {
                continue;
            }

            self.pending.push_str(fragment);
            if self.pending.len() > self.max_buffer_size {
                warn!(
                    size = self.pending.len(),
                    max = self.max_buffer_size,
                    "Discarding partial frame over the buffer limit"
                );
                self.reset();
                self.discarded += 1;
                continue;
            }

            let Ok(frame) = serde_json::from_str::<RawMessage>(&self.pending) else {
                continue;
            };
            self.pending.clear();

            if frame_type(&frame) == Some(CONTROL_RESPONSE) {
                trace!("Skipping control response");
                continue;
            }
            frames.push(frame);
        }

        frames
    }

    /// Drop any partially accumulated frame
    pub fn reset(&mut self) {
        self.pending.clear();
    }

    /// Bytes waiting for the rest of a frame
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Number of times the buffer overflowed and was discarded
    pub fn discarded(&self) -> usize {
        self.discarded
    }
}

/// Sends decoded frames to the consumer until told to stop
///
/// After cancellation, shutdown or a dropped receiver the sender is released
/// and later frames are dropped, so the decoder can keep draining stdout.
pub(crate) struct Delivery {
    tx: Option<mpsc::Sender<RawMessage>>,
    cancel: CancellationToken,
    shutdown: CancellationToken,
    delivered: usize,
}

impl Delivery {
    pub(crate) fn new(
        tx: mpsc::Sender<RawMessage>,
        cancel: CancellationToken,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            tx: Some(tx),
            cancel,
            shutdown,
            delivered: 0,
        }
    }

    async fn deliver(&mut self, frame: RawMessage) {
        let Some(tx) = &self.tx else {
            return;
        };

        let stopped = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Some("cancelled"),
            _ = self.shutdown.cancelled() => Some("transport closing"),
            sent = tx.send(frame) => match sent {
                Ok(()) => None,
                Err(_) => Some("receiver dropped"),
            },
        };

        match stopped {
            None => self.delivered += 1,
            Some(reason) => {
                debug!(reason, "Stopped delivering output");
                self.tx = None;
            }
        }
    }

    /// Frames handed to the consumer so far
    pub(crate) fn delivered(&self) -> usize {
        self.delivered
    }
}

/// Decode `reader` to EOF, delivering every frame
pub(crate) async fn decode_stream<R>(reader: R, delivery: &mut Delivery)
where
    R: AsyncRead + Unpin,
{
    let mut lines = FramedRead::new(reader, OutputLineCodec::new());
    let mut frames = FrameDecoder::new();

    while let Some(line) = lines.next().await {
        match line {
            Ok(OutputLine::Text(text)) => {
                for frame in frames.push_line(&text) {
                    delivery.deliver(frame).await;
                }
            }
            Ok(OutputLine::Oversized) => {
                warn!(max = MAX_BUFFER_SIZE, "Discarding output line over the size limit");
                frames.reset();
            }
            Ok(OutputLine::NotUtf8) => warn!("Discarding output line that is not valid UTF-8"),
            Err(e) => {
                debug!("Error reading output: {}", e);
                break;
            }
        }
    }
}

/// Flags shared between the transport and its decoder
#[derive(Debug, Default)]
pub(crate) struct ExitFlags {
    closing: AtomicBool,
    exited: AtomicBool,
}

impl ExitFlags {
    pub(crate) fn mark_closing(&self) {
        self.closing.store(true, Ordering::Release);
    }

    pub(crate) fn is_closing(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }

    pub(crate) fn mark_exited(&self) {
        self.exited.store(true, Ordering::Release);
    }

    pub(crate) fn has_exited(&self) -> bool {
        self.exited.load(Ordering::Acquire)
    }
}

/// The decoder task: owns the process from `receive` until exit
pub(crate) struct OutputDecoder<R> {
    pub process: ProcessHandle,
    pub stdout: R,
    pub delivery: Delivery,
    pub kill: CancellationToken,
    pub done: CancellationToken,
    pub flags: std::sync::Arc<ExitFlags>,
}

impl<R> OutputDecoder<R>
where
    R: AsyncRead + Unpin,
{
    /// Decode until EOF, reap the process, then fire `done`
    pub(crate) async fn run(self) -> Option<ProcessExit> {
        let Self {
            mut process,
            stdout,
            mut delivery,
            kill,
            done,
            flags,
        } = self;
        let _done = done.drop_guard();

        let killed = tokio::select! {
            biased;
            _ = kill.cancelled() => true,
            _ = decode_stream(stdout, &mut delivery) => false,
        };
        if killed {
            debug!("Kill requested while reading output");
        } else {
            debug!(delivered = delivery.delivered(), "Output stream ended");
        }

        let exit = process.wait_or_kill(&kill).await;
        flags.mark_exited();

        let exit = match exit {
            Ok(exit) => exit,
            Err(e) => {
                warn!("Failed to wait for Claude CLI: {}", e);
                return None;
            }
        };

        if exit.success() || flags.is_closing() {
            debug!(pid = process.pid(), %exit, "Claude CLI exited");
        } else {
            let stderr = match process.error_sink().tail(STDERR_TAIL_LINES).await {
                Ok(tail) if !tail.is_empty() => Some(tail.to_string()),
                Ok(_) => None,
                Err(e) => {
                    debug!("Failed to read stderr tail: {}", e);
                    None
                }
            };
            let failure = TransportError::Process { exit, stderr };
            error!(pid = process.pid(), %exit, "{}", failure);
        }

        // The consumer sees the channel close only after the exit is recorded
        drop(delivery);
        Some(exit)
    }
}
