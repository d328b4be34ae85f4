//! The subprocess transport
//!
//! Ties the launcher, process handle, feeder and decoder into one lifecycle:
//! unconnected → connected → closed.

use crate::error::{Result, TransportError};
use crate::options::Options;
use crate::subprocess::cli::{Invocation, LaunchMode};
use crate::subprocess::decoder::{Delivery, ExitFlags, OutputDecoder};
use crate::subprocess::feeder::Feeder;
use crate::subprocess::process::{ErrorSink, ProcessHandle};
use crate::subprocess::stdin::StdinPipe;
use crate::traits::Transport;
use async_trait::async_trait;
use claudecode_protocol::{RawMessage, RequestId, interrupt_frame};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::process::ChildStdout;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::instrument::{WithDispatch, WithSubscriber};
use tracing::{Instrument, debug, error, info, info_span, warn};

/// How long `close` waits for the CLI to finish on its own before killing it
pub const CLOSE_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// How long `close` waits for the decoder after a kill
const KILL_REAP_TIMEOUT: Duration = Duration::from_secs(2);

/// Output channel capacity; one frame in flight keeps delivery in lockstep
/// with the consumer
const OUTPUT_CHANNEL_CAPACITY: usize = 1;

/// Lifecycle state of a transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Created, not yet connected
    Unconnected,
    /// The CLI was started
    Connected,
    /// Closed; terminal
    Closed,
}

#[derive(Debug)]
enum Mode {
    OneShot { prompt: String },
    Streaming { close_after_source: bool },
}

/// Resources of a live connection
struct Running {
    /// Process and stdout until `receive` hands them to the decoder
    pending: Option<(ProcessHandle, ChildStdout)>,
    error_sink: Arc<ErrorSink>,
    shutdown: CancellationToken,
    kill: CancellationToken,
    decoder_done: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    span: tracing::Span,
}

/// Transport that runs the Claude Code CLI as a child process
///
/// Two flavors:
/// - [`one_shot`](Self::one_shot): the prompt goes on the command line and
///   stdin is closed right after launch
/// - [`streaming`](Self::streaming): frames from a channel, and from
///   [`send`](Transport::send), are written to stdin as stream-json
///
/// [`close`](Transport::close) must be called to shut the CLI down
/// gracefully; dropping an open transport kills it.
pub struct SubprocessTransport {
    options: Arc<Options>,
    mode: Mode,
    source: Mutex<Option<mpsc::Receiver<RawMessage>>>,
    state: Mutex<ConnectionState>,
    stdin: Mutex<Option<Arc<StdinPipe>>>,
    flags: Arc<ExitFlags>,
    running: tokio::sync::Mutex<Option<Running>>,
}

impl std::fmt::Debug for SubprocessTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubprocessTransport")
            .field("mode", &self.mode)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl SubprocessTransport {
    /// Transport that passes `prompt` with `--print`
    pub fn one_shot(options: Options, prompt: impl Into<String>) -> Self {
        Self::with_mode(
            options,
            Mode::OneShot {
                prompt: prompt.into(),
            },
            None,
        )
    }

    /// Transport that writes frames from `source` to stdin
    ///
    /// With `close_stdin_after_source`, stdin is closed once `source` is
    /// exhausted, which ends the CLI's input. Otherwise stdin stays open for
    /// [`send`](Transport::send) until the session ends.
    pub fn streaming(
        options: Options,
        source: mpsc::Receiver<RawMessage>,
        close_stdin_after_source: bool,
    ) -> Self {
        Self::with_mode(
            options,
            Mode::Streaming {
                close_after_source: close_stdin_after_source,
            },
            Some(source),
        )
    }

    fn with_mode(options: Options, mode: Mode, source: Option<mpsc::Receiver<RawMessage>>) -> Self {
        Self {
            options: Arc::new(options),
            mode,
            source: Mutex::new(source),
            state: Mutex::new(ConnectionState::Unconnected),
            stdin: Mutex::new(None),
            flags: Arc::new(ExitFlags::default()),
            running: tokio::sync::Mutex::new(None),
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> ConnectionState {
        *lock(&self.state)
    }

    /// Check whether this transport runs in streaming mode
    pub fn is_streaming(&self) -> bool {
        matches!(self.mode, Mode::Streaming { .. })
    }

    /// Close stdin, signalling the end of input to the CLI
    ///
    /// Idempotent; does nothing before connect.
    pub async fn end_input(&self) {
        let stdin = lock(&self.stdin).clone();
        if let Some(stdin) = stdin {
            stdin.close().await;
        }
    }

    /// Run `fut` under the configured logger, or the caller's dispatcher
    fn dispatched<F: Future>(&self, fut: F) -> WithDispatch<F> {
        match &self.options.logger {
            Some(dispatch) => fut.with_subscriber(dispatch.clone()),
            None => fut.with_current_subscriber(),
        }
    }

    fn spawn_task<F>(&self, span: tracing::Span, fut: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        tokio::spawn(self.dispatched(fut.instrument(span)))
    }

    fn require_streaming(&self, operation: &'static str) -> Result<()> {
        if self.is_streaming() {
            Ok(())
        } else {
            Err(TransportError::StreamingRequired { operation })
        }
    }

    /// Stdin of a live connection, if it is still open
    fn open_stdin(&self) -> Result<Arc<StdinPipe>> {
        match self.state() {
            ConnectionState::Unconnected => return Err(TransportError::NotConnected),
            ConnectionState::Closed => return Err(TransportError::Closed),
            ConnectionState::Connected => {}
        }
        if self.flags.has_exited() {
            return Err(TransportError::NotConnected);
        }

        let stdin = lock(&self.stdin)
            .clone()
            .ok_or(TransportError::NotConnected)?;
        if stdin.is_closed() {
            return Err(TransportError::InputClosed);
        }
        Ok(stdin)
    }

    async fn connect_inner(&self, cancel: &CancellationToken) -> Result<()> {
        let mut running = self.running.lock().await;
        match self.state() {
            ConnectionState::Connected => return Ok(()),
            ConnectionState::Closed => return Err(TransportError::Closed),
            ConnectionState::Unconnected => {}
        }

        let launch = match &self.mode {
            Mode::OneShot { prompt } => LaunchMode::OneShot { prompt },
            Mode::Streaming { .. } => LaunchMode::Streaming,
        };
        let invocation = Invocation::resolve(&self.options, launch)?;
        let mut process =
            ProcessHandle::spawn(&invocation, self.options.working_directory.as_deref())?;
        let stdin = Arc::new(StdinPipe::new(process.take_stdin()?));
        let stdout = process.take_stdout()?;

        let pid = process.pid();
        let mut run = Running {
            error_sink: Arc::clone(process.error_sink()),
            pending: Some((process, stdout)),
            shutdown: CancellationToken::new(),
            kill: CancellationToken::new(),
            decoder_done: CancellationToken::new(),
            tasks: Vec::new(),
            span: info_span!("subprocess_transport", pid),
        };
        *lock(&self.stdin) = Some(Arc::clone(&stdin));

        match &self.mode {
            Mode::OneShot { .. } => {
                stdin.close().await;
            }
            Mode::Streaming { close_after_source } => {
                let source = lock(&self.source).take();
                if let Some(source) = source {
                    let feeder = Feeder {
                        source,
                        stdin,
                        cancel: cancel.clone(),
                        decoder_done: run.decoder_done.clone(),
                        close_after_source: *close_after_source,
                    };
                    let span = info_span!(parent: &run.span, "input_feeder");
                    run.tasks.push(self.spawn_task(span, async move {
                        feeder.run().await;
                    }));
                }
            }
        }

        *running = Some(run);
        *lock(&self.state) = ConnectionState::Connected;
        info!(pid, "Connected to Claude CLI");
        Ok(())
    }

    async fn receive_inner(
        &self,
        cancel: &CancellationToken,
    ) -> Result<mpsc::Receiver<RawMessage>> {
        let mut running = self.running.lock().await;
        match self.state() {
            ConnectionState::Unconnected => return Err(TransportError::NotConnected),
            ConnectionState::Closed => return Err(TransportError::Closed),
            ConnectionState::Connected => {}
        }
        let run = running.as_mut().ok_or(TransportError::NotConnected)?;
        let (process, stdout) = run
            .pending
            .take()
            .ok_or(TransportError::AlreadyReceiving)?;

        let (tx, rx) = mpsc::channel(OUTPUT_CHANNEL_CAPACITY);
        let decoder = OutputDecoder {
            process,
            stdout,
            delivery: Delivery::new(tx, cancel.clone(), run.shutdown.clone()),
            kill: run.kill.clone(),
            done: run.decoder_done.clone(),
            flags: Arc::clone(&self.flags),
        };
        let span = info_span!(parent: &run.span, "output_decoder");
        run.tasks.push(self.spawn_task(span, async move {
            decoder.run().await;
        }));

        Ok(rx)
    }

    async fn send_inner(&self, messages: Vec<RawMessage>, cancel: &CancellationToken) -> Result<()> {
        self.require_streaming("send")?;
        let stdin = self.open_stdin()?;
        for message in &messages {
            stdin.write_frame(message, cancel).await?;
        }
        Ok(())
    }

    async fn interrupt_inner(&self, cancel: &CancellationToken) -> Result<()> {
        self.require_streaming("interrupt")?;
        let stdin = self.open_stdin()?;
        let request_id = RequestId::new();
        stdin.write_frame(&interrupt_frame(&request_id), cancel).await?;
        debug!(%request_id, "Sent interrupt request");
        Ok(())
    }

    async fn close_inner(&self) -> Result<()> {
        let mut running = self.running.lock().await;
        {
            let mut state = lock(&self.state);
            let previous = std::mem::replace(&mut *state, ConnectionState::Closed);
            if previous != ConnectionState::Connected {
                return Ok(());
            }
        }
        self.flags.mark_closing();

        let Some(run) = running.take() else {
            return Ok(());
        };
        let span = run.span.clone();
        self.teardown(run).instrument(span).await;
        Ok(())
    }

    async fn teardown(&self, mut run: Running) {
        run.shutdown.cancel();
        let stdin = lock(&self.stdin).take();
        if let Some(stdin) = stdin {
            stdin.close().await;
        }

        match run.pending.take() {
            // Output was never received: nobody is reaping the process
            Some((mut process, stdout)) => {
                drop(stdout);
                match tokio::time::timeout(CLOSE_GRACE_PERIOD, process.wait()).await {
                    Ok(Ok(exit)) => debug!(%exit, "Claude CLI exited"),
                    Ok(Err(e)) => warn!("Failed to wait for Claude CLI: {}", e),
                    Err(_) => {
                        warn!(grace = ?CLOSE_GRACE_PERIOD, "Claude CLI did not exit; killing it");
                        if let Err(e) = process.kill().await {
                            warn!("Failed to kill Claude CLI: {}", e);
                        }
                    }
                }
                self.flags.mark_exited();
            }
            None => {
                let finished =
                    tokio::time::timeout(CLOSE_GRACE_PERIOD, run.decoder_done.cancelled()).await;
                if finished.is_err() {
                    warn!(
                        grace = ?CLOSE_GRACE_PERIOD,
                        "Output decoder did not finish; killing Claude CLI"
                    );
                    run.kill.cancel();
                    let reaped =
                        tokio::time::timeout(KILL_REAP_TIMEOUT, run.decoder_done.cancelled()).await;
                    if reaped.is_err() {
                        warn!("Output decoder did not stop after kill");
                    }
                }
            }
        }

        for task in run.tasks.drain(..) {
            task.abort();
            if let Err(e) = task.await
                && e.is_panic()
            {
                error!("Transport task panicked: {}", e);
            }
        }

        run.error_sink.remove();
        info!("Transport closed");
    }
}

#[async_trait]
impl Transport for SubprocessTransport {
    async fn connect(&self, cancel: &CancellationToken) -> Result<()> {
        self.dispatched(self.connect_inner(cancel)).await
    }

    async fn send(&self, messages: Vec<RawMessage>, cancel: &CancellationToken) -> Result<()> {
        self.dispatched(self.send_inner(messages, cancel)).await
    }

    async fn receive(&self, cancel: &CancellationToken) -> Result<mpsc::Receiver<RawMessage>> {
        self.dispatched(self.receive_inner(cancel)).await
    }

    async fn interrupt(&self, cancel: &CancellationToken) -> Result<()> {
        self.dispatched(self.interrupt_inner(cancel)).await
    }

    fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected && !self.flags.has_exited()
    }

    async fn close(&self) -> Result<()> {
        self.dispatched(self.close_inner()).await
    }
}

impl Drop for SubprocessTransport {
    fn drop(&mut self) {
        let Some(run) = self.running.get_mut().take() else {
            return;
        };
        debug!("Transport dropped without close; killing Claude CLI");
        run.shutdown.cancel();
        run.kill.cancel();
        for task in &run.tasks {
            task.abort();
        }
        run.error_sink.remove();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn frame(value: serde_json::Value) -> RawMessage {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_operations_before_connect() {
        let (_tx, rx) = mpsc::channel(1);
        let transport = SubprocessTransport::streaming(Options::new(), rx, true);
        let cancel = CancellationToken::new();

        assert_eq!(transport.state(), ConnectionState::Unconnected);
        assert!(!transport.is_connected());
        assert!(matches!(
            transport.send(vec![frame(json!({"type": "user"}))], &cancel).await,
            Err(TransportError::NotConnected)
        ));
        assert!(matches!(
            transport.receive(&cancel).await,
            Err(TransportError::NotConnected)
        ));
        assert!(matches!(
            transport.interrupt(&cancel).await,
            Err(TransportError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_one_shot_rejects_streaming_operations() {
        let transport = SubprocessTransport::one_shot(Options::new(), "ping");
        let cancel = CancellationToken::new();

        let err = transport.send(Vec::new(), &cancel).await.unwrap_err();
        assert!(matches!(err, TransportError::StreamingRequired { operation: "send" }));

        let err = transport.interrupt(&cancel).await.unwrap_err();
        assert_eq!(err.to_string(), "interrupt requires streaming mode");
    }

    #[tokio::test]
    async fn test_close_before_connect_is_terminal() {
        let transport = SubprocessTransport::one_shot(Options::new(), "ping");
        transport.close().await.unwrap();
        transport.close().await.unwrap();
        assert_eq!(transport.state(), ConnectionState::Closed);

        let err = transport.connect(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, TransportError::Closed));
    }

    #[cfg(unix)]
    fn write_cli(dir: &std::path::Path, body: &str) -> std::path::PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("claude");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[rstest::rstest]
    #[case::clean_exit("echo 'warming up' >&2\nexit 0", true)]
    #[case::killed_after_grace("exec sleep 60", true)]
    #[case::output_never_received("echo 'warming up' >&2\nexit 0", false)]
    #[tokio::test]
    async fn test_close_removes_stderr_file(#[case] body: &str, #[case] receive: bool) {
        let dir = tempfile::tempdir().unwrap();
        let cli = write_cli(dir.path(), body);
        let transport = SubprocessTransport::one_shot(Options::new().with_cli_path(&cli), "ping");
        let cancel = CancellationToken::new();
        transport.connect(&cancel).await.unwrap();
        let _rx = if receive {
            Some(transport.receive(&cancel).await.unwrap())
        } else {
            None
        };

        let path = {
            let running = transport.running.lock().await;
            running.as_ref().unwrap().error_sink.path().to_path_buf()
        };
        assert!(path.exists());

        transport.close().await.unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_connect_with_missing_cli_path() {
        let transport = SubprocessTransport::one_shot(
            Options::new().with_cli_path("/definitely/not/claude"),
            "ping",
        );
        let err = transport.connect(&CancellationToken::new()).await.unwrap_err();
        assert!(err.is_not_installed());
        assert_eq!(transport.state(), ConnectionState::Unconnected);
    }
}
