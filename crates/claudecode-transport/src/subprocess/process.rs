//! Process management for the CLI subprocess

use crate::error::{Result, TransportError};
use crate::subprocess::cli::Invocation;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Mutex;
use tempfile::NamedTempFile;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Environment marker identifying the SDK to the CLI
pub const ENTRYPOINT_ENV: (&str, &str) = ("CLAUDE_CODE_ENTRYPOINT", "sdk-rust");

/// Number of stderr lines kept for diagnostics
pub const STDERR_TAIL_LINES: usize = 100;

/// How a process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessExit {
    /// Exit status zero
    Success,
    /// Non-zero exit status
    Code(i32),
    /// Terminated by a signal (or killed); the signal number when known
    Signal(Option<i32>),
}

impl ProcessExit {
    /// Check whether the process exited cleanly
    pub fn success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

impl From<ExitStatus> for ProcessExit {
    fn from(status: ExitStatus) -> Self {
        if status.success() {
            return Self::Success;
        }
        match status.code() {
            Some(code) => Self::Code(code),
            None => Self::Signal(signal_of(&status)),
        }
    }
}

#[cfg(unix)]
fn signal_of(status: &ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn signal_of(_status: &ExitStatus) -> Option<i32> {
    None
}

impl std::fmt::Display for ProcessExit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "exit status 0"),
            Self::Code(code) => write!(f, "exit status {}", code),
            Self::Signal(Some(signal)) => write!(f, "signal {}", signal),
            Self::Signal(None) => write!(f, "termination by signal"),
        }
    }
}

/// The last lines of captured stderr
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StderrTail {
    /// Non-empty lines, oldest first
    pub lines: Vec<String>,
    /// Whether earlier lines were dropped
    pub truncated: bool,
}

impl StderrTail {
    /// Check whether nothing was captured
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

impl std::fmt::Display for StderrTail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.truncated {
            writeln!(f, "[stderr truncated, showing last {} lines]", self.lines.len())?;
        }
        write!(f, "{}", self.lines.join("\n"))
    }
}

/// Scratch file receiving the child's stderr
///
/// The file is removed by [`ErrorSink::remove`] or, failing that, on drop.
#[derive(Debug)]
pub struct ErrorSink {
    file: Mutex<Option<NamedTempFile>>,
    path: PathBuf,
}

impl ErrorSink {
    /// Create a new `claude_stderr_*.log` file in the temp directory
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be created.
    pub fn create() -> std::io::Result<Self> {
        let file = tempfile::Builder::new()
            .prefix("claude_stderr_")
            .suffix(".log")
            .tempfile()?;
        let path = file.path().to_path_buf();
        Ok(Self {
            file: Mutex::new(Some(file)),
            path,
        })
    }

    /// Path of the scratch file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A writable handle for the child's stderr
    fn stdio(&self) -> std::io::Result<Stdio> {
        let guard = self
            .file
            .lock()
            .map_err(|_| std::io::Error::other("error sink lock poisoned"))?;
        match guard.as_ref() {
            Some(file) => Ok(Stdio::from(file.as_file().try_clone()?)),
            None => Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "error sink already removed",
            )),
        }
    }

    /// Read back the last `limit` non-empty lines
    ///
    /// Bytes that are not valid UTF-8 are replaced, never rejected.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file has been removed or cannot be read.
    pub async fn tail(&self, limit: usize) -> std::io::Result<StderrTail> {
        let file = tokio::fs::File::open(&self.path).await?;
        let mut segments = BufReader::new(file).split(b'\n');

        let mut ring = VecDeque::with_capacity(limit);
        let mut truncated = false;
        while let Some(segment) = segments.next_segment().await? {
            let decoded = String::from_utf8_lossy(&segment);
            let line = decoded.strip_suffix('\r').unwrap_or(&decoded);
            if line.trim().is_empty() {
                continue;
            }
            if ring.len() == limit {
                ring.pop_front();
                truncated = true;
            }
            if limit > 0 {
                ring.push_back(line.to_string());
            }
        }

        Ok(StderrTail {
            lines: ring.into(),
            truncated,
        })
    }

    /// Delete the scratch file; later calls do nothing
    pub fn remove(&self) {
        let file = match self.file.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(file) = file
            && let Err(e) = file.close()
        {
            warn!(path = %self.path.display(), "Failed to remove stderr file: {}", e);
        }
    }
}

/// Handle to a running CLI process
///
/// Owns the child and its stderr sink. Stdin and stdout are taken out by the
/// transport right after spawning.
#[derive(Debug)]
pub struct ProcessHandle {
    child: Child,
    pid: Option<u32>,
    error_sink: std::sync::Arc<ErrorSink>,
}

impl ProcessHandle {
    /// Spawn the CLI
    ///
    /// The child inherits the environment plus [`ENTRYPOINT_ENV`], has piped
    /// stdin/stdout and writes stderr to a fresh [`ErrorSink`]. It is killed
    /// if the handle is dropped while still running.
    ///
    /// # Errors
    ///
    /// - `WorkingDirectory` if spawning failed and `working_directory` does
    ///   not exist
    /// - `Connection` for any other spawn or pipe failure
    pub fn spawn(invocation: &Invocation, working_directory: Option<&Path>) -> Result<Self> {
        let error_sink = std::sync::Arc::new(ErrorSink::create().map_err(|e| {
            TransportError::Connection(format!("failed to create stderr file: {}", e))
        })?);

        let stderr = error_sink.stdio().map_err(|e| {
            TransportError::Connection(format!("failed to create stderr pipe: {}", e))
        })?;

        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .env(ENTRYPOINT_ENV.0, ENTRYPOINT_ENV.1)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(stderr)
            .kill_on_drop(true);

        if let Some(dir) = working_directory {
            cmd.current_dir(dir);
        }

        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                error_sink.remove();
                if let Some(dir) = working_directory
                    && !dir.is_dir()
                {
                    return Err(TransportError::WorkingDirectory(dir.to_path_buf()));
                }
                return Err(TransportError::Connection(format!(
                    "failed to start claude command: {}",
                    e
                )));
            }
        };

        let pid = child.id();
        debug!(pid, program = %invocation.program.display(), "Spawned Claude CLI");

        Ok(Self {
            child,
            pid,
            error_sink,
        })
    }

    /// OS process id, if the process has not been reaped
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// The stderr sink shared with the transport
    pub fn error_sink(&self) -> &std::sync::Arc<ErrorSink> {
        &self.error_sink
    }

    /// Take the stdin pipe
    ///
    /// # Errors
    ///
    /// Returns `Connection` if it was already taken.
    pub fn take_stdin(&mut self) -> Result<ChildStdin> {
        self.child
            .stdin
            .take()
            .ok_or_else(|| TransportError::Connection("failed to get stdin".to_string()))
    }

    /// Take the stdout pipe
    ///
    /// # Errors
    ///
    /// Returns `Connection` if it was already taken.
    pub fn take_stdout(&mut self) -> Result<ChildStdout> {
        self.child
            .stdout
            .take()
            .ok_or_else(|| TransportError::Connection("failed to get stdout".to_string()))
    }

    /// Wait for the process to exit
    ///
    /// Safe to call again after the process has been reaped.
    pub async fn wait(&mut self) -> Result<ProcessExit> {
        Ok(self.child.wait().await?.into())
    }

    /// Wait for exit, killing the process once `kill` is cancelled
    pub async fn wait_or_kill(&mut self, kill: &CancellationToken) -> Result<ProcessExit> {
        tokio::select! {
            biased;
            status = self.child.wait() => return Ok(status?.into()),
            _ = kill.cancelled() => {}
        }
        self.kill().await?;
        self.wait().await
    }

    /// Forcibly terminate the process
    pub async fn kill(&mut self) -> Result<()> {
        match self.child.kill().await {
            Ok(()) => Ok(()),
            // Already reaped
            Err(e) if e.kind() == std::io::ErrorKind::InvalidInput => Ok(()),
            Err(e) => Err(TransportError::Io(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sink_with(contents: &str) -> ErrorSink {
        let sink = ErrorSink::create().unwrap();
        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(sink.path())
            .unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        sink
    }

    #[tokio::test]
    async fn test_tail_skips_blank_lines() {
        let sink = sink_with("first\n\n  \nsecond\n");
        let tail = sink.tail(STDERR_TAIL_LINES).await.unwrap();
        assert_eq!(tail.lines, vec!["first", "second"]);
        assert!(!tail.truncated);
        assert_eq!(tail.to_string(), "first\nsecond");
    }

    #[tokio::test]
    async fn test_tail_tolerates_invalid_utf8() {
        let sink = ErrorSink::create().unwrap();
        std::fs::OpenOptions::new()
            .append(true)
            .open(sink.path())
            .unwrap()
            .write_all(b"fatal: bad \xff byte\r\nreal error line\n")
            .unwrap();

        let tail = sink.tail(STDERR_TAIL_LINES).await.unwrap();
        assert_eq!(tail.lines, vec!["fatal: bad \u{FFFD} byte", "real error line"]);
        assert!(!tail.truncated);
    }

    #[tokio::test]
    async fn test_tail_keeps_last_lines() {
        let contents: String = (0..150).map(|i| format!("line {}\n", i)).collect();
        let sink = sink_with(&contents);

        let tail = sink.tail(STDERR_TAIL_LINES).await.unwrap();
        assert_eq!(tail.lines.len(), STDERR_TAIL_LINES);
        assert_eq!(tail.lines[0], "line 50");
        assert_eq!(tail.lines[99], "line 149");
        assert!(tail.truncated);
        assert!(
            tail.to_string()
                .starts_with("[stderr truncated, showing last 100 lines]\nline 50")
        );
    }

    #[tokio::test]
    async fn test_tail_exactly_at_limit_is_not_truncated() {
        let contents: String = (0..100).map(|i| format!("{}\n", i)).collect();
        let tail = sink_with(&contents).tail(STDERR_TAIL_LINES).await.unwrap();
        assert_eq!(tail.lines.len(), 100);
        assert!(!tail.truncated);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let sink = ErrorSink::create().unwrap();
        let path = sink.path().to_path_buf();
        assert!(path.exists());
        sink.remove();
        sink.remove();
        assert!(!path.exists());
    }

    #[test]
    fn test_sink_removed_on_drop() {
        let sink = ErrorSink::create().unwrap();
        let path = sink.path().to_path_buf();
        drop(sink);
        assert!(!path.exists());
    }

    #[test]
    fn test_process_exit_display() {
        assert_eq!(ProcessExit::Code(3).to_string(), "exit status 3");
        assert_eq!(ProcessExit::Signal(Some(9)).to_string(), "signal 9");
        assert!(ProcessExit::Success.success());
        assert!(!ProcessExit::Code(1).success());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_spawn_captures_stderr_and_exit_code() {
        let invocation = Invocation {
            program: "/bin/sh".into(),
            args: vec![
                "-c".into(),
                "echo \"entry=$CLAUDE_CODE_ENTRYPOINT\" >&2; exit 3".into(),
            ],
        };
        let mut handle = ProcessHandle::spawn(&invocation, None).unwrap();
        assert!(handle.pid().is_some());

        assert_eq!(handle.wait().await.unwrap(), ProcessExit::Code(3));
        // A second wait returns the cached status
        assert_eq!(handle.wait().await.unwrap(), ProcessExit::Code(3));

        let tail = handle.error_sink().tail(STDERR_TAIL_LINES).await.unwrap();
        assert_eq!(tail.lines, vec!["entry=sdk-rust"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_spawn_in_missing_working_directory() {
        let invocation = Invocation {
            program: "/bin/sh".into(),
            args: vec!["-c".into(), "exit 0".into()],
        };
        let missing = Path::new("/definitely/not/a/dir");

        let err = ProcessHandle::spawn(&invocation, Some(missing)).unwrap_err();
        assert!(matches!(err, TransportError::WorkingDirectory(ref p) if p == missing));
        assert!(err.to_string().contains("/definitely/not/a/dir"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_wait_or_kill_terminates() {
        let invocation = Invocation {
            program: "/bin/sh".into(),
            args: vec!["-c".into(), "sleep 30".into()],
        };
        let mut handle = ProcessHandle::spawn(&invocation, None).unwrap();
        let kill = CancellationToken::new();
        kill.cancel();

        let exit = handle.wait_or_kill(&kill).await.unwrap();
        assert!(matches!(exit, ProcessExit::Signal(_)));
    }
}
