//! Subprocess transport for CLI communication
//!
//! Implements bidirectional communication with the Claude Code CLI via
//! stream-json frames on stdin/stdout.

pub mod cli;
pub mod decoder;
pub mod feeder;
pub mod process;
pub mod stdin;
pub mod transport;

pub use cli::{CliLocator, Invocation, LaunchMode, build_args, find_cli};
pub use decoder::{FrameDecoder, MAX_BUFFER_SIZE, OutputLine, OutputLineCodec};
pub use feeder::FeederExit;
pub use process::{
    ENTRYPOINT_ENV, ErrorSink, ProcessExit, ProcessHandle, STDERR_TAIL_LINES, StderrTail,
};
pub use stdin::StdinPipe;
pub use transport::{CLOSE_GRACE_PERIOD, ConnectionState, SubprocessTransport};
