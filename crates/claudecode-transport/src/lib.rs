//! Subprocess transport for the Claude Code CLI
//!
//! Spawns the `claude` executable, feeds it stream-json frames on stdin and
//! decodes the frames it prints on stdout, with cooperative cancellation and
//! bounded shutdown.
//!
//! # Architecture
//!
//! - **Transport trait**: [`Transport`], the connect/send/receive/interrupt/close contract
//! - **Subprocess transport**: [`SubprocessTransport`], built from:
//!   - CLI discovery and argument construction ([`subprocess::cli`])
//!   - the process handle and stderr capture ([`subprocess::process`])
//!   - the input feeder task ([`subprocess::feeder`])
//!   - the output decoder task ([`subprocess::decoder`])
//! - **Options**: [`Options`], the launch configuration
//! - **Error handling**: [`TransportError`] classified by [`ErrorKind`]
//!
//! # Usage
//!
//! ```no_run
//! use claudecode_transport::{Options, SubprocessTransport, Transport};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> claudecode_transport::Result<()> {
//! let cancel = CancellationToken::new();
//! let transport = SubprocessTransport::one_shot(Options::new(), "What is 2+2?");
//! transport.connect(&cancel).await?;
//!
//! let mut output = transport.receive(&cancel).await?;
//! while let Some(frame) = output.recv().await {
//!     println!("{:?}", frame.get("type"));
//! }
//! transport.close().await?;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod options;
pub mod subprocess;
pub mod traits;

// Re-export commonly used types
pub use claudecode_protocol::RawMessage;
pub use error::{ErrorKind, Result, TransportError};
pub use options::{Options, OptionsError};
pub use subprocess::{ConnectionState, ProcessExit, SubprocessTransport};
pub use traits::Transport;
