//! Fake CLI scripts for subprocess tests

#![allow(dead_code)]

use claudecode_protocol::RawMessage;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Write an executable `claude` shell script into `dir`
pub fn fake_cli(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("claude");
    {
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "#!/bin/sh").unwrap();
        writeln!(file, "{}", body).unwrap();
        file.sync_all().unwrap();
    }
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Script prefix that records its arguments, one per line, in `args.txt`
pub const RECORD_ARGS: &str = r#"printf '%s\n' "$@" > "$(dirname "$0")/args.txt""#;

/// Arguments recorded by [`RECORD_ARGS`]
pub fn recorded_args(dir: &Path) -> Vec<String> {
    std::fs::read_to_string(dir.join("args.txt"))
        .unwrap()
        .lines()
        .map(String::from)
        .collect()
}

/// Script that answers every stdin line with an assistant frame wrapping it,
/// then prints a result once stdin closes
pub const ECHO_CLI: &str = r#"
while IFS= read -r line; do
  printf '{"type":"assistant","echo":%s}\n' "$line"
done
printf '{"type":"result","session_id":"echo"}\n'
"#;

pub fn frame(value: serde_json::Value) -> RawMessage {
    value.as_object().cloned().unwrap()
}

/// In-memory log sink for a `tracing` dispatcher
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    pub fn dispatch(&self) -> tracing::Dispatch {
        let logs = self.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || logs.clone())
            .finish();
        tracing::Dispatch::new(subscriber)
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
