//! Fake CLI scripts for client tests

#![allow(dead_code)]

use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

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

/// Script lines that append every stdin line to `stdin.jsonl` and answer it
/// with an assistant message and a result for session `sess-1`
pub const CHAT_CLI: &str = r#"
while IFS= read -r line; do
  printf '%s\n' "$line" >> "$(dirname "$0")/stdin.jsonl"
  echo '{"type":"assistant","message":{"content":[{"type":"text","text":"ok"}]}}'
  echo '{"type":"result","subtype":"success","session_id":"sess-1","num_turns":1}'
done
"#;

/// Frames the fake CLI received on stdin
pub fn received_frames(dir: &Path) -> Vec<serde_json::Value> {
    std::fs::read_to_string(dir.join("stdin.jsonl"))
        .unwrap_or_default()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}
