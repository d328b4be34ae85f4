//! CLI discovery and command-line construction
//!
//! Locates the `claude` executable and turns [`Options`] into the argument
//! vector for one launch. Nothing here spawns a process.

use crate::error::{Result, TransportError};
use crate::options::Options;
use serde_json::json;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::debug;

const CLI_NAME: &str = "claude";

const NODE_MISSING: &str = "Claude Code requires Node.js, which is not installed.\n\n\
Install Node.js from: https://nodejs.org/\n\n\
After installing Node.js, install Claude Code:\n  npm install -g @anthropic-ai/claude-code";

const CLI_MISSING: &str = "Claude Code not found. Install with:\n  npm install -g @anthropic-ai/claude-code\n\n\
If already installed locally, try:\n  export PATH=\"$HOME/node_modules/.bin:$PATH\"\n\n\
Or specify the path when creating the client:\n  Options::new().with_cli_path(\"/path/to/claude\")";

/// How the prompt reaches the CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchMode<'a> {
    /// Prompt passed with `--print`; stdin is closed right after launch
    OneShot {
        /// The prompt text
        prompt: &'a str,
    },
    /// Frames written to stdin as stream-json
    Streaming,
}

/// A resolved program and its arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Path to the CLI executable
    pub program: PathBuf,
    /// Arguments, without the program name
    pub args: Vec<String>,
}

impl Invocation {
    /// Resolve the CLI and build arguments for `mode`
    ///
    /// # Errors
    ///
    /// Fails with a discovery error when the CLI cannot be found, or an
    /// encode error when the MCP configuration cannot be serialized.
    pub fn resolve(options: &Options, mode: LaunchMode<'_>) -> Result<Self> {
        Ok(Self {
            program: find_cli(options)?,
            args: build_args(options, mode)?,
        })
    }
}

/// Where to look for the CLI
#[derive(Debug, Clone)]
pub struct CliLocator {
    search_path: Option<OsString>,
    home: Option<PathBuf>,
    system_locations: Vec<PathBuf>,
}

impl Default for CliLocator {
    fn default() -> Self {
        Self {
            search_path: std::env::var_os("PATH"),
            home: dirs::home_dir(),
            system_locations: vec![PathBuf::from("/usr/local/bin/claude")],
        }
    }
}

impl CliLocator {
    /// Locator over an explicit search path and home directory, with no
    /// system-wide locations
    pub fn new(search_path: Option<OsString>, home: Option<PathBuf>) -> Self {
        Self {
            search_path,
            home,
            system_locations: Vec::new(),
        }
    }

    /// Well-known install locations, in lookup order
    pub fn candidates(&self) -> Vec<PathBuf> {
        let home_path = |rel: &str| self.home.as_ref().map(|home| home.join(rel));

        let mut candidates: Vec<PathBuf> = home_path(".npm-global/bin/claude").into_iter().collect();
        candidates.extend(self.system_locations.iter().cloned());
        candidates.extend(
            [
                ".local/bin/claude",
                "node_modules/.bin/claude",
                ".yarn/bin/claude",
            ]
            .into_iter()
            .filter_map(home_path),
        );
        candidates
    }

    /// Find the CLI, honoring an explicit path in `options`
    ///
    /// # Errors
    ///
    /// - `CliPathNotFound` when the explicit path does not exist
    /// - `NotInstalled` when nothing is found; the message explains how to
    ///   install Node.js or the CLI, depending on which one is missing
    pub fn find(&self, options: &Options) -> Result<PathBuf> {
        if let Some(path) = &options.cli_path {
            if path.exists() {
                return Ok(path.clone());
            }
            return Err(TransportError::CliPathNotFound(path.clone()));
        }

        if let Some(path) = self.lookup(CLI_NAME) {
            debug!(path = %path.display(), "Found Claude CLI on search path");
            return Ok(path);
        }

        if let Some(path) = self.candidates().into_iter().find(|path| path.is_file()) {
            debug!(path = %path.display(), "Found Claude CLI at well-known location");
            return Ok(path);
        }

        if self.lookup("node").is_none() {
            return Err(TransportError::NotInstalled(NODE_MISSING.to_string()));
        }
        Err(TransportError::NotInstalled(CLI_MISSING.to_string()))
    }

    fn lookup(&self, name: &str) -> Option<PathBuf> {
        let search_path = self.search_path.as_ref()?;
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        which::which_in(name, Some(search_path), cwd).ok()
    }
}

/// Find the CLI using the process environment
///
/// # Errors
///
/// See [`CliLocator::find`].
pub fn find_cli(options: &Options) -> Result<PathBuf> {
    CliLocator::default().find(options)
}

/// Build the CLI arguments for one launch
///
/// # Errors
///
/// Returns `Encode` if the MCP server map cannot be serialized.
pub fn build_args(options: &Options, mode: LaunchMode<'_>) -> Result<Vec<String>> {
    let mut args: Vec<String> = vec![
        "--output-format".into(),
        "stream-json".into(),
        "--verbose".into(),
    ];

    if let Some(prompt) = &options.system_prompt {
        args.extend(["--system-prompt".into(), prompt.clone()]);
    }
    if let Some(prompt) = &options.append_system_prompt {
        args.extend(["--append-system-prompt".into(), prompt.clone()]);
    }
    if !options.allowed_tools.is_empty() {
        args.extend(["--allowedTools".into(), options.allowed_tools.join(",")]);
    }
    if let Some(max_turns) = options.max_turns.filter(|turns| *turns > 0) {
        args.extend(["--max-turns".into(), max_turns.to_string()]);
    }
    if !options.disallowed_tools.is_empty() {
        args.extend(["--disallowedTools".into(), options.disallowed_tools.join(",")]);
    }
    if let Some(model) = &options.model {
        args.extend(["--model".into(), model.clone()]);
    }
    if let Some(mode) = options.permission_mode {
        args.extend(["--permission-mode".into(), mode.as_str().into()]);
    }
    if options.continue_conversation {
        args.push("--continue".into());
    }
    if let Some(session_id) = &options.resume {
        args.extend(["--resume".into(), session_id.clone()]);
    }
    if let Some(settings) = &options.settings {
        args.extend(["--settings".into(), settings.clone()]);
    }
    for dir in &options.add_dirs {
        args.extend(["--add-dir".into(), path_arg(dir)]);
    }
    if !options.mcp_servers.is_empty() {
        let config = serde_json::to_string(&json!({ "mcpServers": options.mcp_servers }))
            .map_err(TransportError::Encode)?;
        args.extend(["--mcp-config".into(), config]);
    }

    match mode {
        LaunchMode::OneShot { prompt } => args.extend(["--print".into(), prompt.into()]),
        LaunchMode::Streaming => args.extend(["--input-format".into(), "stream-json".into()]),
    }

    Ok(args)
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use claudecode_protocol::{McpServer, PermissionMode};
    use rstest::rstest;

    fn bare_options() -> Options {
        Options {
            permission_mode: None,
            ..Options::default()
        }
    }

    #[test]
    fn test_minimal_streaming_args() {
        let args = build_args(&bare_options(), LaunchMode::Streaming).unwrap();
        assert_eq!(
            args,
            vec![
                "--output-format",
                "stream-json",
                "--verbose",
                "--input-format",
                "stream-json"
            ]
        );
    }

    #[test]
    fn test_one_shot_appends_print_prompt() {
        let args = build_args(&bare_options(), LaunchMode::OneShot { prompt: "ping" }).unwrap();
        assert_eq!(&args[args.len() - 2..], ["--print", "ping"]);
        assert!(!args.contains(&"--input-format".to_string()));
    }

    #[test]
    fn test_full_args_in_order() {
        let options = Options::new()
            .with_system_prompt("sys")
            .with_append_system_prompt("more")
            .with_allowed_tool("Read")
            .with_allowed_tool("Bash")
            .with_max_turns(4)
            .with_disallowed_tool("Write")
            .with_model("claude-sonnet-4-5")
            .with_permission_mode(PermissionMode::BypassPermissions)
            .with_continue_conversation(true)
            .with_resume("sess-1")
            .with_settings("/etc/claude.json")
            .with_add_dir("/a")
            .with_add_dir("/b")
            .with_mcp_server("fs", McpServer::stdio("mcp-fs"));

        let args = build_args(&options, LaunchMode::Streaming).unwrap();
        let expected: Vec<String> = [
            "--output-format",
            "stream-json",
            "--verbose",
            "--system-prompt",
            "sys",
            "--append-system-prompt",
            "more",
            "--allowedTools",
            "Read,Bash",
            "--max-turns",
            "4",
            "--disallowedTools",
            "Write",
            "--model",
            "claude-sonnet-4-5",
            "--permission-mode",
            "bypassPermissions",
            "--continue",
            "--resume",
            "sess-1",
            "--settings",
            "/etc/claude.json",
            "--add-dir",
            "/a",
            "--add-dir",
            "/b",
            "--mcp-config",
            r#"{"mcpServers":{"fs":{"command":"mcp-fs","type":"stdio"}}}"#,
            "--input-format",
            "stream-json",
        ]
        .into_iter()
        .map(String::from)
        .collect();

        assert_eq!(args, expected);
    }

    #[rstest]
    #[case(Some(0), false)]
    #[case(None, false)]
    #[case(Some(7), true)]
    fn test_max_turns_only_when_positive(#[case] max_turns: Option<u32>, #[case] present: bool) {
        let options = Options {
            max_turns,
            ..bare_options()
        };
        let args = build_args(&options, LaunchMode::Streaming).unwrap();
        assert_eq!(args.contains(&"--max-turns".to_string()), present);
    }

    #[test]
    fn test_explicit_cli_path_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("claude");
        let locator = CliLocator::new(None, None);

        let err = locator
            .find(&Options::new().with_cli_path(&missing))
            .unwrap_err();
        assert!(matches!(err, TransportError::CliPathNotFound(ref p) if p == &missing));
        assert!(err.to_string().contains("not found at specified path"));

        std::fs::write(&missing, "").unwrap();
        let found = locator.find(&Options::new().with_cli_path(&missing)).unwrap();
        assert_eq!(found, missing);
    }

    #[test]
    fn test_well_known_location_under_home() {
        let home = tempfile::tempdir().unwrap();
        let bin = home.path().join(".local/bin");
        std::fs::create_dir_all(&bin).unwrap();
        std::fs::write(bin.join("claude"), "").unwrap();

        let locator = CliLocator::new(None, Some(home.path().to_path_buf()));
        assert_eq!(locator.find(&Options::new()).unwrap(), bin.join("claude"));
    }

    #[test]
    fn test_candidates_order() {
        let locator = CliLocator {
            search_path: None,
            home: Some(PathBuf::from("/home/u")),
            system_locations: vec![PathBuf::from("/usr/local/bin/claude")],
        };
        assert_eq!(
            locator.candidates(),
            vec![
                PathBuf::from("/home/u/.npm-global/bin/claude"),
                PathBuf::from("/usr/local/bin/claude"),
                PathBuf::from("/home/u/.local/bin/claude"),
                PathBuf::from("/home/u/node_modules/.bin/claude"),
                PathBuf::from("/home/u/.yarn/bin/claude"),
            ]
        );
    }

    #[test]
    fn test_not_installed_without_node() {
        let empty = tempfile::tempdir().unwrap();
        let locator = CliLocator::new(
            Some(empty.path().as_os_str().to_os_string()),
            Some(empty.path().to_path_buf()),
        );

        let err = locator.find(&Options::new()).unwrap_err();
        assert!(err.is_not_installed());
        assert!(err.to_string().contains("requires Node.js"));
    }

    #[cfg(unix)]
    #[test]
    fn test_not_installed_with_node_present() {
        use std::os::unix::fs::PermissionsExt;

        let bin = tempfile::tempdir().unwrap();
        let node = bin.path().join("node");
        std::fs::write(&node, "#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&node, std::fs::Permissions::from_mode(0o755)).unwrap();

        let locator = CliLocator::new(Some(bin.path().as_os_str().to_os_string()), None);
        let err = locator.find(&Options::new()).unwrap_err();
        assert!(err.to_string().starts_with("Claude Code not found"));
    }

    #[cfg(unix)]
    #[test]
    fn test_search_path_lookup() {
        use std::os::unix::fs::PermissionsExt;

        let bin = tempfile::tempdir().unwrap();
        let cli = bin.path().join("claude");
        std::fs::write(&cli, "#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&cli, std::fs::Permissions::from_mode(0o755)).unwrap();

        let locator = CliLocator::new(Some(bin.path().as_os_str().to_os_string()), None);
        assert_eq!(locator.find(&Options::new()).unwrap(), cli);
    }
}
