//! Launch options for the CLI subprocess

use claudecode_protocol::{McpServer, PermissionMode};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Errors returned by [`Options::validate`]
#[derive(Debug, thiserror::Error)]
pub enum OptionsError {
    /// The working directory does not exist
    #[error("invalid options: working directory does not exist: {}", .0.display())]
    WorkingDirectoryMissing(PathBuf),

    /// An additional directory does not exist
    #[error("invalid options: additional directory does not exist: {}", .0.display())]
    AddDirMissing(PathBuf),

    /// A path could not be made absolute
    #[error("invalid options: cannot resolve {}: {source}", .path.display())]
    Resolve {
        /// The offending path
        path: PathBuf,
        /// Underlying failure
        #[source]
        source: std::io::Error,
    },
}

/// Configuration for launching the Claude Code CLI
///
/// Built with the consuming `with_*` methods:
///
/// ```
/// use claudecode_transport::Options;
///
/// let options = Options::new()
///     .with_model("claude-sonnet-4-5")
///     .with_max_turns(3)
///     .with_allowed_tool("Read");
/// assert_eq!(options.max_turns, Some(3));
/// ```
#[derive(Debug, Clone)]
pub struct Options {
    /// Explicit path to the CLI executable; skips discovery when set
    pub cli_path: Option<PathBuf>,

    /// Replaces the default system prompt
    pub system_prompt: Option<String>,

    /// Appended to the system prompt
    pub append_system_prompt: Option<String>,

    /// Model to use
    pub model: Option<String>,

    /// Maximum conversation turns; zero means unlimited
    pub max_turns: Option<u32>,

    /// Permission mode for tool use
    pub permission_mode: Option<PermissionMode>,

    /// Tools the CLI may use without asking
    pub allowed_tools: Vec<String>,

    /// Tools the CLI must not use
    pub disallowed_tools: Vec<String>,

    /// Working directory of the process
    pub working_directory: Option<PathBuf>,

    /// MCP servers by name
    pub mcp_servers: BTreeMap<String, McpServer>,

    /// Continue the most recent conversation
    pub continue_conversation: bool,

    /// Resume the conversation with this session id
    pub resume: Option<String>,

    /// Path to a settings file
    pub settings: Option<String>,

    /// Extra directories the CLI may access
    pub add_dirs: Vec<PathBuf>,

    /// Dispatcher for transport logs; the caller's current dispatcher when unset
    pub logger: Option<tracing::Dispatch>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            cli_path: None,
            system_prompt: None,
            append_system_prompt: None,
            model: None,
            max_turns: None,
            permission_mode: Some(PermissionMode::Default),
            allowed_tools: Vec::new(),
            disallowed_tools: Vec::new(),
            working_directory: None,
            mcp_servers: BTreeMap::new(),
            continue_conversation: false,
            resume: None,
            settings: None,
            add_dirs: Vec::new(),
            logger: None,
        }
    }
}

impl Options {
    /// Create options with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Use the CLI at this path
    pub fn with_cli_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.cli_path = Some(path.into());
        self
    }

    /// Set the system prompt
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Append to the system prompt
    pub fn with_append_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.append_system_prompt = Some(prompt.into());
        self
    }

    /// Set the model
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Limit the number of turns
    pub fn with_max_turns(mut self, max_turns: u32) -> Self {
        self.max_turns = Some(max_turns);
        self
    }

    /// Set the permission mode
    pub fn with_permission_mode(mut self, mode: PermissionMode) -> Self {
        self.permission_mode = Some(mode);
        self
    }

    /// Allow a tool
    pub fn with_allowed_tool(mut self, tool: impl Into<String>) -> Self {
        self.allowed_tools.push(tool.into());
        self
    }

    /// Disallow a tool
    pub fn with_disallowed_tool(mut self, tool: impl Into<String>) -> Self {
        self.disallowed_tools.push(tool.into());
        self
    }

    /// Run the process in this directory
    pub fn with_working_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }

    /// Register an MCP server
    pub fn with_mcp_server(mut self, name: impl Into<String>, server: McpServer) -> Self {
        self.mcp_servers.insert(name.into(), server);
        self
    }

    /// Continue the most recent conversation
    pub fn with_continue_conversation(mut self, value: bool) -> Self {
        self.continue_conversation = value;
        self
    }

    /// Resume a previous session
    pub fn with_resume(mut self, session_id: impl Into<String>) -> Self {
        self.resume = Some(session_id.into());
        self
    }

    /// Load settings from this file
    pub fn with_settings(mut self, settings: impl Into<String>) -> Self {
        self.settings = Some(settings.into());
        self
    }

    /// Grant access to an extra directory
    pub fn with_add_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.add_dirs.push(dir.into());
        self
    }

    /// Route transport logs to this dispatcher
    pub fn with_logger(mut self, dispatch: tracing::Dispatch) -> Self {
        self.logger = Some(dispatch);
        self
    }

    /// Check that every configured directory exists
    ///
    /// # Errors
    ///
    /// Returns `OptionsError` naming the first directory that is missing.
    pub fn validate(&self) -> Result<(), OptionsError> {
        if let Some(dir) = &self.working_directory
            && !dir.is_dir()
        {
            return Err(OptionsError::WorkingDirectoryMissing(dir.clone()));
        }

        for dir in &self.add_dirs {
            let absolute = absolute(dir)?;
            if !absolute.exists() {
                return Err(OptionsError::AddDirMissing(absolute));
            }
        }

        Ok(())
    }
}

fn absolute(path: &Path) -> Result<PathBuf, OptionsError> {
    std::path::absolute(path).map_err(|source| OptionsError::Resolve {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_default() {
        let options = Options::default();
        assert_eq!(options.permission_mode, Some(PermissionMode::Default));
        assert!(options.cli_path.is_none());
        assert!(options.allowed_tools.is_empty());
        assert!(!options.continue_conversation);
    }

    #[test]
    fn test_options_builder() {
        let options = Options::new()
            .with_cli_path("/opt/claude")
            .with_model("claude-opus-4")
            .with_allowed_tool("Read")
            .with_allowed_tool("Write")
            .with_permission_mode(PermissionMode::AcceptEdits)
            .with_mcp_server("fs", McpServer::stdio("mcp-fs"));

        assert_eq!(options.cli_path, Some(PathBuf::from("/opt/claude")));
        assert_eq!(options.model.as_deref(), Some("claude-opus-4"));
        assert_eq!(options.allowed_tools, vec!["Read", "Write"]);
        assert_eq!(options.permission_mode, Some(PermissionMode::AcceptEdits));
        assert!(options.mcp_servers.contains_key("fs"));
    }

    #[test]
    fn test_validate_accepts_existing_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let options = Options::new()
            .with_working_directory(dir.path())
            .with_add_dir(dir.path());
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_missing_working_directory() {
        let options = Options::new().with_working_directory("/definitely/not/here");
        let err = options.validate().unwrap_err();
        assert!(matches!(err, OptionsError::WorkingDirectoryMissing(_)));
        assert!(err.to_string().contains("/definitely/not/here"));
    }

    #[test]
    fn test_validate_rejects_missing_add_dir() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("gone");
        let err = Options::new().with_add_dir(&missing).validate().unwrap_err();
        assert!(matches!(err, OptionsError::AddDirMissing(path) if path == missing));
    }
}
