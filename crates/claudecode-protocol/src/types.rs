//! Value types carried by launch options
//!
//! These serialize to the exact strings and JSON shapes the CLI expects on
//! its command line.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Permission mode for tool use
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum PermissionMode {
    /// Default: ask for permission for each tool use
    #[default]
    Default,

    /// Automatically accept edits without asking
    AcceptEdits,

    /// Bypass permission checks entirely
    BypassPermissions,
}

impl PermissionMode {
    /// The value passed to `--permission-mode`
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::AcceptEdits => "acceptEdits",
            Self::BypassPermissions => "bypassPermissions",
        }
    }
}

impl std::fmt::Display for PermissionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transport used to reach an MCP server
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum McpServerType {
    /// Spawned locally, spoken to over stdio
    #[default]
    Stdio,
    /// Server-sent events endpoint
    Sse,
    /// Streamable HTTP endpoint
    Http,
}

/// An MCP server definition, serialized into `--mcp-config`
///
/// Empty fields are omitted from the JSON handed to the CLI.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct McpServer {
    /// Server transport kind
    #[serde(rename = "type")]
    pub server_type: McpServerType,

    /// Command to launch (stdio servers)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    /// Command arguments (stdio servers)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,

    /// Extra environment for the server process (stdio servers)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,

    /// Endpoint URL (sse/http servers)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Request headers (sse/http servers)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
}

impl McpServer {
    /// A stdio server launched with `command`
    pub fn stdio(command: impl Into<String>) -> Self {
        Self {
            server_type: McpServerType::Stdio,
            command: Some(command.into()),
            ..Self::default()
        }
    }

    /// A server reached over HTTP at `url`
    pub fn http(url: impl Into<String>) -> Self {
        Self {
            server_type: McpServerType::Http,
            url: Some(url.into()),
            ..Self::default()
        }
    }

    /// A server reached over server-sent events at `url`
    pub fn sse(url: impl Into<String>) -> Self {
        Self {
            server_type: McpServerType::Sse,
            url: Some(url.into()),
            ..Self::default()
        }
    }

    /// Add a command argument
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Set an environment variable for the server process
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set a request header
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case(PermissionMode::Default, "default")]
    #[case(PermissionMode::AcceptEdits, "acceptEdits")]
    #[case(PermissionMode::BypassPermissions, "bypassPermissions")]
    fn test_permission_mode_wire_strings(#[case] mode: PermissionMode, #[case] expected: &str) {
        assert_eq!(mode.as_str(), expected);
        assert_eq!(serde_json::to_value(mode).unwrap(), json!(expected));
    }

    #[test]
    fn test_stdio_server_omits_empty_fields() {
        let server = McpServer::stdio("npx").with_arg("-y").with_arg("server-fs");
        assert_eq!(
            serde_json::to_value(&server).unwrap(),
            json!({"type": "stdio", "command": "npx", "args": ["-y", "server-fs"]})
        );
    }

    #[test]
    fn test_http_server_with_headers() {
        let server = McpServer::http("https://mcp.example.com").with_header("Authorization", "x");
        assert_eq!(
            serde_json::to_value(&server).unwrap(),
            json!({
                "type": "http",
                "url": "https://mcp.example.com",
                "headers": {"Authorization": "x"}
            })
        );
    }
}
