//! Configuration types for MCP servers.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use switchboard_types::ConfigError;

fn default_timeout() -> u64 {
    30000
}

/// Top-level MCP configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct McpConfig {
    #[serde(default)]
    pub servers: HashMap<String, McpServerConfig>,
}

/// Configuration for a single MCP server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McpServerConfig {
    /// How to reach the server.
    #[serde(flatten)]
    pub transport: TransportDescriptor,
    /// Timeout for requests in milliseconds (default: 30000).
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,
}

impl McpServerConfig {
    pub fn new(transport: TransportDescriptor) -> Self {
        Self {
            transport,
            timeout_ms: default_timeout(),
        }
    }
}

/// How to establish the byte stream to a backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TransportDescriptor {
    /// Spawn a child process and talk over its stdin/stdout.
    Process {
        /// Command to run (e.g., "npx", "python").
        command: String,
        #[serde(default)]
        args: Vec<String>,
        /// Variables layered over the inherited environment.
        #[serde(default)]
        env: HashMap<String, String>,
    },
    /// Open a long-lived event stream to a URL.
    Stream { url: String },
}

impl TransportDescriptor {
    /// Interpret a server address given on the command line: an
    /// `http(s)://` URL selects the stream transport, a `.py`/`.js` script
    /// selects a process transport with the matching interpreter.
    pub fn from_address(address: &str) -> Result<Self, ConfigError> {
        if address.starts_with("http://") || address.starts_with("https://") {
            return Ok(Self::Stream {
                url: address.to_string(),
            });
        }

        let command = match Path::new(address).extension().and_then(|e| e.to_str()) {
            Some("py") => "python",
            Some("js") => "node",
            _ => {
                return Err(ConfigError::UnsupportedServer {
                    path: address.to_string(),
                });
            }
        };

        Ok(Self::Process {
            command: command.to_string(),
            args: vec![address.to_string()],
            env: HashMap::new(),
        })
    }

    /// Short human label: the command line or the URL.
    pub fn label(&self) -> String {
        match self {
            Self::Process { command, args, .. } if args.is_empty() => command.clone(),
            Self::Process { command, args, .. } => format!("{command} {}", args.join(" ")),
            Self::Stream { url } => url.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_process_server() {
        let toml_str = r#"
[servers.filesystem]
command = "npx"
args = ["-y", "@modelcontextprotocol/server-filesystem", "/home/user"]
"#;
        let config: McpConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.servers.len(), 1);
        let fs = &config.servers["filesystem"];
        match &fs.transport {
            TransportDescriptor::Process { command, args, .. } => {
                assert_eq!(command, "npx");
                assert_eq!(args.len(), 3);
            }
            other => panic!("Expected process transport, got {other:?}"),
        }
        assert_eq!(fs.timeout_ms, 30000); // default
    }

    #[test]
    fn parse_stream_server_with_timeout() {
        let toml_str = r#"
[servers.c3se]
url = "http://localhost:8395/sse"
timeout_ms = 60000
"#;
        let config: McpConfig = toml::from_str(toml_str).unwrap();
        let server = &config.servers["c3se"];
        assert_eq!(
            server.transport,
            TransportDescriptor::Stream {
                url: "http://localhost:8395/sse".into()
            }
        );
        assert_eq!(server.timeout_ms, 60000);
    }

    #[test]
    fn parse_env_vars() {
        let toml_str = r#"
[servers.github]
command = "npx"
args = ["-y", "@modelcontextprotocol/server-github"]
env = { GITHUB_TOKEN = "ghp_xxxx" }
"#;
        let config: McpConfig = toml::from_str(toml_str).unwrap();
        match &config.servers["github"].transport {
            TransportDescriptor::Process { env, .. } => assert_eq!(env["GITHUB_TOKEN"], "ghp_xxxx"),
            other => panic!("Expected process transport, got {other:?}"),
        }
    }

    #[test]
    fn default_config_is_empty() {
        assert!(McpConfig::default().servers.is_empty());
    }

    #[test]
    fn address_url_selects_stream() {
        let desc = TransportDescriptor::from_address("https://example.com/sse").unwrap();
        assert_eq!(
            desc,
            TransportDescriptor::Stream {
                url: "https://example.com/sse".into()
            }
        );
    }

    #[test]
    fn address_script_selects_interpreter() {
        match TransportDescriptor::from_address("servers/weather.py").unwrap() {
            TransportDescriptor::Process { command, args, env } => {
                assert_eq!(command, "python");
                assert_eq!(args, vec!["servers/weather.py".to_string()]);
                assert!(env.is_empty());
            }
            other => panic!("Expected process transport, got {other:?}"),
        }
        match TransportDescriptor::from_address("server.js").unwrap() {
            TransportDescriptor::Process { command, .. } => assert_eq!(command, "node"),
            other => panic!("Expected process transport, got {other:?}"),
        }
    }

    #[test]
    fn address_with_other_extension_is_rejected() {
        let err = TransportDescriptor::from_address("server.rb").unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedServer { .. }));
        assert!(TransportDescriptor::from_address("server").is_err());
    }

    #[test]
    fn label_formats_command_line() {
        let desc = TransportDescriptor::from_address("a.py").unwrap();
        assert_eq!(desc.label(), "python a.py");
    }
}
