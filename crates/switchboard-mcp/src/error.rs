//! Error types for MCP operations.

use switchboard_types::FailureKind;
use thiserror::Error;

/// Errors from MCP server communication.
#[derive(Debug, Error)]
pub enum McpError {
    #[error("Failed to connect to MCP server '{backend}': {message}")]
    Connection { backend: String, message: String },

    #[error("Failed to spawn MCP server '{name}': {source}")]
    SpawnFailed {
        name: String,
        source: std::io::Error,
    },

    #[error("JSON-RPC error from '{server}' (code {code}): {message}")]
    JsonRpc {
        server: String,
        code: i64,
        message: String,
    },

    #[error("MCP protocol error: {0}")]
    Protocol(String),

    #[error("MCP session '{backend}' used before initialize completed")]
    NotInitialized { backend: String },

    #[error("Connection to MCP server '{backend}' lost: {message}")]
    Transport { backend: String, message: String },

    #[error("MCP request '{name}' timed out after {timeout_ms}ms")]
    Timeout { name: String, timeout_ms: u64 },

    #[error("Tool '{name}' not found in any connected server")]
    ToolNotFound { name: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl McpError {
    /// Whether this error means the transport was never established.
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::SpawnFailed { .. })
    }

    /// Classify the error for the uniform failure result handed to the agent.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::ToolNotFound { .. } => FailureKind::ToolNotFound,
            Self::Timeout { .. } => FailureKind::Timeout,
            Self::JsonRpc { .. } | Self::Protocol(_) | Self::NotInitialized { .. } | Self::Json(_) => {
                FailureKind::Protocol
            }
            Self::Connection { .. } | Self::SpawnFailed { .. } | Self::Transport { .. } | Self::Io(_) => {
                FailureKind::Transport
            }
        }
    }
}
