//! Error hierarchy for Switchboard.

use thiserror::Error;

/// Startup errors of a binary that drives the whole stack.
#[derive(Debug, Error)]
pub enum SwitchboardError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// No configured backend could be connected.
    #[error("Connection error: {0}")]
    Connection(String),
}

/// Errors raised by an agent runtime while running a turn.
///
/// Every variant is an agent invocation failure from the caller's point of
/// view: the turn produced no answer, but history and sessions are intact.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Agent invocation failed: {0}")]
    Invocation(String),

    #[error("Model request failed: {status} {message}")]
    Http { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid model response: {0}")]
    InvalidResponse(String),

    #[error("Model request timed out")]
    Timeout,
}

/// Errors from configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    #[error("Server script must be a .py or .js file: {path}")]
    UnsupportedServer { path: String },
}
