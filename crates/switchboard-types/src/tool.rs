//! Tool descriptors, invocation results, and agent-facing tool bindings.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// A tool exposed by a backend: name, human description, and JSON input schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// Why a routed tool call produced no result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// No connected backend owns the tool name.
    ToolNotFound,
    /// The backend answered with something that violates the protocol.
    Protocol,
    /// The connection broke or was closed while the call was outstanding.
    Transport,
    /// The call did not complete within its time bound.
    Timeout,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::ToolNotFound => "tool not found",
            Self::Protocol => "protocol error",
            Self::Transport => "transport error",
            Self::Timeout => "timeout",
        };
        f.write_str(label)
    }
}

/// Outcome of invoking a tool through the router.
///
/// Failures are values, not errors: they are handed back to the agent so a
/// single bad call never aborts the turn.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutput {
    /// Text extracted from a completed call. `is_error` mirrors the backend's
    /// own error flag.
    Content { text: String, is_error: bool },
    /// The call could not be completed.
    Failed { kind: FailureKind, message: String },
}

impl ToolOutput {
    /// Create a successful text output.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Content {
            text: text.into(),
            is_error: false,
        }
    }

    /// Create a failed output of the given kind.
    pub fn failed(kind: FailureKind, message: impl Into<String>) -> Self {
        Self::Failed {
            kind,
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        match self {
            Self::Content { is_error, .. } => *is_error,
            Self::Failed { .. } => true,
        }
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Self::Content { .. } => None,
            Self::Failed { kind, .. } => Some(*kind),
        }
    }

    /// The uniform JSON shape handed to the agent: the text on success,
    /// `{"error": "..."}` on failure.
    pub fn to_value(&self) -> serde_json::Value {
        match self {
            Self::Content { text, .. } => serde_json::Value::String(text.clone()),
            Self::Failed { message, .. } => serde_json::json!({ "error": message }),
        }
    }

    /// String form of [`Self::to_value`], suitable for a tool-result message.
    pub fn render(&self) -> String {
        match self {
            Self::Content { text, .. } => text.clone(),
            Self::Failed { .. } => self.to_value().to_string(),
        }
    }
}

/// Boxed future returned by a tool callback.
pub type ToolFuture = Pin<Box<dyn Future<Output = ToolOutput> + Send>>;

/// Callback that performs one invocation of a bound tool.
pub type ToolCallback = Arc<dyn Fn(serde_json::Value) -> ToolFuture + Send + Sync>;

/// A tool as offered to an agent runtime: its descriptor plus a callback that
/// runs it.
#[derive(Clone)]
pub struct AgentTool {
    pub descriptor: ToolDescriptor,
    callback: ToolCallback,
}

impl AgentTool {
    pub fn new<F>(descriptor: ToolDescriptor, callback: F) -> Self
    where
        F: Fn(serde_json::Value) -> ToolFuture + Send + Sync + 'static,
    {
        Self {
            descriptor,
            callback: Arc::new(callback),
        }
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    /// Invoke the tool with JSON arguments.
    pub fn call(&self, arguments: serde_json::Value) -> ToolFuture {
        (self.callback)(arguments)
    }
}

impl fmt::Debug for AgentTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentTool")
            .field("name", &self.descriptor.name)
            .finish_non_exhaustive()
    }
}
