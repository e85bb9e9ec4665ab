//! Invocation router: sends a tool call to the one session that owns it.

use crate::error::McpError;
use crate::manager::SessionManager;
use crate::session::{ToolCallResult, ToolContent};
use std::sync::Arc;
use std::time::{Duration, Instant};
use switchboard_types::ToolOutput;

/// Default bound on a single routed tool call.
pub const DEFAULT_CALL_TIMEOUT_MS: u64 = 60_000;

/// Routes tool invocations through the [`SessionManager`]'s catalog.
#[derive(Clone)]
pub struct InvocationRouter {
    manager: Arc<SessionManager>,
    call_timeout: Duration,
}

impl InvocationRouter {
    pub fn new(manager: Arc<SessionManager>) -> Self {
        Self {
            manager,
            call_timeout: Duration::from_millis(DEFAULT_CALL_TIMEOUT_MS),
        }
    }

    /// Set the bound on each routed call.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn manager(&self) -> &Arc<SessionManager> {
        &self.manager
    }

    /// Invoke `tool_name` on its owning backend.
    ///
    /// Never fails: a missing tool, a protocol violation, a broken connection
    /// or an expired timeout all come back as [`ToolOutput::Failed`] so the
    /// agent can recover within the same turn.
    pub async fn invoke(&self, tool_name: &str, arguments: serde_json::Value) -> ToolOutput {
        match self.try_invoke(tool_name, arguments).await {
            Ok(result) => ToolOutput::Content {
                text: extract_text(&result.content),
                is_error: result.is_error,
            },
            Err(e) => {
                tracing::warn!(tool = tool_name, "Tool call failed: {e}");
                ToolOutput::failed(e.kind(), e.to_string())
            }
        }
    }

    async fn try_invoke(
        &self,
        tool_name: &str,
        arguments: serde_json::Value,
    ) -> Result<ToolCallResult, McpError> {
        let (session, _) =
            self.manager
                .resolve(tool_name)
                .await
                .ok_or_else(|| McpError::ToolNotFound {
                    name: tool_name.to_string(),
                })?;

        let started = Instant::now();
        let outcome = tokio::time::timeout(self.call_timeout, session.call_tool(tool_name, arguments))
            .await
            .map_err(|_| McpError::Timeout {
                name: tool_name.to_string(),
                timeout_ms: self.call_timeout.as_millis() as u64,
            })?;

        tracing::debug!(
            tool = tool_name,
            backend = session.backend_id(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            ok = outcome.is_ok(),
            "Routed tool call"
        );
        outcome
    }
}

/// Join the text items of a tool result, in order, with newlines.
///
/// Images and embedded resources are not rendered and are dropped.
pub fn extract_text(content: &[ToolContent]) -> String {
    content
        .iter()
        .filter_map(|item| match item {
            ToolContent::Text { text } => Some(text.as_str()),
            ToolContent::Image { .. } | ToolContent::Resource { .. } => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}
