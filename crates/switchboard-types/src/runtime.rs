//! The agent runtime seam.

use crate::{AgentError, AgentTool, Message};
use std::future::Future;
use std::pin::Pin;

/// Boxed future returned by [`AgentRuntime::run_turn`].
pub type TurnFuture<'a> = Pin<Box<dyn Future<Output = Result<Vec<Message>, AgentError>> + Send + 'a>>;

/// An opaque reasoning component that runs one agent turn.
///
/// Given the conversation so far (ending with the user's latest message) and
/// the tools currently on offer, the runtime may call any of the tools any
/// number of times before resolving with the turn's transcript. Dyn-compatible
/// so callers hold an `Arc<dyn AgentRuntime>`.
pub trait AgentRuntime: Send + Sync {
    fn run_turn<'a>(&'a self, messages: &'a [Message], tools: &'a [AgentTool]) -> TurnFuture<'a>;

    /// Runtime name for logging/display.
    fn name(&self) -> &str;
}
