//! Query processing: one user utterance in, one agent turn, one answer out.

use std::sync::Arc;
use switchboard_mcp::InvocationRouter;
use switchboard_types::{
    AgentError, AgentRuntime, AgentTool, Message, Role, ToolDescriptor, ToolFuture,
};

/// Runs agent turns over the tools currently in the catalog.
pub struct QueryProcessor {
    runtime: Arc<dyn AgentRuntime>,
    router: InvocationRouter,
    system_prompt: Option<String>,
}

impl QueryProcessor {
    pub fn new(runtime: Arc<dyn AgentRuntime>, router: InvocationRouter) -> Self {
        Self {
            runtime,
            router,
            system_prompt: None,
        }
    }

    /// Seed every new conversation with a system message.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn router(&self) -> &InvocationRouter {
        &self.router
    }

    /// Bind each tool in a fresh catalog snapshot to the router.
    ///
    /// The binding is by name, so a tool that disappears mid-turn resolves to
    /// a not-found result rather than reaching a stale session.
    pub async fn bind_tools(&self) -> Vec<AgentTool> {
        self.router
            .manager()
            .snapshot()
            .await
            .into_iter()
            .map(|descriptor| bind_tool(descriptor, self.router.clone()))
            .collect()
    }

    /// Process one user message.
    ///
    /// On success the answer is appended to `history` as an assistant
    /// message and returned. On failure the user's message stays recorded and
    /// nothing else is appended.
    pub async fn process(
        &self,
        user_message: &str,
        history: &mut Vec<Message>,
    ) -> Result<String, AgentError> {
        if history.is_empty() {
            if let Some(prompt) = &self.system_prompt {
                history.push(Message::system(prompt.clone()));
            }
        }
        history.push(Message::user(user_message));

        let tools = self.bind_tools().await;
        tracing::debug!(
            runtime = self.runtime.name(),
            tools = tools.len(),
            "Running agent turn"
        );

        let transcript = self.runtime.run_turn(history.as_slice(), &tools).await.map_err(|e| {
            tracing::warn!(runtime = self.runtime.name(), "Agent turn failed: {e}");
            e
        })?;

        // The transcript repeats the input history; only the new tail is this turn.
        let turn = if transcript.starts_with(history.as_slice()) {
            &transcript[history.len()..]
        } else {
            &transcript[..]
        };
        let answer = extract_answer(turn);
        history.push(Message::assistant(answer.clone()));
        Ok(answer)
    }
}

fn bind_tool(descriptor: ToolDescriptor, router: InvocationRouter) -> AgentTool {
    let name = descriptor.name.clone();
    AgentTool::new(descriptor, move |arguments| -> ToolFuture {
        let router = router.clone();
        let name = name.clone();
        Box::pin(async move { router.invoke(&name, arguments).await })
    })
}

/// Join the text of every assistant message, in order, with newlines.
/// Messages without text (tool-call-only turns) are skipped.
pub fn extract_answer(transcript: &[Message]) -> String {
    transcript
        .iter()
        .filter(|m| m.role == Role::Assistant)
        .map(Message::text_content)
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
