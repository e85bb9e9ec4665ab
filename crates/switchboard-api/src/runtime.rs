//! Agent runtime over a chat-completions endpoint.

use crate::client::ChatClient;
use crate::retry::RetryConfig;
use crate::wire::{self, ChatRequest};
use switchboard_types::{
    AgentError, AgentRuntime, AgentTool, ContentBlock, FailureKind, Message, Role, ToolOutput,
    TurnFuture,
};

/// Default number of tool-call rounds per turn.
pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 10;

/// An [`AgentRuntime`] that lets a chat model drive the offered tools.
///
/// Each round sends the transcript so far; tool calls in the reply are run
/// through the supplied callbacks and their results appended, until the model
/// answers without tool calls or the round limit is hit.
#[derive(Clone)]
pub struct ChatCompletionsRuntime {
    client: ChatClient,
    model: String,
    max_tool_rounds: usize,
}

impl ChatCompletionsRuntime {
    pub fn new(client: ChatClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
        }
    }

    /// Convenience constructor for an endpoint at `base_url`.
    pub fn connect(base_url: impl Into<String>, model: impl Into<String>) -> Result<Self, AgentError> {
        Ok(Self::new(ChatClient::new(base_url)?, model))
    }

    pub fn with_max_tool_rounds(mut self, rounds: usize) -> Self {
        self.max_tool_rounds = rounds;
        self
    }

    pub fn with_retry_config(mut self, config: RetryConfig) -> Self {
        self.client = self.client.with_retry_config(config);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn reply(&self, transcript: &[Message], tools: &[AgentTool]) -> Result<Message, AgentError> {
        let request = ChatRequest {
            model: &self.model,
            messages: wire::to_wire(transcript),
            tools: wire::tool_definitions(tools),
            stream: false,
        };
        let response = self.client.complete(&request).await?;
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AgentError::InvalidResponse("completion has no choices".into()))?;
        tracing::debug!(
            model = %self.model,
            finish_reason = choice.finish_reason.as_deref().unwrap_or("none"),
            tool_calls = choice.message.tool_calls.len(),
            "Model replied"
        );
        Ok(wire::from_wire(choice.message))
    }

    async fn run(&self, messages: &[Message], tools: &[AgentTool]) -> Result<Vec<Message>, AgentError> {
        let mut transcript = messages.to_vec();

        for round in 0..=self.max_tool_rounds {
            let reply = self.reply(&transcript, tools).await?;
            let calls: Vec<(String, String, serde_json::Value)> = reply
                .tool_uses()
                .into_iter()
                .map(|(id, name, input)| (id.to_string(), name.to_string(), input.clone()))
                .collect();
            transcript.push(reply);

            if calls.is_empty() {
                return Ok(transcript);
            }
            if round == self.max_tool_rounds {
                tracing::warn!(
                    rounds = self.max_tool_rounds,
                    "Tool-call round limit reached, ending turn"
                );
                break;
            }

            let mut results = Vec::with_capacity(calls.len());
            for (id, name, input) in calls {
                let output = match tools.iter().find(|t| t.name() == name) {
                    Some(tool) => tool.call(input).await,
                    None => ToolOutput::failed(
                        FailureKind::ToolNotFound,
                        format!("Tool '{name}' not found in any connected server"),
                    ),
                };
                tracing::debug!(tool = %name, is_error = output.is_error(), "Tool call finished");
                results.push(ContentBlock::ToolResult {
                    tool_use_id: id,
                    content: output.render(),
                    is_error: output.is_error(),
                });
            }
            transcript.push(Message {
                role: Role::User,
                content: results,
            });
        }

        Ok(transcript)
    }
}

impl AgentRuntime for ChatCompletionsRuntime {
    fn run_turn<'a>(&'a self, messages: &'a [Message], tools: &'a [AgentTool]) -> TurnFuture<'a> {
        Box::pin(self.run(messages, tools))
    }

    fn name(&self) -> &str {
        "chat-completions"
    }
}
