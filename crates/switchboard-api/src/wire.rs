//! Chat-completions wire format and its mapping to transcript messages.

use serde::{Deserialize, Serialize};
use switchboard_types::{AgentTool, ContentBlock, Message, Role};

/// Request body for `POST /v1/chat/completions`.
#[derive(Debug, Serialize)]
pub(crate) struct ChatRequest<'a> {
    pub model: &'a str,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ChatTool<'a>>,
    pub stream: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct ChatMessage {
    pub role: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    fn new(role: &str, content: Option<String>) -> Self {
        Self {
            role: role.to_string(),
            content,
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct ToolCall {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type", default = "function_kind")]
    pub kind: String,
    pub function: FunctionCall,
}

fn function_kind() -> String {
    "function".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct FunctionCall {
    pub name: String,
    /// A JSON-encoded string on the wire. Some servers send an object
    /// instead; both are accepted.
    #[serde(default)]
    pub arguments: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub(crate) struct ChatTool<'a> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub function: FunctionDef<'a>,
}

#[derive(Debug, Serialize)]
pub(crate) struct FunctionDef<'a> {
    pub name: &'a str,
    pub description: &'a str,
    pub parameters: &'a serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Choice {
    pub message: ChatMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

pub(crate) fn tool_definitions(tools: &[AgentTool]) -> Vec<ChatTool<'_>> {
    tools
        .iter()
        .map(|tool| ChatTool {
            kind: "function",
            function: FunctionDef {
                name: &tool.descriptor.name,
                description: &tool.descriptor.description,
                parameters: &tool.descriptor.input_schema,
            },
        })
        .collect()
}

/// Flatten transcript messages into chat messages. Tool results become
/// `tool` role messages, one per result.
pub(crate) fn to_wire(messages: &[Message]) -> Vec<ChatMessage> {
    let mut wire = Vec::with_capacity(messages.len());
    for message in messages {
        let text = message.text_content();
        let content = (!text.is_empty()).then_some(text);
        match message.role {
            Role::System => wire.push(ChatMessage::new("system", content)),
            Role::Assistant => {
                let mut chat = ChatMessage::new("assistant", content);
                chat.tool_calls = message
                    .tool_uses()
                    .into_iter()
                    .map(|(id, name, input)| ToolCall {
                        id: id.to_string(),
                        kind: function_kind(),
                        function: FunctionCall {
                            name: name.to_string(),
                            arguments: serde_json::Value::String(input.to_string()),
                        },
                    })
                    .collect();
                wire.push(chat);
            }
            Role::User => {
                if content.is_some() {
                    wire.push(ChatMessage::new("user", content));
                }
                for block in &message.content {
                    if let ContentBlock::ToolResult {
                        tool_use_id,
                        content,
                        ..
                    } = block
                    {
                        let mut chat = ChatMessage::new("tool", Some(content.clone()));
                        chat.tool_call_id = Some(tool_use_id.clone());
                        wire.push(chat);
                    }
                }
            }
        }
    }
    wire
}

/// Convert an assistant reply into a transcript message. Tool calls without
/// an id get a generated one so results can be matched up.
pub(crate) fn from_wire(message: ChatMessage) -> Message {
    let mut content = Vec::new();
    if let Some(text) = message.content.filter(|t| !t.is_empty()) {
        content.push(ContentBlock::Text { text });
    }
    for call in message.tool_calls {
        let id = if call.id.is_empty() {
            format!("call_{}", uuid::Uuid::new_v4().simple())
        } else {
            call.id
        };
        content.push(ContentBlock::ToolUse {
            id,
            name: call.function.name,
            input: parse_arguments(call.function.arguments),
        });
    }
    Message {
        role: Role::Assistant,
        content,
    }
}

fn parse_arguments(arguments: serde_json::Value) -> serde_json::Value {
    match arguments {
        serde_json::Value::String(s) if s.trim().is_empty() => serde_json::json!({}),
        serde_json::Value::String(s) => serde_json::from_str(&s).unwrap_or_else(|e| {
            tracing::warn!("Tool call arguments are not valid JSON ({e}): {s}");
            serde_json::json!({})
        }),
        serde_json::Value::Null => serde_json::json!({}),
        other => other,
    }
}
