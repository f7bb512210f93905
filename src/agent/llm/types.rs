//! Wire types shared by the OpenAI-compatible and Ollama clients.
//!
//! Both backends accept the OpenAI function-tool shape for tool
//! definitions and a close variant of the OpenAI message shape.

use serde::Deserialize;
use serde_json::{json, Value};

use crate::agent::message::{Message, Role};
use crate::tools::ToolDefinition;

/// How assistant tool-call arguments are encoded on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgumentEncoding {
    /// JSON text inside a string (OpenAI).
    String,
    /// Plain JSON object (Ollama).
    Object,
}

/// Convert conversation messages into the chat-completions message array.
pub fn convert_messages(messages: &[Message], encoding: ArgumentEncoding) -> Vec<Value> {
    messages
        .iter()
        .map(|m| match m.role {
            Role::Tool => json!({
                "role": "tool",
                "tool_call_id": m.tool_call_id.as_deref().unwrap_or_default(),
                "content": m.content,
            }),
            Role::Assistant if m.tool_calls.is_some() => {
                let calls: Vec<Value> = m
                    .tool_calls
                    .iter()
                    .flatten()
                    .map(|tc| {
                        let arguments = match encoding {
                            ArgumentEncoding::String => Value::String(tc.arguments.to_string()),
                            ArgumentEncoding::Object => tc.arguments.clone(),
                        };
                        json!({
                            "id": tc.id,
                            "type": "function",
                            "function": {
                                "name": tc.name,
                                "arguments": arguments,
                            }
                        })
                    })
                    .collect();

                let content = if m.content.is_empty() {
                    Value::Null
                } else {
                    Value::String(m.content.clone())
                };

                json!({
                    "role": "assistant",
                    "content": content,
                    "tool_calls": calls,
                })
            }
            _ => json!({
                "role": m.role,
                "content": m.content,
            }),
        })
        .collect()
}

/// Convert tool definitions into function-tool declarations.
pub fn convert_tools(tools: &[ToolDefinition]) -> Vec<Value> {
    tools
        .iter()
        .map(|t| {
            json!({
                "type": "function",
                "function": {
                    "name": t.name,
                    "description": t.description,
                    "parameters": t.parameters,
                }
            })
        })
        .collect()
}

// OpenAI chat-completions response

#[derive(Debug, Deserialize)]
pub struct ChatCompletion {
    pub choices: Vec<Choice>,
    pub usage: Option<CompletionUsage>,
}

#[derive(Debug, Deserialize)]
pub struct Choice {
    pub message: CompletionMessage,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CompletionMessage {
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<CompletionToolCall>>,
}

#[derive(Debug, Deserialize)]
pub struct CompletionToolCall {
    pub id: String,
    pub function: CompletionFunction,
}

#[derive(Debug, Deserialize)]
pub struct CompletionFunction {
    pub name: String,
    /// JSON-encoded arguments
    #[serde(default)]
    pub arguments: String,
}

#[derive(Debug, Deserialize)]
pub struct CompletionUsage {
    #[serde(default)]
    pub prompt_tokens: usize,
    #[serde(default)]
    pub completion_tokens: usize,
    #[serde(default)]
    pub total_tokens: usize,
}

/// Error body returned by OpenAI-compatible APIs.
#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
    pub error: ApiError,
}

#[derive(Debug, Deserialize)]
pub struct ApiError {
    pub message: String,
}

// Ollama /api/chat response

#[derive(Debug, Deserialize)]
pub struct OllamaChatResponse {
    pub message: OllamaMessage,
    pub done_reason: Option<String>,
    pub prompt_eval_count: Option<usize>,
    pub eval_count: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct OllamaMessage {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub tool_calls: Option<Vec<OllamaToolCall>>,
}

#[derive(Debug, Deserialize)]
pub struct OllamaToolCall {
    pub function: OllamaFunction,
}

#[derive(Debug, Deserialize)]
pub struct OllamaFunction {
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}
