//! LLM client abstraction layer.
//!
//! This module provides:
//! - [`LlmClient`] trait for swappable LLM providers
//! - [`ProviderRegistry`] for creating the client a [`ModelSelection`] names
//! - Concrete implementations: OpenAI-compatible hosted APIs, local Ollama
//!
//! # Adding a New Provider
//!
//! 1. Create a new file (e.g., `anthropic.rs`)
//! 2. Implement `LlmClient` trait
//! 3. Add a [`ModelSelection`] variant and handle it in `ProviderRegistry::create()`

mod types;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::ModelSelection;
use crate::tools::ToolDefinition;
use crate::Result;

pub mod ollama;
pub mod openai;

pub use ollama::OllamaClient;
pub use openai::OpenAiClient;

use super::message::{Message, ToolCallRequest};

/// Response from an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    /// Text content of the response.
    pub content: Option<String>,

    /// Tool calls requested by the LLM.
    pub tool_calls: Vec<ToolCallRequest>,

    /// Reason the response finished.
    pub finish_reason: String,

    /// Token usage statistics.
    pub usage: Usage,
}

impl LlmResponse {
    /// Create a simple text response.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            tool_calls: vec![],
            finish_reason: "stop".to_string(),
            usage: Usage::default(),
        }
    }

    /// Check if response has tool calls.
    #[inline]
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// Token usage information.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub total_tokens: usize,
}

/// LLM client trait - swappable provider abstraction.
///
/// Implement this trait to add a new LLM provider.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Send messages and get response.
    async fn chat(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<LlmResponse>;

    /// Get the default model for this provider.
    fn default_model(&self) -> &str;
}

/// Provider registry - creates LLM clients from a resolved model selection.
///
/// # Example
///
/// ```ignore
/// let client = ProviderRegistry::create(&settings.model_selection()?)?;
/// let response = client.chat(&messages, &tools).await?;
/// ```
pub struct ProviderRegistry;

impl ProviderRegistry {
    /// Create an LLM client for the selected backend.
    pub fn create(selection: &ModelSelection) -> Result<Arc<dyn LlmClient>> {
        match selection {
            ModelSelection::Local { name, base_url } => {
                let client = OllamaClient::new(base_url, name)?;
                info!("Initialized Ollama with model {}", name);
                Ok(Arc::new(client))
            }
            ModelSelection::Hosted { id, api_key, base_url } => {
                let client = OpenAiClient::new(base_url, api_key, id)?;
                info!("Initialized hosted model {} via {}", id, base_url);
                Ok(Arc::new(client))
            }
        }
    }
}

/// Fake LLM client for testing.
#[cfg(test)]
pub struct FakeLlmClient {
    responses: std::sync::Mutex<std::collections::VecDeque<Result<LlmResponse>>>,
    seen: std::sync::Mutex<Vec<Vec<Message>>>,
}

#[cfg(test)]
impl FakeLlmClient {
    fn from_queue(responses: Vec<Result<LlmResponse>>) -> Self {
        Self {
            responses: std::sync::Mutex::new(responses.into()),
            seen: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Create with predefined text responses.
    pub fn new(responses: Vec<&str>) -> Self {
        Self::from_queue(responses.iter().map(|s| Ok(LlmResponse::text(*s))).collect())
    }

    /// Create with a single tool call followed by a text response.
    pub fn with_tool_call(name: &str, args: serde_json::Value, final_response: &str) -> Self {
        let tool_response = LlmResponse {
            content: None,
            tool_calls: vec![ToolCallRequest {
                id: "tc_1".to_string(),
                name: name.to_string(),
                arguments: args,
            }],
            finish_reason: "tool_calls".to_string(),
            usage: Usage::default(),
        };

        Self::from_queue(vec![Ok(tool_response), Ok(LlmResponse::text(final_response))])
    }

    /// Create a client whose first call fails.
    pub fn failing(message: &str) -> Self {
        Self::from_queue(vec![Err(crate::error::Error::Llm(message.to_string()))])
    }

    /// Message lists received so far, one entry per call.
    pub fn seen(&self) -> Vec<Vec<Message>> {
        self.seen.lock().unwrap().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl LlmClient for FakeLlmClient {
    async fn chat(
        &self,
        messages: &[Message],
        _tools: &[ToolDefinition],
    ) -> Result<LlmResponse> {
        self.seen.lock().unwrap().push(messages.to_vec());
        let mut responses = self.responses.lock().unwrap();
        responses
            .pop_front()
            .unwrap_or_else(|| Err(crate::error::Error::Llm("No more fake responses".to_string())))
    }

    fn default_model(&self) -> &str {
        "fake-model"
    }
}
