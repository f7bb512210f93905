//! Local Ollama client using the native `/api/chat` endpoint

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;
use url::Url;
use uuid::Uuid;

use super::openai::endpoint_url;
use super::types::{convert_messages, convert_tools, ArgumentEncoding, OllamaChatResponse};
use super::{LlmClient, LlmResponse, Usage};
use crate::agent::message::{Message, ToolCallRequest};
use crate::error::Error;
use crate::tools::ToolDefinition;
use crate::Result;

/// Client for a locally running Ollama server
#[derive(Clone)]
pub struct OllamaClient {
    endpoint: Url,
    model: String,
    client: Client,
}

impl OllamaClient {
    pub fn new(base_url: &str, model: &str) -> Result<Self> {
        Ok(Self {
            endpoint: endpoint_url(base_url, "api/chat")?,
            model: model.to_string(),
            client: Client::new(),
        })
    }

    fn parse_response(&self, response: OllamaChatResponse) -> LlmResponse {
        // Ollama does not assign call ids, the agent loop needs them to pair results.
        let tool_calls: Vec<ToolCallRequest> = response
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| ToolCallRequest {
                id: format!("call_{}", Uuid::new_v4().simple()),
                name: tc.function.name,
                arguments: match tc.function.arguments {
                    Value::Null => json!({}),
                    args => args,
                },
            })
            .collect();

        let prompt_tokens = response.prompt_eval_count.unwrap_or(0);
        let completion_tokens = response.eval_count.unwrap_or(0);

        let content = if response.message.content.is_empty() && !tool_calls.is_empty() {
            None
        } else {
            Some(response.message.content)
        };

        LlmResponse {
            content,
            tool_calls,
            finish_reason: response.done_reason.unwrap_or_else(|| "stop".to_string()),
            usage: Usage {
                prompt_tokens,
                completion_tokens,
                total_tokens: prompt_tokens + completion_tokens,
            },
        }
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
    async fn chat(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<LlmResponse> {
        let mut request = json!({
            "model": self.model,
            "messages": convert_messages(messages, ArgumentEncoding::Object),
            "stream": false,
        });

        if !tools.is_empty() {
            request["tools"] = Value::Array(convert_tools(tools));
        }

        debug!("Calling ollama/{} with {} messages", self.model, messages.len());

        let response = self.client
            .post(self.endpoint.clone())
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;
            return Err(Error::Llm(format!("Ollama error ({}): {}", status, error_text)));
        }

        let chat: OllamaChatResponse = response.json().await?;
        Ok(self.parse_response(chat))
    }

    fn default_model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn setup(body: Value) -> (MockServer, OllamaClient) {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_partial_json(json!({"model": "llama3:8b", "stream": false})))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&server)
            .await;

        let client = OllamaClient::new(&server.uri(), "llama3:8b").unwrap();
        (server, client)
    }

    #[tokio::test]
    async fn test_chat_text() {
        let (_server, client) = setup(json!({
            "model": "llama3:8b",
            "message": {"role": "assistant", "content": "Howdy"},
            "done": true,
            "done_reason": "stop",
            "prompt_eval_count": 20,
            "eval_count": 4
        }))
        .await;

        let response = client.chat(&[Message::user("hi")], &[]).await.unwrap();
        assert_eq!(response.content.as_deref(), Some("Howdy"));
        assert_eq!(response.usage.total_tokens, 24);
    }

    #[tokio::test]
    async fn test_chat_tool_calls_get_ids() {
        let (_server, client) = setup(json!({
            "message": {
                "role": "assistant",
                "content": "",
                "tool_calls": [
                    {"function": {"name": "read_page", "arguments": {"id": "abc"}}},
                    {"function": {"name": "list_pages"}}
                ]
            },
            "done": true
        }))
        .await;

        let response = client.chat(&[Message::user("read abc")], &[]).await.unwrap();
        assert!(response.content.is_none());
        assert_eq!(response.tool_calls.len(), 2);
        assert_ne!(response.tool_calls[0].id, response.tool_calls[1].id);
        assert_eq!(response.tool_calls[0].arguments["id"], "abc");
        assert_eq!(response.tool_calls[1].arguments, json!({}));
    }
}
