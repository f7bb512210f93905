//! OpenAI-compatible chat completions client (OpenAI, OpenRouter, ...)

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, warn};
use url::Url;

use super::types::{convert_messages, convert_tools, ApiErrorBody, ArgumentEncoding, ChatCompletion};
use super::{LlmClient, LlmResponse, Usage};
use crate::agent::message::{Message, ToolCallRequest};
use crate::error::Error;
use crate::tools::ToolDefinition;
use crate::Result;

const TEMPERATURE: f64 = 0.7;
const MAX_COMPLETION_TOKENS: u32 = 1500;

/// Hosted chat-completions client
#[derive(Clone)]
pub struct OpenAiClient {
    endpoint: Url,
    api_key: String,
    model: String,
    client: Client,
}

impl OpenAiClient {
    pub fn new(base_url: &str, api_key: &str, model: &str) -> Result<Self> {
        Ok(Self {
            endpoint: endpoint_url(base_url, "chat/completions")?,
            api_key: api_key.to_string(),
            model: model.to_string(),
            client: Client::new(),
        })
    }

    fn build_request(&self, messages: &[Message], tools: &[ToolDefinition]) -> Value {
        let mut request = json!({
            "model": self.model,
            "messages": convert_messages(messages, ArgumentEncoding::String),
            "temperature": TEMPERATURE,
            "max_completion_tokens": MAX_COMPLETION_TOKENS,
            "stream": false,
        });

        if !tools.is_empty() {
            request["tools"] = Value::Array(convert_tools(tools));
        }

        request
    }

    fn parse_response(&self, completion: ChatCompletion) -> Result<LlmResponse> {
        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| Error::Llm("No choices in response".to_string()))?;

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| {
                let arguments = if tc.function.arguments.trim().is_empty() {
                    json!({})
                } else {
                    serde_json::from_str(&tc.function.arguments).unwrap_or_else(|e| {
                        warn!("Tool call {} has malformed arguments: {}", tc.function.name, e);
                        json!({})
                    })
                };
                ToolCallRequest {
                    id: tc.id,
                    name: tc.function.name,
                    arguments,
                }
            })
            .collect();

        let usage = completion
            .usage
            .map(|u| Usage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            })
            .unwrap_or_default();

        Ok(LlmResponse {
            content: choice.message.content,
            tool_calls,
            finish_reason: choice.finish_reason.unwrap_or_else(|| "stop".to_string()),
            usage,
        })
    }
}

/// Join `path` onto `base`, treating `base` as a directory.
pub(crate) fn endpoint_url(base: &str, path: &str) -> Result<Url> {
    let mut base = base.trim().to_string();
    if !base.ends_with('/') {
        base.push('/');
    }
    Url::parse(&base)
        .and_then(|url| url.join(path))
        .map_err(|e| Error::Config(format!("Invalid base URL {:?}: {}", base, e)))
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn chat(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<LlmResponse> {
        let request = self.build_request(messages, tools);
        debug!("Calling {} with {} messages", self.model, messages.len());

        let response = self.client
            .post(self.endpoint.clone())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;
            let detail = serde_json::from_str::<ApiErrorBody>(&error_text)
                .map(|body| body.error.message)
                .unwrap_or(error_text);
            return Err(Error::Llm(format!("API error ({}): {}", status, detail)));
        }

        let completion: ChatCompletion = response.json().await?;
        self.parse_response(completion)
    }

    fn default_model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn setup(response: ResponseTemplate) -> (MockServer, OpenAiClient) {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({
                "model": "gpt-4-turbo",
                "temperature": 0.7,
                "max_completion_tokens": 1500,
                "stream": false
            })))
            .respond_with(response)
            .mount(&server)
            .await;

        let client =
            OpenAiClient::new(&format!("{}/v1", server.uri()), "sk-test", "gpt-4-turbo").unwrap();
        (server, client)
    }

    #[test]
    fn test_endpoint_url_handles_trailing_slash() {
        let a = endpoint_url("https://api.openai.com/v1/", "chat/completions").unwrap();
        let b = endpoint_url("https://api.openai.com/v1", "chat/completions").unwrap();
        assert_eq!(a.as_str(), "https://api.openai.com/v1/chat/completions");
        assert_eq!(a, b);
    }

    #[test]
    fn test_endpoint_url_rejects_garbage() {
        assert!(endpoint_url("not a url", "chat/completions").is_err());
    }

    #[tokio::test]
    async fn test_chat_text_response() {
        let (_server, client) = setup(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{
                "message": {"role": "assistant", "content": "Hello there"},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 10, "completion_tokens": 3, "total_tokens": 13}
        })))
        .await;

        let response = client.chat(&[Message::user("hi")], &[]).await.unwrap();
        assert_eq!(response.content.as_deref(), Some("Hello there"));
        assert!(!response.has_tool_calls());
        assert_eq!(response.usage.total_tokens, 13);
    }

    #[tokio::test]
    async fn test_chat_tool_call_response() {
        let (_server, client) = setup(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_9",
                        "type": "function",
                        "function": {"name": "search_issues", "arguments": "{\"team\":\"fuji\"}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }]
        })))
        .await;

        let response = client.chat(&[Message::user("open issues?")], &[]).await.unwrap();
        assert!(response.content.is_none());
        assert_eq!(response.tool_calls.len(), 1);
        assert_eq!(response.tool_calls[0].id, "call_9");
        assert_eq!(response.tool_calls[0].arguments["team"], "fuji");
        assert_eq!(response.finish_reason, "tool_calls");
    }

    #[tokio::test]
    async fn test_chat_api_error() {
        let (_server, client) = setup(ResponseTemplate::new(401).set_body_json(json!({
            "error": {"message": "Incorrect API key provided"}
        })))
        .await;

        let err = client.chat(&[Message::user("hi")], &[]).await.unwrap_err();
        assert!(err.to_string().contains("Incorrect API key provided"));
    }
}
