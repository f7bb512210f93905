//! Agent loop - tool-using message processing

use std::sync::Arc;

use tracing::{debug, info};
use crate::Result;
use crate::error::Error;
use crate::tools::ToolRunner;
use super::llm::LlmClient;
use super::message::{Message, ToolCallRequest};

/// The agent loop processes a conversation through LLM and tool execution
pub struct AgentLoop {
    client: Arc<dyn LlmClient>,
    max_iterations: usize,
}

impl AgentLoop {
    /// Create a new agent loop
    pub fn new(client: Arc<dyn LlmClient>, max_iterations: usize) -> Self {
        Self {
            client,
            max_iterations,
        }
    }

    /// Run the loop until the model produces a final answer.
    ///
    /// Returns the text of the last assistant message.
    pub async fn run(&self, mut messages: Vec<Message>, tools: &ToolRunner) -> Result<String> {
        let definitions = tools.definitions();
        info!(
            "Starting agent loop with {} messages and {} tools",
            messages.len(),
            definitions.len()
        );

        for iteration in 0..self.max_iterations {
            debug!("Iteration {}/{}", iteration + 1, self.max_iterations);

            let response = self.client.chat(&messages, &definitions).await?;

            if !response.has_tool_calls() {
                let content = response.content.unwrap_or_default();
                info!("Agent completed with response: {} chars", content.len());
                return Ok(content);
            }

            messages.push(Message::assistant_with_tools(
                response.content.clone().unwrap_or_default(),
                response.tool_calls.clone(),
            ));

            for tool_call in &response.tool_calls {
                let result = self.execute_tool(tools, tool_call).await;
                messages.push(Message::tool_result(&tool_call.id, result));
            }
        }

        Err(Error::MaxIterations)
    }

    async fn execute_tool(&self, tools: &ToolRunner, tool_call: &ToolCallRequest) -> String {
        debug!("Executing tool: {} with args: {}", tool_call.name, tool_call.arguments);

        match tools.execute(&tool_call.name, tool_call.arguments.clone()).await {
            Ok(result) => {
                debug!("Tool {} succeeded: {} chars", tool_call.name, result.len());
                result
            }
            Err(e) => {
                let error_msg = format!("Error: {}", e);
                debug!("Tool {} failed: {}", tool_call.name, error_msg);
                error_msg
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::llm::FakeLlmClient;
    use crate::agent::message::Role;
    use crate::tools::{DummyTool, FailingTool};
    use serde_json::json;

    #[tokio::test]
    async fn test_agent_loop_simple() {
        let client = Arc::new(FakeLlmClient::new(vec!["Hello, human!"]));
        let agent = AgentLoop::new(client, 10);

        let response = agent
            .run(vec![Message::user("Hi there")], &ToolRunner::new())
            .await
            .unwrap();

        assert_eq!(response, "Hello, human!");
    }

    #[tokio::test]
    async fn test_agent_loop_with_tool() {
        let client = Arc::new(FakeLlmClient::with_tool_call(
            "read_doc",
            json!({"id": "onboarding"}),
            "The doc says: welcome",
        ));
        let mut tools = ToolRunner::new();
        tools.register(DummyTool {
            name: "read_doc".to_string(),
            result: "welcome".to_string(),
        });
        let agent = AgentLoop::new(client.clone(), 10);

        let response = agent.run(vec![Message::user("Read onboarding")], &tools).await.unwrap();
        assert_eq!(response, "The doc says: welcome");

        let seen = client.seen();
        assert_eq!(seen.len(), 2);
        let second = &seen[1];
        assert_eq!(second[1].role, Role::Assistant);
        assert_eq!(second[2].role, Role::Tool);
        assert_eq!(second[2].content, "welcome");
        assert_eq!(second[2].tool_call_id.as_deref(), Some("tc_1"));
    }

    #[tokio::test]
    async fn test_tool_failure_is_reported_to_model() {
        let client = Arc::new(FakeLlmClient::with_tool_call(
            "flaky",
            json!({}),
            "Sorry, that failed",
        ));
        let mut tools = ToolRunner::new();
        tools.register(FailingTool { name: "flaky".to_string() });
        let agent = AgentLoop::new(client.clone(), 10);

        let response = agent.run(vec![Message::user("go")], &tools).await.unwrap();
        assert_eq!(response, "Sorry, that failed");
        assert!(client.seen()[1][2].content.starts_with("Error:"));
    }

    #[tokio::test]
    async fn test_max_iterations() {
        let client = Arc::new(FakeLlmClient::with_tool_call(
            "read_doc",
            json!({}),
            "never reached",
        ));
        let mut tools = ToolRunner::new();
        tools.register(DummyTool { name: "read_doc".to_string(), result: String::new() });
        let agent = AgentLoop::new(client, 1);

        let result = agent.run(vec![Message::user("loop")], &tools).await;
        assert!(matches!(result, Err(Error::MaxIterations)));
    }

    #[tokio::test]
    async fn test_llm_error_propagates() {
        let agent = AgentLoop::new(Arc::new(FakeLlmClient::failing("backend down")), 5);
        let result = agent.run(vec![Message::user("hi")], &ToolRunner::new()).await;
        assert!(matches!(result, Err(Error::Llm(_))));
    }
}
