//! Agent wrapper - one request/response façade over model + tools.

use std::sync::Arc;

use tracing::info;

use super::context::Context;
use super::llm::LlmClient;
use super::loop_impl::AgentLoop;
use super::message::ThreadMessage;
use super::prompt::PromptTemplate;
use crate::tools::{ToolDefinition, ToolRunner};
use crate::Result;

/// Binds a model client and a tool set into a single `respond` call.
///
/// Built once and shared between concurrent handlers; holds no
/// per-conversation state.
pub struct Agent {
    agent_loop: AgentLoop,
    tools: ToolRunner,
    context: Context,
}

impl Agent {
    pub fn new(
        client: Arc<dyn LlmClient>,
        tools: ToolRunner,
        prompt: PromptTemplate,
        max_iterations: usize,
    ) -> Self {
        Self {
            agent_loop: AgentLoop::new(client, max_iterations),
            tools,
            context: Context::new(prompt),
        }
    }

    /// Produce the assistant's reply to a thread.
    ///
    /// Errors from the model or the loop propagate unchanged.
    pub async fn respond(&self, user_name: &str, history: &[ThreadMessage]) -> Result<String> {
        let messages = self.context.build_messages(user_name, history);
        info!("Responding to {} with {} history messages", user_name, messages.len() - 2);
        self.agent_loop.run(messages, &self.tools).await
    }

    /// Descriptors of the tools the agent can call.
    pub fn tool_definitions(&self) -> Vec<ToolDefinition> {
        self.tools.definitions()
    }

    pub fn context(&self) -> &Context {
        &self.context
    }
}
