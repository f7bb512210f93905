//! Agent module - core agent logic.
//!
//! This module contains:
//! - Message types (Message, ThreadMessage)
//! - LLM client trait and implementations
//! - Agent loop for tool-using conversations
//! - Context builder and persona prompt
//! - [`Agent`], the façade the chat layer talks to
//!
//! # Adding a New LLM Provider
//!
//! See [`llm::ProviderRegistry`] for instructions.

mod assistant;
mod context;
mod loop_impl;
mod message;
pub mod prompt;

// LLM providers in submodule
pub mod llm;

// Re-exports for convenience
pub use assistant::Agent;
pub use context::{window, Context, THREAD_HISTORY_LIMIT};
pub use llm::{LlmClient, LlmResponse, OllamaClient, OpenAiClient, ProviderRegistry, Usage};
pub use loop_impl::AgentLoop;
pub use message::{Message, Role, Speaker, ThreadMessage, ToolCallRequest};
pub use prompt::{Colleague, PromptTemplate};
