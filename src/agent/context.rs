//! Context builder for agent prompts.
//!
//! Turns a persona prompt, the asking user's name and the recent thread
//! history into the message list sent to the model.

use super::message::{Message, ThreadMessage};
use super::prompt::PromptTemplate;

/// Maximum thread messages included in a conversation turn.
pub const THREAD_HISTORY_LIMIT: usize = 7;

/// Keep only the most recent [`THREAD_HISTORY_LIMIT`] messages.
pub fn window(history: &[ThreadMessage]) -> &[ThreadMessage] {
    if history.len() > THREAD_HISTORY_LIMIT {
        &history[history.len() - THREAD_HISTORY_LIMIT..]
    } else {
        history
    }
}

/// Prompt context shared by every conversation turn.
#[derive(Debug, Clone)]
pub struct Context {
    prompt: PromptTemplate,
    /// Rendered once at construction; the template never changes afterwards.
    cached_prompt: String,
}

impl Context {
    pub fn new(prompt: PromptTemplate) -> Self {
        let cached_prompt = prompt.render();
        Self {
            prompt,
            cached_prompt,
        }
    }

    pub fn prompt(&self) -> &PromptTemplate {
        &self.prompt
    }

    pub fn system_prompt(&self) -> &str {
        &self.cached_prompt
    }

    /// Build messages list for an LLM call.
    ///
    /// Layout: persona prompt, user identity, then the windowed history.
    pub fn build_messages(&self, user_name: &str, history: &[ThreadMessage]) -> Vec<Message> {
        let windowed = window(history);

        let mut messages = Vec::with_capacity(windowed.len() + 2);
        messages.push(Message::system(self.cached_prompt.clone()));
        messages.push(Message::system(format!("User: {}", user_name)));
        messages.extend(windowed.iter().map(ThreadMessage::to_message));

        messages
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new(PromptTemplate::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::message::Role;

    #[test]
    fn test_context_build_messages() {
        let ctx = Context::default();
        let messages = ctx.build_messages("Ben", &[ThreadMessage::human("Hello")]);

        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].role, Role::System);
        assert!(messages[0].content.contains("helpful assistant"));
        assert_eq!(messages[1].role, Role::System);
        assert_eq!(messages[1].content, "User: Ben");
        assert_eq!(messages[2].role, Role::User);
        assert_eq!(messages[2].content, "Hello");
    }

    #[test]
    fn test_history_windowing() {
        let ctx = Context::default();

        let history: Vec<ThreadMessage> = (0..20)
            .map(|i| ThreadMessage::human(format!("Message {}", i)))
            .collect();

        let messages = ctx.build_messages("Ben", &history);

        // Should have: prompt + user + THREAD_HISTORY_LIMIT
        assert_eq!(messages.len(), THREAD_HISTORY_LIMIT + 2);
        assert_eq!(messages[2].content, "Message 13");
        assert_eq!(messages.last().unwrap().content, "Message 19");
    }
}
