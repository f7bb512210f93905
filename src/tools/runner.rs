//! Tool runner - manages and executes tools

use std::collections::HashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;
use crate::Result;
use crate::error::Error;
use super::Tool;

/// Tool definition for LLM
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Tool runner manages registered tools and executes them
///
/// Registration order is preserved so definitions and listings are stable.
pub struct ToolRunner {
    tools: Vec<Box<dyn Tool>>,
    index: HashMap<String, usize>,
}

impl ToolRunner {
    /// Create an empty tool runner
    pub fn new() -> Self {
        Self {
            tools: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Register a tool. Returns `false` if the name is already taken;
    /// the first registration wins.
    pub fn register<T: Tool + 'static>(&mut self, tool: T) -> bool {
        self.register_boxed(Box::new(tool))
    }

    /// Register an already boxed tool
    pub fn register_boxed(&mut self, tool: Box<dyn Tool>) -> bool {
        let name = tool.name().to_string();
        if self.index.contains_key(&name) {
            warn!("Duplicate tool name {:?}, keeping the first registration", name);
            return false;
        }
        self.index.insert(name, self.tools.len());
        self.tools.push(tool);
        true
    }

    /// Get tool definitions for LLM
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter()
            .map(|t| t.to_definition())
            .collect()
    }

    /// Execute a tool by name
    pub async fn execute(&self, name: &str, params: Value) -> Result<String> {
        let tool = self.index.get(name)
            .map(|&i| &self.tools[i])
            .ok_or_else(|| Error::Tool(format!("Unknown tool: {}", name)))?;

        tool.execute(params).await
    }

    /// Check if a tool exists
    pub fn has(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// List registered tool names
    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::DummyTool;

    #[tokio::test]
    async fn test_tool_runner_register_and_execute() {
        let mut runner = ToolRunner::new();
        runner.register(DummyTool {
            name: "test_tool".to_string(),
            result: "success".to_string(),
        });

        assert!(runner.has("test_tool"));

        let result = runner.execute("test_tool", serde_json::json!({})).await.unwrap();
        assert_eq!(result, "success");
    }

    #[tokio::test]
    async fn test_tool_runner_unknown_tool() {
        let runner = ToolRunner::new();
        let result = runner.execute("unknown", serde_json::json!({})).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_duplicate_keeps_first() {
        let mut runner = ToolRunner::new();
        assert!(runner.register(DummyTool {
            name: "t".to_string(),
            result: "first".to_string(),
        }));
        assert!(!runner.register(DummyTool {
            name: "t".to_string(),
            result: "second".to_string(),
        }));

        assert_eq!(runner.len(), 1);
        let result = runner.execute("t", serde_json::json!({})).await.unwrap();
        assert_eq!(result, "first");
    }

    #[test]
    fn test_registration_order_preserved() {
        let mut runner = ToolRunner::new();
        for name in ["zeta", "alpha", "mid"] {
            runner.register(DummyTool { name: name.to_string(), result: String::new() });
        }
        assert_eq!(runner.tool_names(), vec!["zeta", "alpha", "mid"]);
        let defs = runner.definitions();
        assert_eq!(defs[1].name, "alpha");
    }
}
