//! Multi-server manager and the [`Tool`] adapter for MCP tools.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{error, info, warn};

use super::client::McpClient;
use super::protocol::ToolInfo;
use crate::config::ServersConfig;
use crate::tools::{Tool, ToolRunner};
use crate::Result;

/// A tool served by an MCP server.
pub struct McpTool {
    client: Arc<McpClient>,
    info: ToolInfo,
}

impl McpTool {
    pub fn new(client: Arc<McpClient>, info: ToolInfo) -> Self {
        Self { client, info }
    }

    /// Name of the server providing this tool.
    pub fn server(&self) -> &str {
        self.client.name()
    }
}

#[async_trait]
impl Tool for McpTool {
    fn name(&self) -> &str {
        &self.info.name
    }

    fn description(&self) -> &str {
        self.info.description.as_deref().unwrap_or("")
    }

    fn parameters(&self) -> Value {
        self.info
            .input_schema
            .clone()
            .unwrap_or_else(|| json!({"type": "object", "properties": {}}))
    }

    async fn execute(&self, params: Value) -> Result<String> {
        self.client.call_tool(&self.info.name, params).await
    }
}

/// Owns the connections to every configured MCP server.
#[derive(Default)]
pub struct McpManager {
    clients: Vec<Arc<McpClient>>,
}

impl McpManager {
    /// Start every configured server. Servers that fail to start are
    /// logged and skipped.
    pub async fn connect(config: &ServersConfig) -> Self {
        let mut clients = Vec::with_capacity(config.servers.len());

        for (name, server) in &config.servers {
            match McpClient::spawn(name, server).await {
                Ok(client) => clients.push(Arc::new(client)),
                Err(e) => error!("Failed to start MCP server {}: {}", name, e),
            }
        }

        info!("Connected to {}/{} MCP servers", clients.len(), config.servers.len());
        Self { clients }
    }

    /// Build a manager from already connected clients.
    pub fn from_clients(clients: Vec<McpClient>) -> Self {
        Self {
            clients: clients.into_iter().map(Arc::new).collect(),
        }
    }

    pub fn server_count(&self) -> usize {
        self.clients.len()
    }

    /// Collect tools from every server. A server whose listing fails is skipped.
    pub async fn tools(&self) -> Vec<McpTool> {
        let mut tools = Vec::new();
        for client in &self.clients {
            match client.list_tools().await {
                Ok(infos) => tools.extend(
                    infos.into_iter().map(|info| McpTool::new(client.clone(), info)),
                ),
                Err(e) => warn!("Could not list tools from MCP server {}: {}", client.name(), e),
            }
        }
        tools
    }

    /// Register every server's tools. Returns how many were registered.
    pub async fn register_tools(&self, runner: &mut ToolRunner) -> usize {
        let mut registered = 0;
        for tool in self.tools().await {
            if runner.register(tool) {
                registered += 1;
            }
        }
        info!("Number of tools: {}", registered);
        registered
    }

    /// Stop every server process.
    pub async fn shutdown(&self) {
        for client in &self.clients {
            client.shutdown().await;
        }
    }
}
