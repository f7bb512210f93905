//! MCP client over a line-delimited JSON-RPC stream.

use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, trace, warn};

use super::protocol::{
    CallToolResult, IncomingMessage, InitializeParams, InitializeResult, JsonRpcNotification,
    JsonRpcRequest, ListToolsResult, ServerInfo, ToolInfo, JSONRPC_VERSION, METHOD_NOT_FOUND,
};
use crate::config::ServerConfig;
use crate::error::Error;
use crate::Result;

type Reader = Lines<BufReader<Box<dyn AsyncRead + Send + Unpin>>>;
type Writer = Box<dyn AsyncWrite + Send + Unpin>;

struct Channel {
    reader: Reader,
    writer: Writer,
}

/// Connection to one MCP server.
///
/// Requests are serialized: the channel lock is held from write until the
/// matching response is read.
pub struct McpClient {
    name: String,
    channel: Mutex<Channel>,
    child: Mutex<Option<Child>>,
    next_id: AtomicU64,
    server_info: Option<ServerInfo>,
}

impl McpClient {
    /// Spawn a stdio server process and complete the initialize handshake.
    pub async fn spawn(name: &str, config: &ServerConfig) -> Result<Self> {
        if config.transport != "stdio" {
            return Err(Error::Mcp(format!(
                "server {:?} uses unsupported transport {:?}",
                name, config.transport
            )));
        }

        let mut child = Command::new(&config.command)
            .args(&config.args)
            .envs(&config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                Error::Mcp(format!(
                    "failed to spawn {:?} for {:?}: {}",
                    config.command, name, e
                ))
            })?;

        let stdin = child.stdin.take()
            .ok_or_else(|| Error::Mcp("failed to capture stdin".to_string()))?;
        let stdout = child.stdout.take()
            .ok_or_else(|| Error::Mcp("failed to capture stdout".to_string()))?;

        let mut client = Self::from_streams(name, Box::new(stdout), Box::new(stdin));
        *client.child.get_mut() = Some(child);
        client.initialize().await?;
        Ok(client)
    }

    /// Build a client over arbitrary streams. Call [`McpClient::initialize`] next.
    pub fn from_streams(
        name: &str,
        reader: Box<dyn AsyncRead + Send + Unpin>,
        writer: Box<dyn AsyncWrite + Send + Unpin>,
    ) -> Self {
        Self {
            name: name.to_string(),
            channel: Mutex::new(Channel {
                reader: BufReader::new(reader).lines(),
                writer,
            }),
            child: Mutex::new(None),
            next_id: AtomicU64::new(1),
            server_info: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn server_info(&self) -> Option<&ServerInfo> {
        self.server_info.as_ref()
    }

    /// Perform the `initialize` handshake.
    pub async fn initialize(&mut self) -> Result<()> {
        let params = serde_json::to_value(InitializeParams::default())?;
        let result = self.request("initialize", Some(params)).await?;
        let init: InitializeResult = serde_json::from_value(result)?;

        self.notify("notifications/initialized", None).await?;

        info!(
            "MCP server {} initialized (protocol {}, server {})",
            self.name,
            init.protocol_version,
            init.server_info.as_ref().map(|s| s.name.as_str()).unwrap_or("unknown")
        );
        self.server_info = init.server_info;
        Ok(())
    }

    /// List every tool the server offers, following pagination cursors.
    pub async fn list_tools(&self) -> Result<Vec<ToolInfo>> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let params = cursor.as_ref().map(|c| json!({ "cursor": c }));
            let result = self.request("tools/list", params).await?;
            let page: ListToolsResult = serde_json::from_value(result)?;
            tools.extend(page.tools);

            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => break,
            }
        }

        debug!("MCP server {} offers {} tools", self.name, tools.len());
        Ok(tools)
    }

    /// Call a tool and return its text output.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<String> {
        let arguments = match arguments {
            Value::Null => json!({}),
            other => other,
        };
        let result = self
            .request("tools/call", Some(json!({ "name": name, "arguments": arguments })))
            .await?;
        let result: CallToolResult = serde_json::from_value(result)?;

        if result.is_error {
            return Err(Error::Tool(format!("{} failed: {}", name, result.text())));
        }
        Ok(result.text())
    }

    /// Kill the server process, if this client owns one.
    pub async fn shutdown(&self) {
        let mut child = self.child.lock().await;
        if let Some(child) = child.as_mut() {
            if let Err(e) = child.kill().await {
                warn!("Failed to stop MCP server {}: {}", self.name, e);
            } else {
                info!("MCP server {} stopped", self.name);
            }
        }
        *child = None;
    }

    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = JsonRpcRequest::new(id, method, params);

        let mut channel = self.channel.lock().await;
        write_line(&mut channel.writer, &serde_json::to_string(&request)?).await?;

        loop {
            let line = channel.reader.next_line().await?.ok_or_else(|| {
                Error::Mcp(format!("server {} closed the connection", self.name))
            })?;
            if line.trim().is_empty() {
                continue;
            }
            trace!("MCP {} <- {}", self.name, line);

            let message: IncomingMessage = match serde_json::from_str(&line) {
                Ok(message) => message,
                Err(e) => {
                    warn!("Ignoring malformed line from MCP server {}: {}", self.name, e);
                    continue;
                }
            };

            if message.is_response_to(id) {
                if let Some(error) = message.error {
                    return Err(Error::Mcp(format!(
                        "{} returned error {} for {}: {}",
                        self.name, error.code, method, error.message
                    )));
                }
                return Ok(message.result.unwrap_or(Value::Null));
            }

            if message.is_server_request() {
                // Sampling, roots and friends are not offered by this client.
                let reply = json!({
                    "jsonrpc": JSONRPC_VERSION,
                    "id": message.id,
                    "error": {"code": METHOD_NOT_FOUND, "message": "method not supported"}
                });
                write_line(&mut channel.writer, &reply.to_string()).await?;
            }
        }
    }

    async fn notify(&self, method: &str, params: Option<Value>) -> Result<()> {
        let notification = JsonRpcNotification::new(method, params);
        let mut channel = self.channel.lock().await;
        write_line(&mut channel.writer, &serde_json::to_string(&notification)?).await
    }
}

async fn write_line(writer: &mut Writer, line: &str) -> Result<()> {
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}

/// In-process fake server used by MCP tests.
#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use tokio::io::duplex;

    /// Start a fake server answering with `handler(method, params)` and
    /// return an initialized client connected to it.
    pub async fn connect<F>(name: &str, handler: F) -> McpClient
    where
        F: Fn(&str, &Value) -> std::result::Result<Value, String> + Send + 'static,
    {
        let (client_side, server_side) = duplex(64 * 1024);
        let (client_read, client_write) = tokio::io::split(client_side);
        let (server_read, mut server_write) = tokio::io::split(server_side);

        tokio::spawn(async move {
            let mut lines = BufReader::new(server_read).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let message: Value = match serde_json::from_str(&line) {
                    Ok(v) => v,
                    Err(_) => continue,
                };
                let Some(id) = message.get("id").cloned() else { continue };
                let method = message["method"].as_str().unwrap_or_default().to_string();
                let params = message.get("params").cloned().unwrap_or(Value::Null);

                let reply = if method == "initialize" {
                    json!({"jsonrpc": "2.0", "id": id, "result": {
                        "protocolVersion": "2024-11-05",
                        "capabilities": {"tools": {}},
                        "serverInfo": {"name": "fake", "version": "0.0.1"}
                    }})
                } else {
                    match handler(&method, &params) {
                        Ok(result) => json!({"jsonrpc": "2.0", "id": id, "result": result}),
                        Err(message) => json!({
                            "jsonrpc": "2.0",
                            "id": id,
                            "error": {"code": -32000, "message": message}
                        }),
                    }
                };
                let mut out = reply.to_string();
                out.push('\n');
                if server_write.write_all(out.as_bytes()).await.is_err() {
                    break;
                }
            }
        });

        let mut client =
            McpClient::from_streams(name, Box::new(client_read), Box::new(client_write));
        client.initialize().await.unwrap();
        client
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn handler(method: &str, params: &Value) -> std::result::Result<Value, String> {
        match method {
            "tools/list" => match params.get("cursor").and_then(Value::as_str) {
                None => Ok(json!({
                    "tools": [{"name": "read_graph", "description": "Read the memory graph"}],
                    "nextCursor": "page2"
                })),
                Some("page2") => Ok(json!({
                    "tools": [{"name": "search_nodes", "inputSchema": {"type": "object"}}]
                })),
                Some(other) => Err(format!("bad cursor {}", other)),
            },
            "tools/call" => match params["name"].as_str() {
                Some("echo") => Ok(json!({
                    "content": [{"type": "text", "text": params["arguments"]["text"]}]
                })),
                Some("broken") => Ok(json!({
                    "content": [{"type": "text", "text": "database locked"}],
                    "isError": true
                })),
                _ => Err("unknown tool".to_string()),
            },
            _ => Err("method not found".to_string()),
        }
    }

    #[tokio::test]
    async fn test_initialize_records_server_info() {
        let client = fake::connect("memory", handler).await;
        assert_eq!(client.server_info().unwrap().name, "fake");
        assert_eq!(client.name(), "memory");
    }

    #[tokio::test]
    async fn test_list_tools_follows_cursor() {
        let client = fake::connect("memory", handler).await;
        let tools = client.list_tools().await.unwrap();
        let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["read_graph", "search_nodes"]);
    }

    #[tokio::test]
    async fn test_call_tool_text() {
        let client = fake::connect("memory", handler).await;
        let out = client.call_tool("echo", json!({"text": "hello"})).await.unwrap();
        assert_eq!(out, "hello");
    }

    #[tokio::test]
    async fn test_call_tool_is_error() {
        let client = fake::connect("memory", handler).await;
        let err = client.call_tool("broken", json!({})).await.unwrap_err();
        assert!(matches!(err, Error::Tool(_)));
        assert!(err.to_string().contains("database locked"));
    }

    #[tokio::test]
    async fn test_rpc_error_maps_to_mcp_error() {
        let client = fake::connect("memory", handler).await;
        let err = client.call_tool("nope", json!({})).await.unwrap_err();
        assert!(matches!(err, Error::Mcp(_)));
    }

    #[tokio::test]
    async fn test_spawn_rejects_unknown_transport() {
        let config = ServerConfig {
            command: "irrelevant".to_string(),
            args: vec![],
            env: HashMap::new(),
            transport: "sse".to_string(),
        };
        let result = McpClient::spawn("remote", &config).await;
        assert!(matches!(result, Err(Error::Mcp(_))));
    }

    #[tokio::test]
    async fn test_spawn_missing_binary_fails() {
        let config = ServerConfig {
            command: "/definitely/not/a/real/mcp-server".to_string(),
            args: vec![],
            env: HashMap::new(),
            transport: "stdio".to_string(),
        };
        assert!(McpClient::spawn("ghost", &config).await.is_err());
    }
}
