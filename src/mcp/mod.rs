//! MCP tool source.
//!
//! Starts the tool-provider processes listed in the server configuration
//! file, speaks JSON-RPC to them over stdio and exposes their tools as
//! [`crate::tools::Tool`] implementations.

mod client;
mod manager;
pub mod protocol;

pub use client::McpClient;
pub use manager::{McpManager, McpTool};
pub use protocol::ToolInfo;
