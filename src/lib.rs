//! Parley - Slack assistant relay
//!
//! Direct messages and mentions are answered by a tool-using LLM agent
//! whose tools come from MCP servers. The reply is posted back into the
//! originating Slack thread.

pub mod agent;
pub mod analytics;
pub mod config;
pub mod error;
pub mod mcp;
pub mod slack;
pub mod tools;
pub mod ui;

pub use error::{Error, Result};
