//! Configuration management
//!
//! Settings come from environment variables (optionally seeded from a `.env`
//! file by the binary). The MCP server list comes from a JSON file.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::Result;

/// Prefix marking a model served by a local Ollama process.
pub const LOCAL_MODEL_PREFIX: &str = "ollama/";

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1/";
pub const DEFAULT_MODEL: &str = "gpt-4-turbo";
pub const DEFAULT_OLLAMA_BASE_URL: &str = "http://localhost:11434";
pub const DEFAULT_SERVERS_CONFIG: &str = "servers_config.json";
pub const DEFAULT_MAX_ITERATIONS: usize = 20;

/// Immutable runtime settings, built once at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    pub slack_bot_token: Option<String>,
    pub slack_app_token: Option<String>,
    pub openai_api_base_url: String,
    pub openai_api_key: Option<String>,
    pub openrouter_api_key: Option<String>,
    pub llm_model: String,
    pub ollama_base_url: String,
    pub analytics_write_key: Option<String>,
    pub servers_config: PathBuf,
    pub max_iterations: usize,
}

/// Which backend serves the language model, resolved once from [`Settings`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSelection {
    /// Local inference server; `name` is the model name without the prefix.
    Local { name: String, base_url: String },
    /// OpenAI-compatible hosted API.
    Hosted {
        id: String,
        api_key: String,
        base_url: String,
    },
}

impl ModelSelection {
    /// Model name as shown in logs and status output.
    pub fn model(&self) -> &str {
        match self {
            ModelSelection::Local { name, .. } => name,
            ModelSelection::Hosted { id, .. } => id,
        }
    }

    pub fn base_url(&self) -> &str {
        match self {
            ModelSelection::Local { base_url, .. } | ModelSelection::Hosted { base_url, .. } => {
                base_url
            }
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            slack_bot_token: None,
            slack_app_token: None,
            openai_api_base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            openai_api_key: None,
            openrouter_api_key: None,
            llm_model: DEFAULT_MODEL.to_string(),
            ollama_base_url: DEFAULT_OLLAMA_BASE_URL.to_string(),
            analytics_write_key: None,
            servers_config: PathBuf::from(DEFAULT_SERVERS_CONFIG),
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }
}

impl Settings {
    /// Read settings from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through an arbitrary variable lookup.
    ///
    /// Empty values are treated the same as unset ones.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let max_iterations = match get("AGENT_MAX_ITERATIONS") {
            Some(raw) => raw.trim().parse::<usize>().map_err(|_| {
                Error::Config(format!("AGENT_MAX_ITERATIONS must be a number, got {:?}", raw))
            })?,
            None => defaults.max_iterations,
        };

        Ok(Self {
            slack_bot_token: get("SLACK_BOT_TOKEN"),
            slack_app_token: get("SLACK_APP_TOKEN"),
            openai_api_base_url: get("OPENAI_API_BASE_URL").unwrap_or(defaults.openai_api_base_url),
            openai_api_key: get("OPENAI_API_KEY"),
            openrouter_api_key: get("OPENROUTER_API_KEY"),
            llm_model: get("LLM_MODEL").unwrap_or(defaults.llm_model),
            ollama_base_url: get("OLLAMA_BASE_URL").unwrap_or(defaults.ollama_base_url),
            analytics_write_key: get("SEGMENT_WRITE_KEY"),
            servers_config: get("MCP_SERVERS_CONFIG")
                .map(PathBuf::from)
                .unwrap_or(defaults.servers_config),
            max_iterations,
        })
    }

    /// Whether the configured model runs on the local inference server.
    pub fn is_local_model(&self) -> bool {
        self.llm_model.starts_with(LOCAL_MODEL_PREFIX)
    }

    /// The API key to use for the configured model.
    ///
    /// Local models need no key. An OpenRouter key wins when the base URL
    /// points at OpenRouter; otherwise GPT models use the OpenAI key.
    pub fn llm_api_key(&self) -> Result<Option<String>> {
        if self.is_local_model() {
            return Ok(None);
        }

        if let Some(key) = &self.openrouter_api_key {
            if self.openai_api_base_url.contains("openrouter") {
                return Ok(Some(key.clone()));
            }
        }

        if let Some(key) = &self.openai_api_key {
            if self.llm_model.to_lowercase().contains("gpt") {
                return Ok(Some(key.clone()));
            }
        }

        Err(Error::Config(format!(
            "No API key found for the selected model: {}",
            self.llm_model
        )))
    }

    /// Resolve the model backend.
    pub fn model_selection(&self) -> Result<ModelSelection> {
        if let Some(name) = self.llm_model.strip_prefix(LOCAL_MODEL_PREFIX) {
            if name.is_empty() {
                return Err(Error::Config(format!(
                    "Local model identifier {:?} has no model name",
                    self.llm_model
                )));
            }
            return Ok(ModelSelection::Local {
                name: name.to_string(),
                base_url: self.ollama_base_url.clone(),
            });
        }

        let api_key = self.llm_api_key()?.ok_or_else(|| {
            Error::Config(format!("No API key found for the selected model: {}", self.llm_model))
        })?;

        Ok(ModelSelection::Hosted {
            id: self.llm_model.clone(),
            api_key,
            base_url: self.openai_api_base_url.clone(),
        })
    }

    /// Both Slack tokens, or a configuration error naming the missing ones.
    pub fn require_slack_tokens(&self) -> Result<(String, String)> {
        match (&self.slack_bot_token, &self.slack_app_token) {
            (Some(bot), Some(app)) => Ok((bot.clone(), app.clone())),
            _ => Err(Error::Config(
                "SLACK_BOT_TOKEN and SLACK_APP_TOKEN must be set in environment variables"
                    .to_string(),
            )),
        }
    }
}

/// One external tool-provider process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub command: String,

    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default)]
    pub env: HashMap<String, String>,

    #[serde(default = "default_transport")]
    pub transport: String,
}

fn default_transport() -> String {
    "stdio".to_string()
}

/// All configured tool-provider processes, keyed by server name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServersConfig {
    pub servers: BTreeMap<String, ServerConfig>,
}

impl ServersConfig {
    /// Parse the server file contents.
    ///
    /// Accepts both `{"mcpServers": {...}}` and a bare map of servers.
    pub fn parse(content: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(content)?;
        let servers_value = match value.get("mcpServers") {
            Some(inner) => inner.clone(),
            None => value,
        };

        if !servers_value.is_object() {
            return Err(Error::Config(
                "Server configuration must be a JSON object".to_string(),
            ));
        }

        let servers: BTreeMap<String, ServerConfig> = serde_json::from_value(servers_value)?;
        Ok(Self { servers })
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }
}

/// Load the MCP server configuration file.
pub fn load_servers(path: &Path) -> Result<ServersConfig> {
    if !path.exists() {
        return Err(Error::Config(format!(
            "Server configuration not found at {:?}",
            path
        )));
    }

    let content = std::fs::read_to_string(path)?;
    ServersConfig::parse(&content)
}
