//! Parley CLI entry point

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use parley::agent::{Agent, PromptTemplate, ProviderRegistry};
use parley::config::{load_servers, ModelSelection, Settings};
use parley::mcp::McpManager;
use parley::slack::SlackAgent;
use parley::tools::ToolRunner;
use parley::{analytics, ui};

#[derive(Parser)]
#[command(name = "parley")]
#[command(about = "💬 Parley - Slack assistant backed by a tool-using LLM agent")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// MCP server configuration file (overrides MCP_SERVERS_CONFIG)
    #[arg(long, global = true)]
    servers: Option<PathBuf>,

    /// Load environment variables from this file instead of ./.env
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to Slack and answer messages (default)
    Run,

    /// Start the MCP servers and list their tools
    Tools,

    /// Show the resolved configuration
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.env_file {
        Some(path) => {
            dotenvy::from_path(path)
                .with_context(|| format!("Failed to load env file {}", path.display()))?;
        }
        None => {
            dotenvy::dotenv().ok();
        }
    }

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut settings = Settings::from_env()?;
    if let Some(path) = cli.servers {
        settings.servers_config = path;
    }

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_bot(settings).await?,
        Commands::Tools => list_tools(&settings).await?,
        Commands::Status => print_status(&settings),
    }

    Ok(())
}

async fn run_bot(settings: Settings) -> Result<()> {
    settings.require_slack_tokens()?;
    let selection = settings.model_selection()?;
    let servers = load_servers(&settings.servers_config)?;

    let mcp = McpManager::connect(&servers).await;
    let mut tools = ToolRunner::new();
    mcp.register_tools(&mut tools).await;

    let client = ProviderRegistry::create(&selection)?;
    let agent = Arc::new(Agent::new(
        client,
        tools,
        PromptTemplate::default(),
        settings.max_iterations,
    ));
    let analytics = analytics::sink_for(settings.analytics_write_key.as_deref());
    let slack = SlackAgent::new(&settings, agent, analytics)?;

    let exit_flag = Arc::new(AtomicBool::new(false));
    let r = exit_flag.clone();
    if let Err(e) = ctrlc::set_handler(move || r.store(true, Ordering::SeqCst)) {
        warn!("Could not install Ctrl+C handler: {}", e);
    }

    slack.start().await;

    // Keep the main task alive until interrupted
    while !exit_flag.load(Ordering::SeqCst) {
        tokio::time::sleep(Duration::from_secs(1)).await;
    }

    info!("Shutting down...");
    slack.cleanup().await;
    mcp.shutdown().await;
    Ok(())
}

async fn list_tools(settings: &Settings) -> Result<()> {
    let servers = load_servers(&settings.servers_config)?;
    ui::print_step(&format!(
        "Starting {} MCP servers from {}",
        servers.servers.len(),
        settings.servers_config.display()
    ));

    let mcp = McpManager::connect(&servers).await;
    let mut runner = ToolRunner::new();
    let count = mcp.register_tools(&mut runner).await;

    if mcp.server_count() < servers.servers.len() {
        ui::print_warning(&format!(
            "{} of {} servers failed to start",
            servers.servers.len() - mcp.server_count(),
            servers.servers.len()
        ));
    }
    ui::print_success(&format!("{} tools available", count));
    ui::print_tools(&runner.definitions());

    mcp.shutdown().await;
    Ok(())
}

fn print_status(settings: &Settings) {
    let (model, provider) = match settings.model_selection() {
        Ok(ModelSelection::Local { name, .. }) => (name, "ollama"),
        Ok(ModelSelection::Hosted { id, .. }) => (id, "openai-compatible"),
        Err(e) => {
            ui::print_error(&e.to_string());
            (settings.llm_model.clone(), "unresolved")
        }
    };
    ui::print_header(&model, provider);

    let base_url = if settings.is_local_model() {
        &settings.ollama_base_url
    } else {
        &settings.openai_api_base_url
    };
    ui::print_field("Base URL", base_url);
    ui::print_field("OpenAI key", &ui::secret_marker(settings.openai_api_key.as_deref()));
    ui::print_field("OpenRouter key", &ui::secret_marker(settings.openrouter_api_key.as_deref()));
    ui::print_field("Slack bot token", &ui::secret_marker(settings.slack_bot_token.as_deref()));
    ui::print_field("Slack app token", &ui::secret_marker(settings.slack_app_token.as_deref()));
    ui::print_field("Analytics", &ui::secret_marker(settings.analytics_write_key.as_deref()));
    ui::print_field("Max iterations", &settings.max_iterations.to_string());

    let servers = match load_servers(&settings.servers_config) {
        Ok(config) => format!(
            "{} ({} servers)",
            settings.servers_config.display(),
            config.servers.len()
        ),
        Err(e) => format!("{} ({})", settings.servers_config.display(), e),
    };
    ui::print_field("MCP servers", &servers);
}
