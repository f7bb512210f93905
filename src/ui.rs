use colored::*;
use terminal_size::{Width, Height, terminal_size};

use crate::tools::ToolDefinition;

pub fn print_header(model: &str, provider: &str) {
    let (width, _) = terminal_size().unwrap_or((Width(80), Height(24)));
    let width = width.0 as usize;

    let line = "─".repeat(width);
    println!("{}", line.black().bold());

    let name = "Parley".yellow().bold();
    let version = format!("v{}", env!("CARGO_PKG_VERSION")).black().bold();
    println!("  💬 {} {}", name, version);

    let info = format!("  {}  •  {}", model, provider).cyan();
    println!("{}", info);

    println!("{}", line.black().bold());
}

/// One `label: value` line of the status report.
pub fn print_field(label: &str, value: &str) {
    println!("  {:<18} {}", format!("{}:", label).bold(), value);
}

/// `set` / `not set` marker for secrets; never prints the value.
pub fn secret_marker(value: Option<&str>) -> String {
    match value {
        Some(_) => "✓ set".green().to_string(),
        None => "not set".yellow().to_string(),
    }
}

/// Tool catalogue, one entry per tool, descriptions cut to the terminal width.
pub fn print_tools(tools: &[ToolDefinition]) {
    let (width, _) = terminal_size().unwrap_or((Width(80), Height(24)));
    let room = (width.0 as usize).saturating_sub(8).max(20);

    for tool in tools {
        println!("  {} {}", "•".green(), tool.name.bold());
        let description = tool.description.lines().next().unwrap_or("").trim();
        if !description.is_empty() {
            println!("      {}", clip(description, room).black().bold());
        }
    }
}

fn clip(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    out.push('…');
    out
}

pub fn print_step(msg: &str) {
    println!("  {} {}", "•".green(), msg);
}

pub fn print_success(msg: &str) {
    println!("  {} {}", "✓".green().bold(), msg.green());
}

pub fn print_warning(msg: &str) {
    println!("  {} {}", "⚠️ ".yellow().bold(), msg.yellow());
}

pub fn print_error(msg: &str) {
    println!("  {} {}", "❌".red().bold(), msg.red());
}
