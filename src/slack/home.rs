//! App Home view: the tool catalogue plus usage notes.

use serde_json::{json, Value};

use crate::tools::ToolDefinition;

/// Maximum characters per section block text element
const MAX_SECTION_CHARS: usize = 3000;

/// Maximum blocks per view (Slack limit is 100)
const MAX_BLOCKS: usize = 100;

const USAGE: &str = "*How to use me*\n\
    • Send me a direct message and I'll reply in the thread.\n\
    • Mention me in a channel with `@` and I'll answer in that thread.\n\
    • I keep the last few messages of a thread as context, so reply in-thread to follow up.";

fn section(text: &str) -> Value {
    json!({
        "type": "section",
        "text": { "type": "mrkdwn", "text": truncate(text, MAX_SECTION_CHARS) }
    })
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars - 1).collect();
    out.push('…');
    out
}

/// Build the `home` view listing every tool.
pub fn home_view(tools: &[ToolDefinition]) -> Value {
    let mut blocks = vec![
        json!({
            "type": "header",
            "text": { "type": "plain_text", "text": "Welcome to your assistant" }
        }),
        section(USAGE),
        json!({ "type": "divider" }),
        section(&format!("*Available tools* ({})", tools.len())),
    ];

    // Room for the overflow note and the closing context block.
    let room = MAX_BLOCKS - blocks.len() - 2;

    if tools.is_empty() {
        blocks.push(section("_No tools are connected right now._"));
    }

    for tool in tools.iter().take(room) {
        let text = if tool.description.trim().is_empty() {
            format!("*{}*", tool.name)
        } else {
            format!("*{}*\n{}", tool.name, tool.description.trim())
        };
        blocks.push(section(&text));
    }

    if tools.len() > room {
        blocks.push(section(&format!("_…and {} more tools_", tools.len() - room)));
    }

    blocks.push(json!({
        "type": "context",
        "elements": [{
            "type": "mrkdwn",
            "text": "I only read from connected tools. \
                I never create or change anything on your behalf."
        }]
    }));

    json!({ "type": "home", "blocks": blocks })
}
