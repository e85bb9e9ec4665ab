//! Slash commands available at the `Query:` prompt.

use switchboard_mcp::SessionManager;
use switchboard_types::Message;

pub enum SlashResult {
    Continue,
    Break,
    Unknown,
}

/// Handle `input` if it is a slash command. Returns `None` for ordinary
/// queries.
pub async fn handle_slash_command(
    input: &str,
    manager: &SessionManager,
    history: &mut Vec<Message>,
) -> Option<SlashResult> {
    if !input.starts_with('/') {
        return None;
    }

    let cmd = input.split_whitespace().next().unwrap_or(input);
    let result = match cmd {
        "/quit" | "/exit" => SlashResult::Break,
        "/tools" => {
            print_tools(manager).await;
            SlashResult::Continue
        }
        "/servers" => {
            print_servers(manager).await;
            SlashResult::Continue
        }
        "/clear" => {
            history.clear();
            eprintln!("Conversation cleared.");
            SlashResult::Continue
        }
        "/help" => {
            print_help();
            SlashResult::Continue
        }
        _ => SlashResult::Unknown,
    };
    Some(result)
}

async fn print_tools(manager: &SessionManager) {
    let entries = manager.catalog_entries().await;
    if entries.is_empty() {
        eprintln!("No tools available.");
        return;
    }
    eprintln!("Tools:");
    for (backend, tool) in &entries {
        if tool.description.is_empty() {
            eprintln!("  {} ({backend})", tool.name);
        } else {
            eprintln!("  {} ({backend}): {}", tool.name, tool.description);
        }
    }
}

async fn print_servers(manager: &SessionManager) {
    let summary = manager.server_summary().await;
    if summary.is_empty() {
        eprintln!("No servers connected.");
        return;
    }
    eprintln!("Servers:");
    for (backend, tool_count) in summary {
        let info = match manager.session(&backend).await {
            Some(session) => session
                .server_info()
                .map(|info| format!(" {} {}", info.name, info.version))
                .unwrap_or_default(),
            None => String::new(),
        };
        eprintln!("  {backend}{info}  {tool_count} tools");
    }
}

fn print_help() {
    eprintln!("Available commands:");
    eprintln!("  /tools    Show available tools and their servers");
    eprintln!("  /servers  Show connected servers");
    eprintln!("  /clear    Clear the conversation");
    eprintln!("  /help     Show this help");
    eprintln!("  quit      Exit");
}
