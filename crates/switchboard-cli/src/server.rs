//! Turning the `<server>` argument into a backend entry, and connecting the
//! configured backends at startup.

use std::path::Path;
use switchboard_mcp::{McpConfig, McpServerConfig, SessionManager, TransportDescriptor};
use switchboard_types::{ConfigError, SwitchboardError};

pub const USAGE: &str = "Usage: switchboard <path_to_server_script | http(s)://server/sse>";

/// Classify `address` and pick a backend id for it: the script's file stem,
/// or the URL's host and port.
pub fn server_entry(address: &str) -> Result<(String, McpServerConfig), ConfigError> {
    let transport = TransportDescriptor::from_address(address)?;
    let id = match &transport {
        TransportDescriptor::Stream { url } => url_authority(url),
        TransportDescriptor::Process { .. } => Path::new(address)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(address)
            .to_string(),
    };
    Ok((id, McpServerConfig::new(transport)))
}

/// Connect every configured backend. Individual failures are reported on
/// stderr; the call fails only if no backend connected.
pub async fn connect_all(
    manager: &SessionManager,
    servers: &McpConfig,
) -> Result<(), SwitchboardError> {
    let failures = manager.start(servers).await;
    for (id, e) in &failures {
        eprintln!("Failed to connect to '{id}': {e}");
    }
    if manager.session_count().await > 0 {
        return Ok(());
    }
    let detail = failures
        .iter()
        .map(|(id, e)| format!("{id}: {e}"))
        .collect::<Vec<_>>()
        .join("; ");
    Err(SwitchboardError::Connection(format!(
        "no MCP server could be connected ({detail})"
    )))
}

fn url_authority(url: &str) -> String {
    let rest = url
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(url);
    rest.split(['/', '?', '#'])
        .next()
        .filter(|authority| !authority.is_empty())
        .unwrap_or(url)
        .to_string()
}
