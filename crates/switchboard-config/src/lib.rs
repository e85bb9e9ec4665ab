//! Layered TOML configuration for Switchboard.
//!
//! Reads configuration from multiple sources with precedence:
//! CLI flags > env vars > config file > defaults

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use switchboard_mcp::{McpConfig, McpServerConfig};
use switchboard_types::ConfigError;

/// The default chat-completions endpoint (a local Ollama).
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// The default model to use.
pub const DEFAULT_MODEL: &str = "llama3.2";

/// The default bound on one routed tool call, in milliseconds.
pub const DEFAULT_CALL_TIMEOUT_MS: u64 = 60_000;

/// The default number of tool-call rounds per agent turn.
pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 10;

/// Resolved configuration for a Switchboard session.
#[derive(Debug, Clone)]
pub struct SwitchboardConfig {
    pub model: String,
    pub base_url: String,
    pub api_key: Option<String>,
    pub call_timeout_ms: u64,
    pub max_tool_rounds: usize,
    pub system_prompt: Option<String>,
    /// Backends to connect at startup, keyed by backend id.
    pub servers: McpConfig,
    pub config_dir: PathBuf,
}

/// Settings that can be read from a TOML config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsFile {
    #[serde(default)]
    pub agent: AgentSettings,
    #[serde(default)]
    pub servers: std::collections::HashMap<String, McpServerConfig>,
}

/// `[agent]` section of the config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentSettings {
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub call_timeout_ms: Option<u64>,
    pub max_tool_rounds: Option<usize>,
    pub system_prompt: Option<String>,
}

/// CLI overrides that take highest precedence.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub model: Option<String>,
    pub base_url: Option<String>,
}

impl SwitchboardConfig {
    /// Load configuration from all sources, applying precedence rules.
    ///
    /// Precedence (highest to lowest):
    /// 1. CLI flags
    /// 2. Environment variables
    /// 3. Config file (~/.switchboard/config.toml)
    /// 4. Defaults
    pub fn load(overrides: CliOverrides) -> Result<Self, ConfigError> {
        Self::load_from(config_dir(), overrides, |key| std::env::var(key).ok())
    }

    /// Load with an explicit config directory and environment lookup.
    pub fn load_from(
        config_dir: PathBuf,
        overrides: CliOverrides,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let settings = load_settings_file(&config_dir.join("config.toml"));

        let model = overrides
            .model
            .or_else(|| env("SWITCHBOARD_MODEL"))
            .or(settings.agent.model)
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let base_url = overrides
            .base_url
            .or_else(|| env("SWITCHBOARD_BASE_URL"))
            .or(settings.agent.base_url)
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue {
                key: "base_url".into(),
                message: format!("expected an http(s) URL, got '{base_url}'"),
            });
        }

        let api_key = env("SWITCHBOARD_API_KEY")
            .or(settings.agent.api_key)
            .filter(|key| !key.is_empty());

        let call_timeout_ms = settings
            .agent
            .call_timeout_ms
            .unwrap_or(DEFAULT_CALL_TIMEOUT_MS);
        if call_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "call_timeout_ms".into(),
                message: "must be greater than zero".into(),
            });
        }

        Ok(SwitchboardConfig {
            model,
            base_url,
            api_key,
            call_timeout_ms,
            max_tool_rounds: settings
                .agent
                .max_tool_rounds
                .unwrap_or(DEFAULT_MAX_TOOL_ROUNDS),
            system_prompt: settings.agent.system_prompt,
            servers: McpConfig {
                servers: settings.servers,
            },
            config_dir,
        })
    }
}

/// Get the Switchboard config directory path (~/.switchboard/).
pub fn config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("SWITCHBOARD_CONFIG_DIR") {
        return PathBuf::from(dir);
    }
    dirs_next::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".switchboard")
}

/// Load and parse a TOML settings file, returning defaults on any error.
fn load_settings_file(path: &Path) -> SettingsFile {
    match std::fs::read_to_string(path) {
        Ok(content) => toml::from_str(&content).unwrap_or_else(|e| {
            tracing::warn!("Failed to parse {}: {}", path.display(), e);
            SettingsFile::default()
        }),
        Err(_) => SettingsFile::default(),
    }
}
