use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, WayfarerError};

pub const DEFAULT_API_KEY_ENV: &str = "GROQ_API_KEY";

const DEFAULT_SYSTEM_PROMPT: &str = "You are a travel assistant. When asked for listings:
1. Provide exactly 3 options
2. Format each with:
   • Property Name
   • Price/night (INR)
   • Location
   • 2 amenities
3. Be factual and concise";

/// Top-level Wayfarer configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Maximum LLM round-trips per agent run.
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    /// Keep conversation history between runs of the same agent.
    #[serde(default = "default_memory_enabled")]
    pub memory_enabled: bool,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    /// Per-tool-call timeout in seconds.
    #[serde(default = "default_tool_timeout")]
    pub tool_timeout_secs: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            memory_enabled: default_memory_enabled(),
            system_prompt: default_system_prompt(),
            tool_timeout_secs: default_tool_timeout(),
        }
    }
}

fn default_max_steps() -> usize { 15 }
fn default_memory_enabled() -> bool { true }
fn default_system_prompt() -> String { DEFAULT_SYSTEM_PROMPT.to_string() }
fn default_tool_timeout() -> u64 { 120 }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model_id")]
    pub model_id: String,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Environment variable consulted when `api_key` is unset.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_retry")]
    pub retry: Option<RetryConfig>,
    #[serde(default)]
    pub extra_headers: HashMap<String, String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model_id: default_model_id(),
            api_key: None,
            api_key_env: default_api_key_env(),
            base_url: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            retry: default_retry(),
            extra_headers: HashMap::new(),
        }
    }
}

fn default_provider() -> String { "groq".to_string() }
fn default_model_id() -> String { "llama-3.3-70b-versatile".to_string() }
fn default_api_key_env() -> String { DEFAULT_API_KEY_ENV.to_string() }
fn default_max_tokens() -> u32 { 4096 }
fn default_temperature() -> f32 { 0.5 }
fn default_retry() -> Option<RetryConfig> { Some(RetryConfig::default()) }

/// Retry configuration for LLM requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

fn default_max_retries() -> u32 { 5 }
fn default_initial_backoff() -> u64 { 1000 }
fn default_max_backoff() -> u64 { 30000 }

/// Automation session settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Path to the MCP server config file.
    #[serde(default = "default_session_config_path")]
    pub config_path: PathBuf,
    /// Upper bound on the time spent closing the session.
    #[serde(default = "default_close_timeout")]
    pub close_timeout_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            config_path: default_session_config_path(),
            close_timeout_secs: default_close_timeout(),
        }
    }
}

fn default_session_config_path() -> PathBuf { PathBuf::from("browser_mcp.json") }
fn default_close_timeout() -> u64 { 5 }

/// MCP server file in the `{"mcpServers": {...}}` layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpJsonConfig {
    #[serde(rename = "mcpServers", default)]
    pub mcp_servers: HashMap<String, McpJsonServerEntry>,
}

/// A single entry in the MCP server file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpJsonServerEntry {
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl McpJsonServerEntry {
    /// Convert to McpServerConfig.
    pub fn to_server_config(&self) -> Option<McpServerConfig> {
        let transport = if let Some(ref cmd) = self.command {
            McpTransport::Stdio {
                command: cmd.clone(),
                args: self.args.clone(),
                env: self.env.clone(),
            }
        } else if let Some(ref url) = self.url {
            McpTransport::Http { url: url.clone() }
        } else {
            return None;
        };

        Some(McpServerConfig {
            transport,
            timeout_secs: self.timeout_secs.unwrap_or_else(default_mcp_timeout),
        })
    }
}

impl McpJsonConfig {
    /// Load and validate an MCP server file.
    ///
    /// Fails when the file is missing, is not valid JSON, or names no usable server.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| WayfarerError::ConfigNotFound(path.display().to_string()))?;
        let config: Self = serde_json::from_str(&expand_env_vars(&content))
            .map_err(|e| WayfarerError::Config(format!("{}: {}", path.display(), e)))?;

        if config.servers().is_empty() {
            return Err(WayfarerError::Config(format!(
                "{}: no MCP servers configured",
                path.display()
            )));
        }
        Ok(config)
    }

    /// Server configs for every entry that names a command or a URL.
    pub fn servers(&self) -> Vec<(String, McpServerConfig)> {
        let mut servers: Vec<_> = self
            .mcp_servers
            .iter()
            .filter_map(|(name, entry)| entry.to_server_config().map(|c| (name.clone(), c)))
            .collect();
        servers.sort_by(|a, b| a.0.cmp(&b.0));
        servers
    }
}

/// Configuration for a single MCP server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpServerConfig {
    pub transport: McpTransport,
    /// Per-tool-call timeout in seconds. Default: 120.
    #[serde(default = "default_mcp_timeout")]
    pub timeout_secs: u64,
}

fn default_mcp_timeout() -> u64 { 120 }

/// MCP transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum McpTransport {
    Stdio {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: HashMap<String, String>,
    },
    Http {
        url: String,
    },
}

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| WayfarerError::ConfigNotFound(path.display().to_string()))?;

        let expanded = expand_env_vars(&content);

        toml::from_str(&expanded).map_err(|e| WayfarerError::Config(e.to_string()))
    }

    /// Load `path` when it exists, otherwise fall back to built-in defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            debug!(path = %path.display(), "No config file, using defaults");
            Ok(Self::default())
        }
    }

    /// Resolve the LLM API key: explicit config value first, then the environment.
    ///
    /// Unexpanded `${VAR}` placeholders and blank values count as absent.
    pub fn api_key(&self) -> Option<String> {
        let configured = self
            .model
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty() && !k.starts_with("${"));
        if let Some(key) = configured {
            return Some(key.to_string());
        }
        std::env::var(&self.model.api_key_env)
            .ok()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
    }
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                Err(_) => {
                    // Keep original if env var not set
                    result.push_str(&format!("${{{}}}", var_name));
                }
            }
        } else {
            result.push(c);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_expand_env_vars() {
        std::env::set_var("TEST_WAYFARER_VAR", "hello");
        let result = expand_env_vars("key = \"${TEST_WAYFARER_VAR}\"");
        assert_eq!(result, "key = \"hello\"");
        std::env::remove_var("TEST_WAYFARER_VAR");
    }

    #[test]
    fn test_expand_env_vars_missing() {
        let result = expand_env_vars("key = \"${NONEXISTENT_WAYFARER_VAR}\"");
        assert_eq!(result, "key = \"${NONEXISTENT_WAYFARER_VAR}\"");
    }

    #[test]
    fn test_defaults_from_empty_toml() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.agent.max_steps, 15);
        assert!(config.agent.memory_enabled);
        assert!(config.agent.system_prompt.contains("travel assistant"));
        assert_eq!(config.model.provider, "groq");
        assert_eq!(config.model.model_id, "llama-3.3-70b-versatile");
        assert_eq!(config.model.temperature, 0.5);
        assert_eq!(config.model.retry.as_ref().unwrap().max_retries, 5);
        assert_eq!(config.session.config_path, PathBuf::from("browser_mcp.json"));
        assert_eq!(config.session.close_timeout_secs, 5);
    }

    #[test]
    fn test_api_key_from_config_wins() {
        let mut config = AppConfig::default();
        config.model.api_key = Some("gsk-config".into());
        config.model.api_key_env = "WAYFARER_TEST_UNSET_KEY_1".into();
        assert_eq!(config.api_key().as_deref(), Some("gsk-config"));
    }

    #[test]
    fn test_api_key_placeholder_falls_back_to_env() {
        let mut config = AppConfig::default();
        config.model.api_key = Some("${WAYFARER_TEST_KEY_2}".into());
        config.model.api_key_env = "WAYFARER_TEST_KEY_2".into();
        assert_eq!(config.api_key(), None);

        std::env::set_var("WAYFARER_TEST_KEY_2", "gsk-env");
        assert_eq!(config.api_key().as_deref(), Some("gsk-env"));
        std::env::remove_var("WAYFARER_TEST_KEY_2");
    }

    #[test]
    fn test_api_key_blank_env_is_absent() {
        let mut config = AppConfig::default();
        config.model.api_key_env = "WAYFARER_TEST_KEY_3".into();
        std::env::set_var("WAYFARER_TEST_KEY_3", "   ");
        assert_eq!(config.api_key(), None);
        std::env::remove_var("WAYFARER_TEST_KEY_3");
    }

    #[test]
    fn test_mcp_json_entries() {
        let json = r#"{
            "mcpServers": {
                "playwright": { "command": "npx", "args": ["@playwright/mcp@latest"] },
                "remote": { "url": "http://localhost:8931/mcp" },
                "broken": { "args": ["nothing"] }
            }
        }"#;
        let config: McpJsonConfig = serde_json::from_str(json).unwrap();
        let servers = config.servers();
        assert_eq!(servers.len(), 2);
        assert_eq!(servers[0].0, "playwright");
        assert!(matches!(servers[0].1.transport, McpTransport::Stdio { .. }));
        assert!(matches!(servers[1].1.transport, McpTransport::Http { .. }));
        assert_eq!(servers[0].1.timeout_secs, 120);
    }

    #[test]
    fn test_mcp_json_load_missing_file() {
        let err = McpJsonConfig::load(Path::new("/nonexistent/browser_mcp.json")).unwrap_err();
        assert!(matches!(err, WayfarerError::ConfigNotFound(_)));
    }

    #[test]
    fn test_mcp_json_load_rejects_empty() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(br#"{"mcpServers": {}}"#).unwrap();
        let err = McpJsonConfig::load(tmp.path()).unwrap_err();
        assert!(matches!(err, WayfarerError::Config(_)));
    }

    #[test]
    fn test_mcp_json_load_rejects_garbage() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"not json").unwrap();
        let err = McpJsonConfig::load(tmp.path()).unwrap_err();
        assert!(matches!(err, WayfarerError::Config(_)));
    }
}
