use thiserror::Error;

#[derive(Debug, Error)]
pub enum WayfarerError {
    // LLM errors
    #[error("LLM request failed: {0}")]
    LlmRequest(String),

    #[error("LLM streaming error: {0}")]
    LlmStream(String),

    #[error("LLM response parse error: {0}")]
    LlmParse(String),

    // Tool errors
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Tool timeout after {timeout_secs}s: {tool}")]
    ToolTimeout { tool: String, timeout_secs: u64 },

    // Agent errors
    #[error("Agent exceeded max steps ({0})")]
    MaxStepsExceeded(usize),

    #[error("Agent error: {0}")]
    Agent(String),

    #[error("Operation cancelled")]
    Cancelled,

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    #[error("Missing credential: {0}")]
    MissingCredential(String),

    // MCP errors
    #[error("MCP error: {0}")]
    Mcp(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, WayfarerError>;
