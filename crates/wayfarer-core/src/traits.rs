use futures::future::BoxFuture;
use futures::stream::BoxStream;

use crate::config::ModelConfig;
use crate::error::Result;
use crate::types::*;

/// LLM client: streaming chat completions with tool definitions.
pub trait LlmClient: Send + Sync + 'static {
    /// Send a chat request and receive a stream of deltas.
    fn chat_stream(
        &self,
        config: &ModelConfig,
        messages: Vec<ChatMessage>,
        tools: &[ToolDefinition],
    ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>>;
}

/// Research agent: turns a prompt into listing text.
pub trait Agent: Send + Sync + 'static {
    fn run(&self, prompt: String) -> BoxFuture<'_, Result<String>>;
}

/// Single-shot completion model used for summaries.
pub trait CompletionModel: Send + Sync + 'static {
    fn infer(&self, prompt: String) -> BoxFuture<'_, Result<String>>;
}

/// An open automation session (a set of connected MCP servers).
pub trait AutomationSession: Send + Sync + 'static {
    /// Shut down every sub-session. Callers bound this with a timeout.
    fn close_all(&self) -> BoxFuture<'_, Result<()>>;
}

/// Tools the agent may call during a run.
pub trait ToolProvider: Send + Sync + 'static {
    /// Tool definitions for sending to the LLM.
    fn definitions(&self) -> Vec<ToolDefinition>;

    /// Execute a tool by name. Tool-level failures come back as `ToolResult::error`;
    /// `Err` is reserved for unknown tools and timeouts.
    fn call(&self, name: &str, input: serde_json::Value) -> BoxFuture<'_, Result<ToolResult>>;
}
