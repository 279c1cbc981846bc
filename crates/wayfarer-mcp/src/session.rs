use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use wayfarer_core::config::McpJsonConfig;
use wayfarer_core::error::{Result, WayfarerError};
use wayfarer_core::traits::{AutomationSession, ToolProvider};
use wayfarer_core::types::{ToolDefinition, ToolResult};

use crate::bridge::ToolIndex;
use crate::client::McpClientManager;

/// Every MCP server named in one config file, connected and tool-indexed.
pub struct McpSession {
    manager: Arc<McpClientManager>,
    tools: ToolIndex,
}

impl McpSession {
    /// Open a session from an `{"mcpServers": {...}}` file.
    ///
    /// Any server that fails to connect aborts the open, as does `cancel`
    /// (with `Cancelled`); servers connected before that are shut down first.
    pub async fn open_from_config(path: &Path, cancel: CancellationToken) -> Result<Self> {
        let config = McpJsonConfig::load(path)?;
        let manager = Arc::new(McpClientManager::new());
        let mut tools = ToolIndex::new();

        for (name, server_config) in config.servers() {
            let connected = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(WayfarerError::Cancelled),
                result = async {
                    manager.connect(&name, &server_config).await?;
                    manager.list_tools(&name).await
                } => result,
            };

            match connected {
                Ok(server_tools) => {
                    info!(server = %name, tools = server_tools.len(), "MCP server ready");
                    tools.insert_server_tools(&name, &server_tools, server_config.timeout_secs);
                }
                Err(e) => {
                    warn!(server = %name, error = %e, "Aborting session open");
                    manager.disconnect_all().await.ok();
                    return Err(e);
                }
            }
        }

        Ok(Self { manager, tools })
    }

    pub fn tool_count(&self) -> usize {
        self.tools.len()
    }
}

impl ToolProvider for McpSession {
    fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.definitions()
    }

    fn call(&self, name: &str, input: serde_json::Value) -> BoxFuture<'_, Result<ToolResult>> {
        let tool = self.tools.get(name).cloned();
        let name = name.to_string();

        Box::pin(async move {
            let tool = tool.ok_or_else(|| WayfarerError::ToolNotFound(name.clone()))?;
            let arguments = input.as_object().cloned();
            let timeout = Duration::from_secs(tool.timeout_secs);

            match tokio::time::timeout(
                timeout,
                self.manager
                    .call_tool(&tool.server_name, &tool.tool_name, arguments),
            )
            .await
            {
                Ok(Ok(result)) => Ok(result),
                // Server-side failures go back to the model as error results.
                Ok(Err(e)) => Ok(ToolResult::error(e.to_string())),
                Err(_) => Err(WayfarerError::ToolTimeout {
                    tool: name,
                    timeout_secs: tool.timeout_secs,
                }),
            }
        })
    }
}

impl AutomationSession for McpSession {
    fn close_all(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let closed = self.manager.disconnect_all().await?;
            info!(servers = closed, "MCP session closed");
            Ok(())
        })
    }
}
