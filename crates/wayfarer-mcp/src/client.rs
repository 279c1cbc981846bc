use std::collections::HashMap;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use rmcp::model::{CallToolRequestParams, RawContent, Tool as McpTool};
use rmcp::service::RunningService;
use rmcp::transport::streamable_http_client::StreamableHttpClientTransport;
use rmcp::{RoleClient, ServiceExt};

use wayfarer_core::config::{McpServerConfig, McpTransport};
use wayfarer_core::error::WayfarerError;
use wayfarer_core::types::ToolResult;

use crate::handler::WayfarerClientHandler;

type McpConnection = RunningService<RoleClient, WayfarerClientHandler>;

/// Manages connections to the MCP servers of one session.
#[derive(Default)]
pub struct McpClientManager {
    connections: Mutex<HashMap<String, McpConnection>>,
    server_configs: Mutex<HashMap<String, McpServerConfig>>,
}

impl McpClientManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect to an MCP server.
    pub async fn connect(&self, name: &str, config: &McpServerConfig) -> Result<(), WayfarerError> {
        let handler = WayfarerClientHandler::new(name);

        let client = match &config.transport {
            McpTransport::Stdio { command, args, env } => {
                let mut cmd = tokio::process::Command::new(command);
                cmd.args(args);
                for (k, v) in env {
                    cmd.env(k, v);
                }

                let transport = rmcp::transport::TokioChildProcess::new(cmd).map_err(|e| {
                    WayfarerError::Mcp(format!("Failed to spawn {}: {}", command, e))
                })?;

                handler.serve(transport).await.map_err(|e| {
                    WayfarerError::Mcp(format!("Failed to initialize MCP client for {}: {}", name, e))
                })?
            }
            McpTransport::Http { url } => {
                let transport = StreamableHttpClientTransport::from_uri(url.as_str());

                <WayfarerClientHandler as ServiceExt<RoleClient>>::serve(handler, transport)
                    .await
                    .map_err(|e| WayfarerError::Mcp(format!("MCP init for '{}' failed: {}", name, e)))?
            }
        };

        info!(server = %name, "MCP server connected");

        self.connections
            .lock()
            .await
            .insert(name.to_string(), client);
        self.server_configs
            .lock()
            .await
            .insert(name.to_string(), config.clone());
        Ok(())
    }

    /// Drop the current connection to a server and open a fresh one from its stored config.
    pub async fn reconnect(&self, server_name: &str) -> Result<(), WayfarerError> {
        let config = self
            .server_configs
            .lock()
            .await
            .get(server_name)
            .cloned()
            .ok_or_else(|| {
                WayfarerError::Mcp(format!("No stored config for server '{}'", server_name))
            })?;

        if let Some(mut old) = self.connections.lock().await.remove(server_name) {
            let _ = old.close().await;
        }

        self.connect(server_name, &config).await
    }

    /// List tools from a connected server.
    pub async fn list_tools(&self, server_name: &str) -> Result<Vec<McpTool>, WayfarerError> {
        let conns = self.connections.lock().await;
        let client = conns.get(server_name).ok_or_else(|| {
            WayfarerError::Mcp(format!("Server '{}' not connected", server_name))
        })?;

        let tools = client.list_all_tools().await.map_err(|e| {
            WayfarerError::Mcp(format!("Failed to list tools from '{}': {}", server_name, e))
        })?;

        debug!(server = %server_name, count = tools.len(), "Listed MCP tools");
        Ok(tools)
    }

    /// Call a tool on a connected server, reconnecting once if the transport dropped.
    pub async fn call_tool(
        &self,
        server_name: &str,
        tool_name: &str,
        arguments: Option<serde_json::Map<String, serde_json::Value>>,
    ) -> Result<ToolResult, WayfarerError> {
        let result = self
            .call_tool_inner(server_name, tool_name, arguments.clone())
            .await;

        if let Err(ref e) = result {
            let err_str = e.to_string();
            if err_str.contains("closed") || err_str.contains("Transport") {
                warn!(server = %server_name, "MCP transport closed, attempting reconnect");
                if self.reconnect(server_name).await.is_ok() {
                    return self.call_tool_inner(server_name, tool_name, arguments).await;
                }
            }
        }

        result
    }

    async fn call_tool_inner(
        &self,
        server_name: &str,
        tool_name: &str,
        arguments: Option<serde_json::Map<String, serde_json::Value>>,
    ) -> Result<ToolResult, WayfarerError> {
        let conns = self.connections.lock().await;
        let client = conns.get(server_name).ok_or_else(|| {
            WayfarerError::Mcp(format!("Server '{}' not connected", server_name))
        })?;

        let params = CallToolRequestParams {
            name: tool_name.to_string().into(),
            arguments,
            meta: None,
            task: None,
        };

        let result = client.call_tool(params).await.map_err(|e| {
            WayfarerError::Mcp(format!("Tool call '{}.{}' failed: {}", server_name, tool_name, e))
        })?;

        let content: Vec<String> = result
            .content
            .iter()
            .map(|c| match c.raw {
                RawContent::Text(ref t) => t.text.to_string(),
                _ => format!("{:?}", c.raw),
            })
            .collect();
        let content = content.join("\n");

        Ok(if result.is_error.unwrap_or(false) {
            ToolResult::error(content)
        } else {
            ToolResult::success(content)
        })
    }

    /// Disconnect from all servers.
    ///
    /// Every connection is dropped either way. Returns how many closed
    /// cleanly, or an error naming the servers that did not.
    pub async fn disconnect_all(&self) -> Result<usize, WayfarerError> {
        let mut conns = self.connections.lock().await;
        let mut closed = 0;
        let mut failed = Vec::new();
        for (name, mut client) in conns.drain() {
            match client.close().await {
                Ok(_) => {
                    info!(server = %name, "MCP server disconnected");
                    closed += 1;
                }
                Err(e) => {
                    warn!(server = %name, error = ?e, "MCP server did not close cleanly");
                    failed.push(name);
                }
            }
        }
        close_result(closed, failed)
    }
}

fn close_result(closed: usize, mut failed: Vec<String>) -> Result<usize, WayfarerError> {
    if failed.is_empty() {
        return Ok(closed);
    }
    failed.sort();
    Err(WayfarerError::Mcp(format!(
        "{} MCP server(s) did not close cleanly: {}",
        failed.len(),
        failed.join(", ")
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_result_all_clean() {
        assert_eq!(close_result(2, vec![]).unwrap(), 2);
    }

    #[test]
    fn test_close_result_names_failed_servers() {
        let err = close_result(1, vec!["playwright".into(), "airbnb".into()]).unwrap_err();
        assert!(matches!(err, WayfarerError::Mcp(_)));
        assert_eq!(
            err.to_string(),
            "MCP error: 2 MCP server(s) did not close cleanly: airbnb, playwright"
        );
    }

    #[tokio::test]
    async fn test_disconnect_all_without_connections() {
        let manager = McpClientManager::new();
        assert_eq!(manager.disconnect_all().await.unwrap(), 0);
    }
}
