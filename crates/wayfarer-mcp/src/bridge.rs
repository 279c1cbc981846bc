use std::collections::BTreeMap;

use tracing::debug;

use rmcp::model::Tool as McpTool;

use wayfarer_core::types::ToolDefinition;

/// An MCP server tool as the LLM sees it.
/// Name format: mcp__{server}__{tool}
#[derive(Debug, Clone)]
pub struct BridgedTool {
    pub server_name: String,
    pub tool_name: String,
    pub definition: ToolDefinition,
    pub timeout_secs: u64,
}

/// Index of every bridged tool in a session, keyed by display name.
#[derive(Debug, Clone, Default)]
pub struct ToolIndex {
    tools: BTreeMap<String, BridgedTool>,
}

impl ToolIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn display_name(server_name: &str, tool_name: &str) -> String {
        format!("mcp__{}__{}", server_name, tool_name)
    }

    /// Add one tool. A later insert with the same display name replaces the earlier one.
    pub fn insert(
        &mut self,
        server_name: &str,
        tool_name: &str,
        description: Option<String>,
        schema: serde_json::Value,
        timeout_secs: u64,
    ) {
        let display_name = Self::display_name(server_name, tool_name);
        let definition = ToolDefinition {
            name: display_name.clone(),
            description: description.unwrap_or_else(|| format!("MCP tool: {}", tool_name)),
            input_schema: schema,
        };
        debug!(name = %display_name, "Indexed MCP tool");
        self.tools.insert(
            display_name,
            BridgedTool {
                server_name: server_name.to_string(),
                tool_name: tool_name.to_string(),
                definition,
                timeout_secs,
            },
        );
    }

    /// Index every tool a server advertises.
    pub fn insert_server_tools(&mut self, server_name: &str, tools: &[McpTool], timeout_secs: u64) {
        for tool in tools {
            let schema = serde_json::to_value(&*tool.input_schema)
                .unwrap_or(serde_json::json!({"type": "object"}));
            self.insert(
                server_name,
                &tool.name,
                tool.description.as_ref().map(|d| d.to_string()),
                schema,
                timeout_secs,
            );
        }
    }

    pub fn get(&self, display_name: &str) -> Option<&BridgedTool> {
        self.tools.get(display_name)
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.definition.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
