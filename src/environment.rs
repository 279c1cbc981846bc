use std::io::{self, BufRead, Write};
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;
use tracing::info;

use wayfarer_agent::{Collaborators, McpAgent, RunEnvironment};
use wayfarer_core::config::AppConfig;
use wayfarer_core::error::{Result, WayfarerError};
use wayfarer_llm::{apply_preset_defaults, create_client, ChatModel};
use wayfarer_mcp::McpSession;

const QUERY_PROMPT: &str = "\nEnter location for listings (or 'quit'): ";

/// Real collaborators: MCP servers from the session config, the configured
/// LLM provider, and stdin (unless a query was given on the command line).
pub struct LiveEnvironment {
    config: AppConfig,
    query: Option<String>,
}

impl LiveEnvironment {
    pub fn new(config: AppConfig, query: Option<String>) -> Self {
        Self { config, query }
    }
}

impl RunEnvironment for LiveEnvironment {
    type Session = McpSession;

    fn api_key(&self) -> Option<String> {
        self.config.api_key()
    }

    fn open_session(&self, cancel: CancellationToken) -> BoxFuture<'_, Result<McpSession>> {
        Box::pin(McpSession::open_from_config(
            &self.config.session.config_path,
            cancel,
        ))
    }

    fn collaborators(&self, session: Arc<McpSession>, api_key: &str) -> Result<Collaborators> {
        let mut model = self.config.model.clone();
        model.api_key = Some(api_key.to_string());
        apply_preset_defaults(&mut model);

        info!(
            provider = %model.provider,
            model = %model.model_id,
            tools = session.tool_count(),
            "Binding agent to automation session"
        );
        let llm = create_client(&model);
        let agent = McpAgent::new(llm.clone(), model.clone(), self.config.agent.clone(), session);
        let summarizer = ChatModel::new(llm, model);

        Ok(Collaborators {
            agent: Arc::new(agent),
            model: Arc::new(summarizer),
        })
    }

    fn read_query(&self) -> BoxFuture<'_, Result<String>> {
        if let Some(query) = self.query.clone() {
            return Box::pin(async move { Ok(query) });
        }
        Box::pin(async {
            tokio::task::spawn_blocking(|| -> Result<String> {
                let mut stdout = io::stdout();
                stdout.write_all(QUERY_PROMPT.as_bytes())?;
                stdout.flush()?;

                let mut line = String::new();
                io::stdin().lock().read_line(&mut line)?;
                Ok(line.trim().to_string())
            })
            .await
            .map_err(|e| WayfarerError::Agent(format!("Input task failed: {}", e)))?
        })
    }
}
