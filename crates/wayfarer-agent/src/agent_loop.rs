use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use futures::StreamExt;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use wayfarer_core::config::{AgentConfig, ModelConfig};
use wayfarer_core::error::{Result, WayfarerError};
use wayfarer_core::traits::{Agent, LlmClient, ToolProvider};
use wayfarer_core::types::*;

/// Accumulator for streaming tool call deltas.
#[derive(Debug, Default)]
struct ToolCallAccumulator {
    id: String,
    name: String,
    input_json: String,
}

impl ToolCallAccumulator {
    fn input(&self) -> serde_json::Value {
        if self.input_json.trim().is_empty() {
            return serde_json::Value::Object(Default::default());
        }
        serde_json::from_str(&self.input_json).unwrap_or(serde_json::Value::Null)
    }
}

/// ReAct agent over the tools of an automation session.
///
/// Each `run` streams a completion, executes any requested tools serially,
/// feeds the results back and repeats until the model answers without tool
/// calls or `max_steps` is reached. With `memory_enabled`, the messages of
/// every successful run are replayed ahead of the next prompt.
pub struct McpAgent {
    llm: Arc<dyn LlmClient>,
    model: ModelConfig,
    config: AgentConfig,
    tools: Arc<dyn ToolProvider>,
    memory: Mutex<Vec<ChatMessage>>,
}

impl McpAgent {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        model: ModelConfig,
        config: AgentConfig,
        tools: Arc<dyn ToolProvider>,
    ) -> Self {
        Self {
            llm,
            model,
            config,
            tools,
            memory: Mutex::new(Vec::new()),
        }
    }

    /// Number of remembered messages.
    pub async fn memory_len(&self) -> usize {
        self.memory.lock().await.len()
    }

    async fn execute_tool(&self, name: &str, input: serde_json::Value) -> ToolResult {
        let timeout = Duration::from_secs(self.config.tool_timeout_secs);
        let result = match tokio::time::timeout(timeout, self.tools.call(name, input)).await {
            Ok(result) => result,
            Err(_) => Err(WayfarerError::ToolTimeout {
                tool: name.to_string(),
                timeout_secs: self.config.tool_timeout_secs,
            }),
        };
        match result {
            Ok(r) => r,
            Err(e) => {
                error!(tool = %name, error = %e, "Tool execution failed");
                ToolResult::error(e.to_string())
            }
        }
    }

    /// Run the loop for one prompt and return the final answer text.
    pub async fn execute(&self, prompt: &str) -> Result<String> {
        let start = Instant::now();
        let tool_defs = self.tools.definitions();

        let mut messages = vec![ChatMessage::system(self.config.system_prompt.clone())];
        if self.config.memory_enabled {
            messages.extend(self.memory.lock().await.iter().cloned());
        }
        let first_new = messages.len();
        messages.push(ChatMessage::user(prompt));

        for step in 0..self.config.max_steps {
            debug!(step, "Starting agent step");

            let mut stream = self
                .llm
                .chat_stream(&self.model, messages.clone(), &tool_defs)
                .await?;

            let mut text_content = String::new();
            let mut tool_calls: Vec<ToolCallAccumulator> = Vec::new();
            let mut stop_reason = None;

            while let Some(delta) = stream.next().await {
                match delta? {
                    StreamDelta::TextDelta(text) => text_content.push_str(&text),
                    StreamDelta::ToolUseStart { index, id, name } => {
                        while tool_calls.len() <= index {
                            tool_calls.push(ToolCallAccumulator::default());
                        }
                        tool_calls[index].id = id;
                        tool_calls[index].name = name;
                    }
                    StreamDelta::ToolInputDelta { index, delta } => {
                        if let Some(tc) = tool_calls.get_mut(index) {
                            tc.input_json.push_str(&delta);
                        }
                    }
                    StreamDelta::Stop(reason) => stop_reason = Some(reason),
                    StreamDelta::Usage {
                        input_tokens,
                        output_tokens,
                    } => debug!(input_tokens, output_tokens, "Token usage"),
                }
            }
            drop(stream);

            let mut content_blocks = Vec::new();
            if !text_content.is_empty() {
                content_blocks.push(ContentBlock::Text {
                    text: text_content.clone(),
                });
            }
            for tc in &tool_calls {
                content_blocks.push(ContentBlock::ToolUse {
                    id: tc.id.clone(),
                    name: tc.name.clone(),
                    input: tc.input(),
                });
            }
            messages.push(ChatMessage {
                role: Role::Assistant,
                content: content_blocks,
            });

            if tool_calls.is_empty() {
                if stop_reason == Some(StopReason::MaxTokens) {
                    warn!("LLM hit max tokens");
                }
                info!(
                    steps = step + 1,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Agent run complete"
                );
                if self.config.memory_enabled {
                    self.memory
                        .lock()
                        .await
                        .extend(messages.drain(first_new..));
                }
                return Ok(text_content);
            }

            let mut result_blocks = Vec::with_capacity(tool_calls.len());
            for tc in &tool_calls {
                debug!(tool = %tc.name, "Executing tool");
                let result = self.execute_tool(&tc.name, tc.input()).await;
                result_blocks.push(ContentBlock::ToolResult {
                    tool_use_id: tc.id.clone(),
                    content: result.content,
                    is_error: result.is_error,
                });
            }
            messages.push(ChatMessage {
                role: Role::User,
                content: result_blocks,
            });
        }

        warn!(max_steps = self.config.max_steps, "Agent step limit reached");
        Err(WayfarerError::MaxStepsExceeded(self.config.max_steps))
    }
}

impl Agent for McpAgent {
    fn run(&self, prompt: String) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move { self.execute(&prompt).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wayfarer_test_utils::{ScriptedLlm, StaticTools};

    fn agent(llm: &ScriptedLlm, tools: StaticTools, config: AgentConfig) -> McpAgent {
        McpAgent::new(
            Arc::new(llm.clone()),
            ModelConfig::default(),
            config,
            Arc::new(tools),
        )
    }

    fn tool_results(msg: &ChatMessage) -> Vec<(String, String, bool)> {
        msg.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::ToolResult {
                    tool_use_id,
                    content,
                    is_error,
                } => Some((tool_use_id.clone(), content.clone(), *is_error)),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_direct_answer() {
        let llm = ScriptedLlm::new().text_chunks(&["Sea Breeze ", "Villa"]);
        let agent = agent(&llm, StaticTools::new(), AgentConfig::default());

        let out = agent.run("Goa".into()).await.unwrap();
        assert_eq!(out, "Sea Breeze Villa");
        assert_eq!(llm.calls().get(), 1);

        let request = &llm.requests()[0];
        assert_eq!(request[0].role, Role::System);
        assert_eq!(request.last().unwrap().text(), "Goa");
    }

    #[tokio::test]
    async fn test_tool_round_trip() {
        let llm = ScriptedLlm::new()
            .tool_call("call_1", "mcp__airbnb__search", json!({"location": "Goa"}))
            .text("3 listings");
        let tools = StaticTools::new()
            .with_tool("mcp__airbnb__search", ToolResult::success("[villa, cottage, studio]"));
        let agent = agent(&llm, tools.clone(), AgentConfig::default());

        let out = agent.run("Goa".into()).await.unwrap();
        assert_eq!(out, "3 listings");
        assert_eq!(
            tools.invocations(),
            vec![("mcp__airbnb__search".to_string(), json!({"location": "Goa"}))]
        );

        let second = &llm.requests()[1];
        let results = tool_results(second.last().unwrap());
        assert_eq!(
            results,
            vec![("call_1".to_string(), "[villa, cottage, studio]".to_string(), false)]
        );
    }

    #[tokio::test]
    async fn test_unknown_tool_fed_back_as_error() {
        let llm = ScriptedLlm::new()
            .tool_call("call_1", "mcp__missing__tool", json!({}))
            .text("sorry");
        let agent = agent(&llm, StaticTools::new(), AgentConfig::default());

        assert_eq!(agent.run("Goa".into()).await.unwrap(), "sorry");
        let results = tool_results(llm.requests()[1].last().unwrap());
        assert_eq!(results.len(), 1);
        assert!(results[0].2);
        assert!(results[0].1.contains("mcp__missing__tool"));
    }

    #[tokio::test]
    async fn test_max_steps_exceeded() {
        let llm = ScriptedLlm::new()
            .tool_call("a", "search", json!({}))
            .tool_call("b", "search", json!({}));
        let tools = StaticTools::new().with_tool("search", ToolResult::success("more"));
        let config = AgentConfig {
            max_steps: 2,
            ..AgentConfig::default()
        };
        let agent = agent(&llm, tools, config);

        let err = agent.run("Goa".into()).await.unwrap_err();
        assert!(matches!(err, WayfarerError::MaxStepsExceeded(2)));
        assert_eq!(agent.memory_len().await, 0);
    }

    #[tokio::test]
    async fn test_llm_error_propagates() {
        let llm = ScriptedLlm::new().fail("HTTP 401: invalid api key");
        let agent = agent(&llm, StaticTools::new(), AgentConfig::default());
        let err = agent.run("Goa".into()).await.unwrap_err();
        assert!(matches!(err, WayfarerError::LlmRequest(_)));
    }

    #[tokio::test]
    async fn test_memory_replayed_on_next_run() {
        let llm = ScriptedLlm::new().text("first").text("second");
        let agent = agent(&llm, StaticTools::new(), AgentConfig::default());

        agent.run("Goa".into()).await.unwrap();
        assert_eq!(agent.memory_len().await, 2);
        agent.run("Manali".into()).await.unwrap();

        let second = &llm.requests()[1];
        let texts: Vec<String> = second.iter().map(|m| m.text()).collect();
        assert_eq!(texts[1..], ["Goa", "first", "Manali"]);
    }

    #[tokio::test]
    async fn test_memory_disabled() {
        let llm = ScriptedLlm::new().text("first").text("second");
        let config = AgentConfig {
            memory_enabled: false,
            ..AgentConfig::default()
        };
        let agent = agent(&llm, StaticTools::new(), config);

        agent.run("Goa".into()).await.unwrap();
        agent.run("Manali".into()).await.unwrap();
        assert_eq!(agent.memory_len().await, 0);
        assert_eq!(llm.requests()[1].len(), 2);
    }
}
