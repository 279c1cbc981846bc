use futures::future::BoxFuture;
use futures::stream::{BoxStream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use wayfarer_core::config::ModelConfig;
use wayfarer_core::error::{Result, WayfarerError};
use wayfarer_core::traits::LlmClient;
use wayfarer_core::types::*;

use crate::streaming::{SseEvent, SseStream};

const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";

/// OpenAI-compatible client. Works with OpenAI, Groq, Ollama, OpenRouter, Together, etc.
pub struct OpenAiClient {
    http: Client,
}

impl OpenAiClient {
    pub fn new() -> Self {
        Self {
            http: Client::new(),
        }
    }
}

impl Default for OpenAiClient {
    fn default() -> Self {
        Self::new()
    }
}

// Request types
#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<OaiMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<OaiTool>,
}

#[derive(Serialize, Debug)]
pub(crate) struct OaiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OaiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl OaiMessage {
    fn text(role: &str, content: String) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content),
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub(crate) struct OaiToolCall {
    #[serde(default)]
    index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    r#type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    function: Option<OaiFunction>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub(crate) struct OaiFunction {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    arguments: Option<String>,
}

#[derive(Serialize)]
pub(crate) struct OaiTool {
    r#type: String,
    function: OaiToolDef,
}

#[derive(Serialize)]
pub(crate) struct OaiToolDef {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

// Response types
#[derive(Deserialize, Debug)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<StreamUsage>,
    /// Groq reports usage under `x_groq` on the final chunk.
    #[serde(default)]
    x_groq: Option<GroqExtra>,
}

#[derive(Deserialize, Debug)]
struct GroqExtra {
    #[serde(default)]
    usage: Option<StreamUsage>,
}

#[derive(Deserialize, Debug)]
struct StreamChoice {
    #[serde(default)]
    delta: Option<StreamDeltaContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
struct StreamDeltaContent {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<OaiToolCall>>,
}

#[derive(Deserialize, Debug)]
struct StreamUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

pub(crate) fn convert_tools(tools: &[ToolDefinition]) -> Vec<OaiTool> {
    tools
        .iter()
        .map(|t| OaiTool {
            r#type: "function".to_string(),
            function: OaiToolDef {
                name: t.name.clone(),
                description: t.description.clone(),
                parameters: t.input_schema.clone(),
            },
        })
        .collect()
}

pub(crate) fn convert_messages(messages: Vec<ChatMessage>) -> Vec<OaiMessage> {
    let mut oai_msgs = Vec::new();

    for msg in messages {
        match msg.role {
            Role::System => oai_msgs.push(OaiMessage::text("system", msg.text())),
            Role::User => {
                // Tool results travel as individual `tool` messages
                let mut had_results = false;
                for block in &msg.content {
                    if let ContentBlock::ToolResult {
                        tool_use_id,
                        content,
                        ..
                    } = block
                    {
                        had_results = true;
                        oai_msgs.push(OaiMessage {
                            role: "tool".to_string(),
                            content: Some(content.clone()),
                            tool_calls: None,
                            tool_call_id: Some(tool_use_id.clone()),
                        });
                    }
                }
                if !had_results {
                    oai_msgs.push(OaiMessage::text("user", msg.text()));
                }
            }
            Role::Assistant => {
                let tool_uses = msg.tool_uses();
                if tool_uses.is_empty() {
                    oai_msgs.push(OaiMessage::text("assistant", msg.text()));
                    continue;
                }
                let text = msg.text();
                let calls: Vec<OaiToolCall> = tool_uses
                    .iter()
                    .enumerate()
                    .map(|(i, (id, name, input))| OaiToolCall {
                        index: i,
                        id: Some(id.to_string()),
                        r#type: Some("function".to_string()),
                        function: Some(OaiFunction {
                            name: Some(name.to_string()),
                            arguments: Some(input.to_string()),
                        }),
                    })
                    .collect();

                oai_msgs.push(OaiMessage {
                    role: "assistant".to_string(),
                    content: (!text.is_empty()).then_some(text),
                    tool_calls: Some(calls),
                    tool_call_id: None,
                });
            }
        }
    }

    oai_msgs
}

pub(crate) fn parse_chunk(event: SseEvent) -> Vec<Result<StreamDelta>> {
    if event.data.trim() == "[DONE]" {
        return vec![];
    }

    let chunk: StreamChunk = match serde_json::from_str(&event.data) {
        Ok(chunk) => chunk,
        Err(e) => {
            warn!(data = %event.data, error = %e, "Failed to parse OpenAI SSE chunk");
            return vec![];
        }
    };

    let mut deltas = Vec::new();

    if let Some(usage) = chunk.usage.or(chunk.x_groq.and_then(|g| g.usage)) {
        deltas.push(Ok(StreamDelta::Usage {
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
        }));
    }

    let Some(choice) = chunk.choices.into_iter().next() else {
        return deltas;
    };

    let delta = choice.delta.unwrap_or_default();

    if let Some(text) = delta.content {
        if !text.is_empty() {
            deltas.push(Ok(StreamDelta::TextDelta(text)));
        }
    }

    // Some providers send name and arguments in the same chunk, so emit both.
    if let Some(tool_calls) = delta.tool_calls {
        for tc in tool_calls {
            if let Some(func) = tc.function {
                if let Some(name) = func.name {
                    deltas.push(Ok(StreamDelta::ToolUseStart {
                        index: tc.index,
                        id: tc.id.unwrap_or_default(),
                        name,
                    }));
                }
                if let Some(args) = func.arguments {
                    if !args.is_empty() {
                        deltas.push(Ok(StreamDelta::ToolInputDelta {
                            index: tc.index,
                            delta: args,
                        }));
                    }
                }
            }
        }
    }

    if let Some(reason) = choice.finish_reason {
        let stop = match reason.as_str() {
            "tool_calls" => StopReason::ToolUse,
            "length" => StopReason::MaxTokens,
            _ => StopReason::EndTurn,
        };
        deltas.push(Ok(StreamDelta::Stop(stop)));
    }

    deltas
}

impl LlmClient for OpenAiClient {
    fn chat_stream(
        &self,
        config: &ModelConfig,
        messages: Vec<ChatMessage>,
        tools: &[ToolDefinition],
    ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>> {
        let config = config.clone();
        let oai_tools = convert_tools(tools);

        Box::pin(async move {
            let base_url = config.base_url.as_deref().unwrap_or(OPENAI_API_URL);

            let body = ChatRequest {
                model: config.model_id.clone(),
                messages: convert_messages(messages),
                max_tokens: config.max_tokens,
                temperature: (config.temperature > 0.0).then_some(config.temperature),
                stream: true,
                tools: oai_tools,
            };

            debug!(model = %config.model_id, url = %base_url, "Sending chat request");

            let mut req = self.http.post(base_url).json(&body);

            if let Some(api_key) = &config.api_key {
                req = req.header("Authorization", format!("Bearer {}", api_key));
            }

            for (k, v) in &config.extra_headers {
                req = req.header(k.as_str(), v.as_str());
            }

            let response = req
                .send()
                .await
                .map_err(|e| WayfarerError::LlmRequest(e.to_string()))?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "unknown".to_string());
                return Err(WayfarerError::LlmRequest(format!("HTTP {}: {}", status, body)));
            }

            let delta_stream = SseStream::new(response.bytes_stream())
                .map(|event| match event {
                    Ok(event) => futures::stream::iter(parse_chunk(event)),
                    Err(e) => futures::stream::iter(vec![Err(e)]),
                })
                .flatten();

            Ok(Box::pin(delta_stream) as BoxStream<'_, Result<StreamDelta>>)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(data: &str) -> SseEvent {
        SseEvent {
            event_type: None,
            data: data.to_string(),
        }
    }

    #[test]
    fn test_parse_text_delta() {
        let deltas = parse_chunk(event(
            r#"{"choices":[{"delta":{"content":"Beach Villa"},"finish_reason":null}]}"#,
        ));
        assert_eq!(deltas.len(), 1);
        assert!(matches!(&deltas[0], Ok(StreamDelta::TextDelta(t)) if t == "Beach Villa"));
    }

    #[test]
    fn test_parse_tool_call_name_and_args_together() {
        let deltas = parse_chunk(event(
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_1","type":"function","function":{"name":"mcp__airbnb__search","arguments":"{\"location\":\"Goa\"}"}}]}}]}"#,
        ));
        assert_eq!(deltas.len(), 2);
        assert!(matches!(
            &deltas[0],
            Ok(StreamDelta::ToolUseStart { index: 0, name, .. }) if name == "mcp__airbnb__search"
        ));
        assert!(matches!(&deltas[1], Ok(StreamDelta::ToolInputDelta { index: 0, .. })));
    }

    #[test]
    fn test_parse_finish_reason_and_groq_usage() {
        let deltas = parse_chunk(event(
            r#"{"choices":[{"delta":{},"finish_reason":"tool_calls"}],"x_groq":{"usage":{"prompt_tokens":12,"completion_tokens":34}}}"#,
        ));
        assert!(matches!(
            deltas[0],
            Ok(StreamDelta::Usage { input_tokens: 12, output_tokens: 34 })
        ));
        assert!(matches!(deltas[1], Ok(StreamDelta::Stop(StopReason::ToolUse))));
    }

    #[test]
    fn test_parse_done_and_garbage() {
        assert!(parse_chunk(event("[DONE]")).is_empty());
        assert!(parse_chunk(event("{not json")).is_empty());
    }

    #[test]
    fn test_convert_messages_tool_round_trip() {
        let assistant = ChatMessage {
            role: Role::Assistant,
            content: vec![ContentBlock::ToolUse {
                id: "call_1".into(),
                name: "mcp__airbnb__search".into(),
                input: serde_json::json!({"location": "Goa"}),
            }],
        };
        let results = ChatMessage {
            role: Role::User,
            content: vec![ContentBlock::ToolResult {
                tool_use_id: "call_1".into(),
                content: "3 results".into(),
                is_error: false,
            }],
        };
        let msgs = convert_messages(vec![
            ChatMessage::system("You are a travel assistant."),
            ChatMessage::user("Goa"),
            assistant,
            results,
        ]);

        assert_eq!(msgs.len(), 4);
        assert_eq!(msgs[0].role, "system");
        assert_eq!(msgs[2].role, "assistant");
        assert!(msgs[2].content.is_none());
        assert_eq!(msgs[2].tool_calls.as_ref().unwrap().len(), 1);
        assert_eq!(msgs[3].role, "tool");
        assert_eq!(msgs[3].tool_call_id.as_deref(), Some("call_1"));
    }
}
