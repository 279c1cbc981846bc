//! Scripted stand-ins for the external collaborators: LLM client, research
//! agent, completion model and automation session. Every mock exposes a
//! [`CallCounter`] so tests can assert how often the boundary was crossed.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::stream::BoxStream;

use wayfarer_core::config::ModelConfig;
use wayfarer_core::error::{Result, WayfarerError};
use wayfarer_core::traits::{Agent, AutomationSession, CompletionModel, LlmClient, ToolProvider};
use wayfarer_core::types::{ChatMessage, StopReason, StreamDelta, ToolDefinition, ToolResult};

/// Shared call counter handed out by every mock.
#[derive(Debug, Clone, Default)]
pub struct CallCounter(Arc<AtomicUsize>);

impl CallCounter {
    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    fn bump(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

/// What a mocked capability does when called.
#[derive(Debug, Clone)]
pub enum Reply {
    Text(String),
    Fail(String),
    Timeout,
    /// Never resolves. Used to exercise cancellation.
    Hang,
}

impl Reply {
    async fn resolve(self) -> Result<String> {
        match self {
            Reply::Text(t) => Ok(t),
            Reply::Fail(msg) => Err(WayfarerError::Agent(msg)),
            Reply::Timeout => Err(WayfarerError::LlmRequest("operation timed out".into())),
            Reply::Hang => futures::future::pending().await,
        }
    }
}

// ---- LLM client ----

enum LlmStep {
    Fail(String),
    Deltas(Vec<StreamDelta>),
}

/// LLM client that replays a fixed script, one step per `chat_stream` call.
#[derive(Clone, Default)]
pub struct ScriptedLlm {
    steps: Arc<Mutex<VecDeque<LlmStep>>>,
    requests: Arc<Mutex<Vec<Vec<ChatMessage>>>>,
    calls: CallCounter,
}

impl ScriptedLlm {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(self, step: LlmStep) -> Self {
        self.steps.lock().unwrap().push_back(step);
        self
    }

    /// A final answer in one chunk.
    pub fn text(self, text: &str) -> Self {
        self.text_chunks(&[text])
    }

    /// A final answer streamed in several chunks.
    pub fn text_chunks(self, chunks: &[&str]) -> Self {
        let mut deltas: Vec<StreamDelta> = chunks
            .iter()
            .map(|c| StreamDelta::TextDelta(c.to_string()))
            .collect();
        deltas.push(StreamDelta::Stop(StopReason::EndTurn));
        self.push(LlmStep::Deltas(deltas))
    }

    /// A single tool call with JSON arguments.
    pub fn tool_call(self, id: &str, name: &str, args: serde_json::Value) -> Self {
        self.push(LlmStep::Deltas(vec![
            StreamDelta::ToolUseStart {
                index: 0,
                id: id.to_string(),
                name: name.to_string(),
            },
            StreamDelta::ToolInputDelta {
                index: 0,
                delta: args.to_string(),
            },
            StreamDelta::Stop(StopReason::ToolUse),
        ]))
    }

    /// A request-level failure.
    pub fn fail(self, message: &str) -> Self {
        self.push(LlmStep::Fail(message.to_string()))
    }

    pub fn calls(&self) -> CallCounter {
        self.calls.clone()
    }

    /// Message lists received so far, one entry per call.
    pub fn requests(&self) -> Vec<Vec<ChatMessage>> {
        self.requests.lock().unwrap().clone()
    }
}

impl LlmClient for ScriptedLlm {
    fn chat_stream(
        &self,
        _config: &ModelConfig,
        messages: Vec<ChatMessage>,
        _tools: &[ToolDefinition],
    ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>> {
        self.calls.bump();
        self.requests.lock().unwrap().push(messages);
        let step = self.steps.lock().unwrap().pop_front();

        Box::pin(async move {
            match step {
                Some(LlmStep::Deltas(deltas)) => {
                    let stream = futures::stream::iter(deltas.into_iter().map(Ok));
                    Ok(Box::pin(stream) as BoxStream<'_, Result<StreamDelta>>)
                }
                Some(LlmStep::Fail(msg)) => Err(WayfarerError::LlmRequest(msg)),
                None => Err(WayfarerError::LlmRequest("script exhausted".into())),
            }
        })
    }
}

// ---- Agent / completion model ----

/// Research agent mock. Records every prompt it receives.
#[derive(Clone)]
pub struct MockAgent {
    reply: Reply,
    prompts: Arc<Mutex<Vec<String>>>,
    calls: CallCounter,
}

impl MockAgent {
    pub fn new(reply: Reply) -> Self {
        Self {
            reply,
            prompts: Arc::default(),
            calls: CallCounter::default(),
        }
    }

    pub fn calls(&self) -> CallCounter {
        self.calls.clone()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

impl Agent for MockAgent {
    fn run(&self, prompt: String) -> BoxFuture<'_, Result<String>> {
        self.calls.bump();
        self.prompts.lock().unwrap().push(prompt);
        Box::pin(self.reply.clone().resolve())
    }
}

/// Completion model mock. Records every prompt it receives.
#[derive(Clone)]
pub struct MockModel {
    reply: Reply,
    prompts: Arc<Mutex<Vec<String>>>,
    calls: CallCounter,
}

impl MockModel {
    pub fn new(reply: Reply) -> Self {
        Self {
            reply,
            prompts: Arc::default(),
            calls: CallCounter::default(),
        }
    }

    pub fn calls(&self) -> CallCounter {
        self.calls.clone()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

impl CompletionModel for MockModel {
    fn infer(&self, prompt: String) -> BoxFuture<'_, Result<String>> {
        self.calls.bump();
        self.prompts.lock().unwrap().push(prompt);
        Box::pin(self.reply.clone().resolve())
    }
}

// ---- Tools ----

/// Tool provider with fixed replies keyed by tool name. Unknown names fail
/// with `ToolNotFound`.
#[derive(Clone, Default)]
pub struct StaticTools {
    tools: Vec<(ToolDefinition, ToolResult)>,
    invocations: Arc<Mutex<Vec<(String, serde_json::Value)>>>,
}

impl StaticTools {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tool(mut self, name: &str, result: ToolResult) -> Self {
        let definition = ToolDefinition {
            name: name.to_string(),
            description: format!("Test tool {}", name),
            input_schema: serde_json::json!({"type": "object"}),
        };
        self.tools.push((definition, result));
        self
    }

    /// `(name, input)` for every call so far.
    pub fn invocations(&self) -> Vec<(String, serde_json::Value)> {
        self.invocations.lock().unwrap().clone()
    }
}

impl ToolProvider for StaticTools {
    fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|(d, _)| d.clone()).collect()
    }

    fn call(&self, name: &str, input: serde_json::Value) -> BoxFuture<'_, Result<ToolResult>> {
        self.invocations
            .lock()
            .unwrap()
            .push((name.to_string(), input));
        let found = self
            .tools
            .iter()
            .find(|(d, _)| d.name == name)
            .map(|(_, r)| r.clone());
        let name = name.to_string();
        Box::pin(async move { found.ok_or(WayfarerError::ToolNotFound(name)) })
    }
}

// ---- Automation session ----

/// How a mocked session behaves when closed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CloseBehavior {
    Ok,
    Fail,
    /// Sleeps far past any sane close timeout.
    Hang,
}

/// Automation session mock counting `close_all` calls.
#[derive(Clone)]
pub struct MockSession {
    behavior: CloseBehavior,
    closes: CallCounter,
}

impl MockSession {
    pub fn new(behavior: CloseBehavior) -> Self {
        Self {
            behavior,
            closes: CallCounter::default(),
        }
    }

    pub fn closes(&self) -> CallCounter {
        self.closes.clone()
    }
}

impl AutomationSession for MockSession {
    fn close_all(&self) -> BoxFuture<'_, Result<()>> {
        self.closes.bump();
        let behavior = self.behavior;
        Box::pin(async move {
            match behavior {
                CloseBehavior::Ok => Ok(()),
                CloseBehavior::Fail => Err(WayfarerError::Mcp("browser server crashed".into())),
                CloseBehavior::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(())
                }
            }
        })
    }
}

/// Three well-formed bullet listings, as the agent returns them for "Goa".
pub fn goa_listings() -> String {
    "1. **Sea Breeze Villa**\n   • Price per night: ₹6,500\n   • Location: Calangute, North Goa\n   • Amenities: pool, Wi-Fi, breakfast\n\
2. **Palm Grove Cottage**\n   • Price per night: ₹3,200\n   • Location: Palolem, South Goa\n   • Amenities: garden, AC, parking\n\
3. **Fort View Studio**\n   • Price per night: ₹4,100\n   • Location: Candolim, North Goa\n   • Amenities: balcony, kitchen, Wi-Fi"
        .to_string()
}
