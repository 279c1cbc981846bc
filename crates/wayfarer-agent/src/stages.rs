//! The two listing stages and the graph that connects them.

use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{info, warn};

use wayfarer_core::error::Result;
use wayfarer_core::traits::{Agent, CompletionModel};

use crate::graph::{Edge, Stage, StateRecord, StateUpdate, WorkflowGraph, END};

/// Response stored when the agent fails for any reason.
pub const FALLBACK_RESPONSE: &str = "Error: Could not retrieve listings. Please try again.";

pub const GENERATE: &str = "generate";
pub const SUMMARIZE: &str = "summarize";

/// Prompt sent to the research agent for a location.
pub fn listing_prompt(input: &str) -> String {
    format!(
        "Provide exactly 3 listings for {input} with:\n\
         1. Property name\n\
         2. Price per night in INR\n\
         3. Exact location\n\
         4. 3 key amenities\n\
         Format each listing clearly with bullet points"
    )
}

/// Prompt sent to the completion model for a set of listings.
pub fn summary_prompt(response: &str) -> String {
    format!("Create a brief summary of these listings to choose best option: {response}")
}

/// Asks the agent for listings. Never fails: an agent error becomes the
/// fallback response with `is_valid = false`.
pub struct GenerateStage {
    agent: Arc<dyn Agent>,
}

impl GenerateStage {
    pub fn new(agent: Arc<dyn Agent>) -> Self {
        Self { agent }
    }

    pub async fn generate(&self, state: StateRecord) -> StateRecord {
        let prompt = listing_prompt(state.input());
        let update = match self.agent.run(prompt).await {
            Ok(listings) => {
                info!(input = %state.input(), chars = listings.len(), "Listings generated");
                StateUpdate {
                    response: Some(listings),
                    is_valid: Some(true),
                    ..Default::default()
                }
            }
            Err(e) => {
                warn!(input = %state.input(), error = %e, "Listing generation failed");
                StateUpdate {
                    response: Some(FALLBACK_RESPONSE.to_string()),
                    is_valid: Some(false),
                    ..Default::default()
                }
            }
        };
        state.derive(update)
    }
}

impl Stage for GenerateStage {
    fn name(&self) -> &str {
        GENERATE
    }

    fn run(&self, state: StateRecord) -> BoxFuture<'_, StateRecord> {
        Box::pin(self.generate(state))
    }
}

/// Summarizes valid listings. An invalid record or a model error yields an
/// empty summary.
pub struct SummarizeStage {
    model: Arc<dyn CompletionModel>,
}

impl SummarizeStage {
    pub fn new(model: Arc<dyn CompletionModel>) -> Self {
        Self { model }
    }

    pub async fn summarize(&self, state: StateRecord) -> StateRecord {
        if !state.is_valid() {
            return state.derive(StateUpdate {
                summary: Some(String::new()),
                ..Default::default()
            });
        }

        let summary = match self.model.infer(summary_prompt(state.response())).await {
            Ok(summary) => summary,
            Err(e) => {
                warn!(error = %e, "Summarization failed");
                String::new()
            }
        };
        state.derive(StateUpdate {
            summary: Some(summary),
            ..Default::default()
        })
    }
}

impl Stage for SummarizeStage {
    fn name(&self) -> &str {
        SUMMARIZE
    }

    fn run(&self, state: StateRecord) -> BoxFuture<'_, StateRecord> {
        Box::pin(self.summarize(state))
    }
}

/// `generate` (entry) goes to `summarize` when valid and ends otherwise;
/// `summarize` always ends.
pub fn listing_workflow(
    agent: Arc<dyn Agent>,
    model: Arc<dyn CompletionModel>,
) -> Result<WorkflowGraph> {
    WorkflowGraph::builder()
        .node(Arc::new(GenerateStage::new(agent)))
        .node(Arc::new(SummarizeStage::new(model)))
        .edge(Edge::when_valid(GENERATE, SUMMARIZE))
        .edge(Edge::when_invalid(GENERATE, END))
        .edge(Edge::always(SUMMARIZE, END))
        .entry(GENERATE)
        .build()
}
