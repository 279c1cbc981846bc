use std::sync::Arc;

use futures::future::BoxFuture;
use futures::StreamExt;
use tracing::debug;

use wayfarer_core::config::ModelConfig;
use wayfarer_core::error::{Result, WayfarerError};
use wayfarer_core::traits::{CompletionModel, LlmClient};
use wayfarer_core::types::{ChatMessage, StreamDelta};

/// Single-turn completion over a streaming chat client.
///
/// Sends the prompt as one user message without tools and returns the
/// concatenated text deltas.
pub struct ChatModel {
    llm: Arc<dyn LlmClient>,
    config: ModelConfig,
}

impl ChatModel {
    pub fn new(llm: Arc<dyn LlmClient>, config: ModelConfig) -> Self {
        Self { llm, config }
    }
}

impl CompletionModel for ChatModel {
    fn infer(&self, prompt: String) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            let mut stream = self
                .llm
                .chat_stream(&self.config, vec![ChatMessage::user(prompt)], &[])
                .await?;

            let mut text = String::new();
            while let Some(delta) = stream.next().await {
                if let StreamDelta::TextDelta(t) = delta? {
                    text.push_str(&t);
                }
            }

            if text.trim().is_empty() {
                return Err(WayfarerError::LlmParse("model returned no text".into()));
            }
            debug!(chars = text.len(), "Completion received");
            Ok(text)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wayfarer_test_utils::ScriptedLlm;

    #[tokio::test]
    async fn test_infer_concatenates_text() {
        let llm = ScriptedLlm::new().text_chunks(&["Option 2 ", "is the best value."]);
        let model = ChatModel::new(Arc::new(llm), ModelConfig::default());
        let out = model.infer("summarize".into()).await.unwrap();
        assert_eq!(out, "Option 2 is the best value.");
    }

    #[tokio::test]
    async fn test_infer_propagates_request_error() {
        let llm = ScriptedLlm::new().fail("HTTP 401: invalid api key");
        let model = ChatModel::new(Arc::new(llm), ModelConfig::default());
        let err = model.infer("summarize".into()).await.unwrap_err();
        assert!(matches!(err, WayfarerError::LlmRequest(_)));
    }

    #[tokio::test]
    async fn test_infer_empty_output_is_error() {
        let llm = ScriptedLlm::new().text("  ");
        let model = ChatModel::new(Arc::new(llm), ModelConfig::default());
        assert!(model.infer("summarize".into()).await.is_err());
    }
}
