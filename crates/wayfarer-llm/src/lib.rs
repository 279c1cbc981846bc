pub mod chat_model;
pub mod providers;
pub mod retry;
pub mod streaming;

use std::sync::Arc;

use wayfarer_core::config::ModelConfig;
use wayfarer_core::traits::LlmClient;

pub use chat_model::ChatModel;
pub use providers::openai::OpenAiClient;
pub use providers::presets::apply_preset_defaults;
pub use retry::RetryingClient;

/// Build the LLM client for a model config, wrapped in the retry layer when one is configured.
///
/// Every supported provider speaks the OpenAI chat-completions protocol.
pub fn create_client(config: &ModelConfig) -> Arc<dyn LlmClient> {
    let primary: Box<dyn LlmClient> = Box::new(OpenAiClient::new());
    match config.retry.clone() {
        Some(retry_config) => Arc::new(RetryingClient::new(primary, retry_config)),
        None => Arc::from(primary),
    }
}
