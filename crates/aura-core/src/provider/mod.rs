pub mod gemini;

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::Config;
use crate::error::ProviderError;
use crate::types::{CompletionResponse, Message};

/// Trait for LLM providers.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Send a chat completion request.
    ///
    /// `tools` are function declarations in `{"type": "function", "function": {...}}` form.
    async fn chat(
        &self,
        messages: &[Message],
        tools: Option<&[serde_json::Value]>,
        model: &str,
        max_tokens: u32,
        temperature: f64,
    ) -> Result<CompletionResponse, ProviderError>;

    /// Get the default model for this provider.
    fn default_model(&self) -> &str;
}

/// Create the Gemini provider described by the config.
pub fn create_provider(config: &Config) -> Arc<dyn LlmProvider> {
    Arc::new(gemini::GeminiProvider::new(
        config.provider.api_key.clone(),
        config.provider.api_base.clone(),
        config.provider.model.clone(),
    ))
}
