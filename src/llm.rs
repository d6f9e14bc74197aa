//! Language-model backend
//!
//! Used by the LLM decision oracle and by prompt-driven tasks. Only plain
//! text completions are needed here.

mod anthropic;
mod error;
mod types;

pub use anthropic::AnthropicService;
pub use error::LlmError;
pub use types::*;

use async_trait::async_trait;
use std::sync::Arc;

/// Default Anthropic model used when none is configured
pub const DEFAULT_MODEL: &str = "claude-3-5-haiku-20241022";

/// Common interface for LLM providers
#[async_trait]
pub trait LlmService: Send + Sync {
    /// Make a completion request
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError>;

    /// Get the model ID
    fn model_id(&self) -> &str;
}

/// Logging wrapper for LLM services
pub struct LoggingService {
    inner: Arc<dyn LlmService>,
    model_id: String,
}

impl LoggingService {
    pub fn new(inner: Arc<dyn LlmService>) -> Self {
        let model_id = inner.model_id().to_string();
        Self { inner, model_id }
    }
}

#[async_trait]
impl LlmService for LoggingService {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let start = std::time::Instant::now();
        let result = self.inner.complete(request).await;
        let duration = start.elapsed();

        match &result {
            Ok(response) => {
                tracing::info!(
                    model = %self.model_id,
                    duration_ms = %duration.as_millis(),
                    input_tokens = response.usage.input_tokens,
                    output_tokens = response.usage.output_tokens,
                    "LLM request completed"
                );
            }
            Err(e) => {
                tracing::error!(
                    model = %self.model_id,
                    duration_ms = %duration.as_millis(),
                    error = %e,
                    retryable = e.is_retryable(),
                    "LLM request failed"
                );
            }
        }

        result
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

/// Configuration for the LLM provider
#[derive(Debug, Clone, Default)]
pub struct LlmConfig {
    pub anthropic_api_key: Option<String>,
    /// Gateway URL that handles authentication on our behalf
    pub gateway: Option<String>,
    pub model: Option<String>,
}

impl LlmConfig {
    pub fn from_env() -> Self {
        Self {
            anthropic_api_key: std::env::var("ANTHROPIC_API_KEY").ok(),
            gateway: std::env::var("LLM_GATEWAY").ok(),
            model: std::env::var("WELLFLOW_MODEL").ok(),
        }
    }

    /// Build the configured service, wrapped with logging.
    ///
    /// Returns `None` when neither an API key nor a gateway is available.
    pub fn build(&self) -> Result<Option<Arc<dyn LlmService>>, LlmError> {
        let api_key = match (&self.gateway, &self.anthropic_api_key) {
            (Some(_), _) => "implicit".to_string(),
            (None, Some(key)) if !key.is_empty() => key.clone(),
            _ => return Ok(None),
        };
        let model = self.model.as_deref().unwrap_or(DEFAULT_MODEL);
        let service = AnthropicService::new(api_key, model, self.gateway.as_deref())?;
        Ok(Some(Arc::new(LoggingService::new(Arc::new(service)))))
    }
}

/// Pull the JSON object out of a model reply.
///
/// Models like to wrap JSON in code fences or prose; take the outermost
/// `{ ... }` span.
pub fn extract_json(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    text.get(start..=end)
}
