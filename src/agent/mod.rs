//! Model backends and the tool-calling loop

mod adapter;
mod backend;
mod http;
mod runner;

use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};

use crate::config::{Config, LlmProvider};
use crate::Result;

pub use adapter::{AnthropicAdapter, OpenAiAdapter, ProviderAdapter};
pub use backend::{
    ModelBackend, ModelRequest, ModelResponse, SamplingParams, StopReason, ToolInvocation,
};
pub use http::HttpModelBackend;
pub use runner::{FillerSink, LoopSettings, ToolLoop};

/// Build the model backend for the configured provider family
///
/// # Errors
///
/// Returns error if the API key is missing or the HTTP client cannot be built
pub fn build_backend(config: &Config) -> Result<Arc<dyn ModelBackend>> {
    let key = SecretString::from(config.llm_api_key()?.expose_secret().to_owned());
    let llm = &config.llm;
    let base_url = llm.base_url.as_deref();

    tracing::info!(provider = ?llm.provider, model = %llm.model, "using model backend");

    Ok(match llm.provider {
        LlmProvider::Anthropic => Arc::new(HttpModelBackend::new(
            AnthropicAdapter,
            key,
            &llm.model,
            base_url,
            llm.request_timeout,
        )?),
        LlmProvider::OpenAi => Arc::new(HttpModelBackend::new(
            OpenAiAdapter,
            key,
            &llm.model,
            base_url,
            llm.request_timeout,
        )?),
    })
}
