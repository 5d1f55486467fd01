//! HTTP model backend over a provider adapter

use std::time::Duration;

use async_trait::async_trait;
use secrecy::SecretString;

use super::adapter::ProviderAdapter;
use super::backend::{ModelBackend, ModelRequest, ModelResponse};
use crate::error::TurnError;
use crate::{Error, Result};

/// Model backend reached over HTTPS
pub struct HttpModelBackend<A> {
    client: reqwest::Client,
    adapter: A,
    api_key: SecretString,
    model: String,
    url: String,
}

impl<A: ProviderAdapter> std::fmt::Debug for HttpModelBackend<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpModelBackend")
            .field("provider", &self.adapter.name())
            .field("model", &self.model)
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

impl<A: ProviderAdapter> HttpModelBackend<A> {
    /// Create a backend
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(
        adapter: A,
        api_key: SecretString,
        model: impl Into<String>,
        base_url: Option<&str>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;

        let base = base_url
            .unwrap_or_else(|| adapter.default_base_url())
            .trim_end_matches('/');
        let url = format!("{base}{}", adapter.endpoint_path());

        Ok(Self {
            client,
            adapter,
            api_key,
            model: model.into(),
            url,
        })
    }
}

#[async_trait]
impl<A: ProviderAdapter> ModelBackend for HttpModelBackend<A> {
    async fn invoke(&self, request: &ModelRequest) -> std::result::Result<ModelResponse, TurnError> {
        let body = self.adapter.build_body(&self.model, request);

        let mut http = self.client.post(&self.url).json(&body);
        for (name, value) in self.adapter.headers(&self.api_key) {
            http = http.header(name, value);
        }

        let started = std::time::Instant::now();
        let response = http
            .send()
            .await
            .map_err(|e| TurnError::BackendUnavailable(e.to_string()))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| TurnError::BackendUnavailable(e.to_string()))?;

        tracing::debug!(
            provider = self.adapter.name(),
            status = %status,
            elapsed_ms = started.elapsed().as_millis(),
            "model backend responded"
        );

        if !status.is_success() {
            let body = String::from_utf8_lossy(&bytes);
            return Err(TurnError::BackendUnavailable(format!("{status}: {body}")));
        }

        self.adapter.parse_response(&bytes)
    }
}
