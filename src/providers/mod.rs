//! LLM Provider Abstraction
//!
//! Every backend is reached through the `Provider` trait. Two wire formats
//! are supported:
//! - `openai`: OpenAI-compatible `/chat/completions` (OpenAI, DeepInfra,
//!   TogetherAI, Ollama, LM Studio, vLLM...)
//! - `anthropic`: Anthropic-compatible `/messages` (Anthropic, Z.AI...)
//!
//! Both share `HttpBackend`, which owns the configured `reqwest::Client`.

pub mod anthropic;
pub mod openai;

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;
use thiserror::Error;

use crate::core::config::{BackendConfig, ProviderKind};

pub use anthropic::AnthropicCompatibleProvider;
pub use openai::OpenAiCompatibleProvider;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("API key required but not found. Set environment variable: {0}")]
    MissingApiKey(String),
    #[error("invalid header {0}")]
    InvalidHeader(&'static str),
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Unexpected response format: {0}")]
    UnexpectedResponse(String),
}

/// Standardized response from any provider.
#[derive(Debug, Clone)]
pub struct ProviderResponse {
    pub text: String,
    pub raw: Value,
    pub model: String,
    pub tokens_used: Option<u64>,
}

/// Optional sampling parameters. Unset values are left out of the payload.
#[derive(Debug, Clone, Copy, Default)]
pub struct CallOptions {
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
}

impl CallOptions {
    fn apply(&self, payload: &mut Value) {
        if let Some(temperature) = self.temperature {
            payload["temperature"] = temperature.into();
        }
        if let Some(top_p) = self.top_p {
            payload["top_p"] = top_p.into();
        }
    }
}

#[async_trait]
pub trait Provider: Send + Sync {
    /// Short provider name used in logs.
    fn name(&self) -> &'static str;

    /// Model requests are sent to.
    fn model(&self) -> &str;

    /// Send one system + user prompt pair and return the reply.
    async fn call(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        options: &CallOptions,
    ) -> Result<ProviderResponse, ProviderError>;
}

/// Create the provider selected by `config.provider`.
pub fn create_provider(
    config: &BackendConfig,
    api_key: String,
) -> Result<Arc<dyn Provider>, ProviderError> {
    let provider: Arc<dyn Provider> = match config.provider {
        ProviderKind::OpenAiCompatible => {
            Arc::new(OpenAiCompatibleProvider::new(config.clone(), api_key)?)
        }
        ProviderKind::AnthropicCompatible => {
            Arc::new(AnthropicCompatibleProvider::new(config.clone(), api_key)?)
        }
    };
    tracing::info!("{} initialized: {}", provider.name(), provider.model());
    Ok(provider)
}

/// HTTP plumbing shared by the concrete providers.
#[derive(Debug)]
pub(crate) struct HttpBackend {
    client: reqwest::Client,
    pub(crate) config: BackendConfig,
    api_key: String,
}

impl HttpBackend {
    pub(crate) fn new(
        config: BackendConfig,
        api_key: String,
        mut headers: HeaderMap,
    ) -> Result<Self, ProviderError> {
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout_duration())
            .build()?;
        Ok(Self {
            client,
            config,
            api_key,
        })
    }

    /// Fail before any request when a key variable is configured but empty.
    pub(crate) fn validate_api_key(&self) -> Result<(), ProviderError> {
        if !self.config.api_key_env.is_empty() && self.api_key.is_empty() {
            return Err(ProviderError::MissingApiKey(self.config.api_key_env.clone()));
        }
        Ok(())
    }

    pub(crate) fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// POST `payload` to `path` and decode the JSON body of a 2xx reply.
    pub(crate) async fn post_json(&self, path: &str, payload: &Value) -> Result<Value, ProviderError> {
        let url = self.endpoint(path);
        tracing::debug!("Calling {}", url);
        let response = self.client.post(&url).json(payload).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json::<Value>().await?)
    }
}

/// Build a sensitive header value, refusing keys with invalid characters.
pub(crate) fn secret_header(
    headers: &mut HeaderMap,
    name: HeaderName,
    value: &str,
    label: &'static str,
) -> Result<(), ProviderError> {
    let mut value = HeaderValue::from_str(value).map_err(|_| ProviderError::InvalidHeader(label))?;
    value.set_sensitive(true);
    headers.insert(name, value);
    Ok(())
}
