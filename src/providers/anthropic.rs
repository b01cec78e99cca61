use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Deserialize;
use serde_json::{Value, json};

use super::{CallOptions, HttpBackend, Provider, ProviderError, ProviderResponse, secret_header};
use crate::core::config::{BackendConfig, DEFAULT_API_VERSION};

/// Provider for Anthropic-compatible `/messages` APIs.
#[derive(Debug)]
pub struct AnthropicCompatibleProvider {
    backend: HttpBackend,
}

impl AnthropicCompatibleProvider {
    pub fn new(config: BackendConfig, api_key: String) -> Result<Self, ProviderError> {
        let mut headers = HeaderMap::new();
        let version = config.api_version.as_deref().unwrap_or(DEFAULT_API_VERSION);
        headers.insert(
            HeaderName::from_static("anthropic-version"),
            HeaderValue::from_str(version).map_err(|_| ProviderError::InvalidHeader("anthropic-version"))?,
        );
        if !api_key.is_empty() {
            secret_header(&mut headers, HeaderName::from_static("x-api-key"), &api_key, "x-api-key")?;
        }
        Ok(Self {
            backend: HttpBackend::new(config, api_key, headers)?,
        })
    }

    fn payload(&self, system_prompt: &str, user_prompt: &str, options: &CallOptions) -> Value {
        let mut payload = json!({
            "model": self.backend.config.model,
            "max_tokens": self.backend.config.max_tokens,
            "system": system_prompt,
            "messages": [
                {"role": "user", "content": user_prompt}
            ]
        });
        options.apply(&mut payload);
        payload
    }
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    model: Option<String>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    input_tokens: Option<u64>,
    output_tokens: Option<u64>,
}

/// Extract the first text block from a messages body. Non-text blocks
/// (thinking, tool use) ahead of it are skipped.
pub(crate) fn parse_response(data: Value, fallback_model: &str) -> Result<ProviderResponse, ProviderError> {
    let message: MessagesResponse = serde_json::from_value(data.clone())
        .map_err(|e| ProviderError::UnexpectedResponse(e.to_string()))?;
    let text = message
        .content
        .into_iter()
        .find_map(|block| block.text)
        .ok_or_else(|| ProviderError::UnexpectedResponse("response has no text content".to_string()))?;
    let tokens_used = message.usage.and_then(|u| match (u.input_tokens, u.output_tokens) {
        (Some(input), Some(output)) => input.checked_add(output),
        _ => None,
    });
    Ok(ProviderResponse {
        text,
        raw: data,
        model: message.model.unwrap_or_else(|| fallback_model.to_string()),
        tokens_used,
    })
}

#[async_trait]
impl Provider for AnthropicCompatibleProvider {
    fn name(&self) -> &'static str {
        "AnthropicCompatibleProvider"
    }

    fn model(&self) -> &str {
        &self.backend.config.model
    }

    async fn call(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        options: &CallOptions,
    ) -> Result<ProviderResponse, ProviderError> {
        self.backend.validate_api_key()?;
        let payload = self.payload(system_prompt, user_prompt, options);
        let data = self
            .backend
            .post_json("/messages", &payload)
            .await
            .inspect_err(|e| tracing::error!("Anthropic-compatible API error: {}", e))?;
        parse_response(data, self.model())
            .inspect_err(|e| tracing::error!("{}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_puts_system_prompt_at_top_level() {
        let config = BackendConfig {
            model: "glm-4.7".into(),
            ..BackendConfig::default()
        };
        let provider = AnthropicCompatibleProvider::new(config, String::new()).unwrap();
        let options = CallOptions {
            temperature: None,
            top_p: Some(0.9),
        };
        assert_eq!(
            provider.payload("sys", "usr", &options),
            json!({
                "model": "glm-4.7",
                "max_tokens": 8192,
                "system": "sys",
                "messages": [{"role": "user", "content": "usr"}],
                "top_p": 0.9
            })
        );
    }

    #[test]
    fn sums_input_and_output_tokens() {
        let body = json!({
            "id": "msg_1",
            "model": "claude-sonnet-4-20250514",
            "content": [{"type": "text", "text": "done"}],
            "usage": {"input_tokens": 10, "output_tokens": 5}
        });
        let response = parse_response(body, "fallback").unwrap();
        assert_eq!(response.text, "done");
        assert_eq!(response.model, "claude-sonnet-4-20250514");
        assert_eq!(response.tokens_used, Some(15));
    }

    #[test]
    fn skips_blocks_without_text() {
        let body = json!({
            "content": [
                {"type": "thinking", "thinking": "hmm"},
                {"type": "text", "text": "answer"}
            ],
            "usage": {"output_tokens": 5}
        });
        let response = parse_response(body, "glm-4.7").unwrap();
        assert_eq!(response.text, "answer");
        assert_eq!(response.model, "glm-4.7");
        assert_eq!(response.tokens_used, None);
    }

    #[test]
    fn overflowing_usage_is_dropped() {
        let body = json!({
            "content": [{"type": "text", "text": "ok"}],
            "usage": {"input_tokens": u64::MAX, "output_tokens": 1}
        });
        let response = parse_response(body, "m").unwrap();
        assert_eq!(response.tokens_used, None);
    }

    #[test]
    fn empty_content_is_unexpected() {
        let err = parse_response(json!({"content": []}), "m").unwrap_err();
        assert!(matches!(err, ProviderError::UnexpectedResponse(_)));
    }
}
