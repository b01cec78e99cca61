use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderMap};
use serde::Deserialize;
use serde_json::{Value, json};

use super::{CallOptions, HttpBackend, Provider, ProviderError, ProviderResponse, secret_header};
use crate::core::config::BackendConfig;

/// Provider for OpenAI-compatible `/chat/completions` APIs.
#[derive(Debug)]
pub struct OpenAiCompatibleProvider {
    backend: HttpBackend,
}

impl OpenAiCompatibleProvider {
    pub fn new(config: BackendConfig, api_key: String) -> Result<Self, ProviderError> {
        let mut headers = HeaderMap::new();
        if !api_key.is_empty() {
            secret_header(&mut headers, AUTHORIZATION, &format!("Bearer {api_key}"), "authorization")?;
        }
        Ok(Self {
            backend: HttpBackend::new(config, api_key, headers)?,
        })
    }

    fn payload(&self, system_prompt: &str, user_prompt: &str, options: &CallOptions) -> Value {
        let mut payload = json!({
            "model": self.backend.config.model,
            "messages": [
                {"role": "system", "content": system_prompt},
                {"role": "user", "content": user_prompt}
            ],
            "max_tokens": self.backend.config.max_tokens
        });
        options.apply(&mut payload);
        payload
    }
}

#[derive(Deserialize)]
struct ChatCompletion {
    choices: Vec<Choice>,
    model: Option<String>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Deserialize)]
struct Message {
    content: String,
}

#[derive(Deserialize)]
struct Usage {
    total_tokens: Option<u64>,
}

/// Extract the first choice from a chat completion body.
pub(crate) fn parse_response(data: Value, fallback_model: &str) -> Result<ProviderResponse, ProviderError> {
    let completion: ChatCompletion = serde_json::from_value(data.clone())
        .map_err(|e| ProviderError::UnexpectedResponse(e.to_string()))?;
    let text = completion
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message.content)
        .ok_or_else(|| ProviderError::UnexpectedResponse("response has no choices".to_string()))?;
    Ok(ProviderResponse {
        text,
        raw: data,
        model: completion.model.unwrap_or_else(|| fallback_model.to_string()),
        tokens_used: completion.usage.and_then(|u| u.total_tokens),
    })
}

#[async_trait]
impl Provider for OpenAiCompatibleProvider {
    fn name(&self) -> &'static str {
        "OpenAICompatibleProvider"
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
            .post_json("/chat/completions", &payload)
            .await
            .inspect_err(|e| tracing::error!("OpenAI-compatible API error: {}", e))?;
        parse_response(data, self.model())
            .inspect_err(|e| tracing::error!("{}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> OpenAiCompatibleProvider {
        let config = BackendConfig {
            model: "gpt-4o".into(),
            max_tokens: 256,
            ..BackendConfig::default()
        };
        OpenAiCompatibleProvider::new(config, "sk-test".into()).unwrap()
    }

    #[test]
    fn payload_carries_both_messages() {
        let payload = provider().payload("sys", "usr", &CallOptions::default());
        assert_eq!(
            payload,
            json!({
                "model": "gpt-4o",
                "messages": [
                    {"role": "system", "content": "sys"},
                    {"role": "user", "content": "usr"}
                ],
                "max_tokens": 256
            })
        );
    }

    #[test]
    fn parses_first_choice_and_usage() {
        let body = json!({
            "model": "gpt-4o-2024-08-06",
            "choices": [{"message": {"role": "assistant", "content": "hello"}}],
            "usage": {"prompt_tokens": 3, "completion_tokens": 4, "total_tokens": 7}
        });
        let response = parse_response(body, "gpt-4o").unwrap();
        assert_eq!(response.text, "hello");
        assert_eq!(response.model, "gpt-4o-2024-08-06");
        assert_eq!(response.tokens_used, Some(7));
    }

    #[test]
    fn model_and_usage_are_optional() {
        let body = json!({"choices": [{"message": {"content": "hi"}}]});
        let response = parse_response(body, "llama3.1").unwrap();
        assert_eq!(response.model, "llama3.1");
        assert_eq!(response.tokens_used, None);
    }

    #[test]
    fn empty_choices_is_unexpected() {
        let err = parse_response(json!({"choices": []}), "m").unwrap_err();
        assert!(matches!(err, ProviderError::UnexpectedResponse(_)));
        let err = parse_response(json!({"error": "boom"}), "m").unwrap_err();
        assert!(matches!(err, ProviderError::UnexpectedResponse(_)));
    }
}
