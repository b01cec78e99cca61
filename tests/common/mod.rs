//! Shared test doubles.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use llm_delegator::providers::{CallOptions, Provider, ProviderError, ProviderResponse};

/// One recorded provider call.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub system_prompt: String,
    pub user_prompt: String,
}

/// Provider that answers with a canned reply (or failure) and records calls.
pub struct StubProvider {
    model: String,
    reply: Result<String, String>,
    pub calls: Mutex<Vec<RecordedCall>>,
}

impl StubProvider {
    pub fn replying(text: &str) -> Arc<Self> {
        Arc::new(Self {
            model: "stub-model".to_string(),
            reply: Ok(text.to_string()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            model: "stub-model".to_string(),
            reply: Err(message.to_string()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn recorded(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for StubProvider {
    fn name(&self) -> &'static str {
        "StubProvider"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn call(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        _options: &CallOptions,
    ) -> Result<ProviderResponse, ProviderError> {
        self.calls.lock().unwrap().push(RecordedCall {
            system_prompt: system_prompt.to_string(),
            user_prompt: user_prompt.to_string(),
        });
        match &self.reply {
            Ok(text) => Ok(ProviderResponse {
                text: text.clone(),
                raw: serde_json::json!({}),
                model: self.model.clone(),
                tokens_used: Some(42),
            }),
            Err(message) => Err(ProviderError::UnexpectedResponse(message.clone())),
        }
    }
}
