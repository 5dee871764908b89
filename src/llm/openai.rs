//! OpenAI-compatible chat completion client.
//!
//! Speaks the `/v1/chat/completions` shape, which also covers vLLM and
//! Ollama endpoints. Keyless local endpoints are supported by leaving
//! `api_key_env` empty in the configuration.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};

use super::{LlmError, LlmProvider};
use crate::config::LlmConfig;
use crate::domain::ChatMessage;

#[derive(Debug)]
pub struct OpenAiProvider {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl OpenAiProvider {
    /// Create a provider from configuration, reading the API key from the
    /// configured environment variable.
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_key = if config.api_key_env.is_empty() {
            None
        } else {
            match std::env::var(&config.api_key_env) {
                Ok(key) if !key.is_empty() => Some(key),
                _ => {
                    return Err(LlmError::MissingApiKey {
                        env_var: config.api_key_env.clone(),
                    });
                }
            }
        };

        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
        })
    }

    fn build_request(&self, messages: &[ChatMessage]) -> Value {
        let messages: Vec<Value> = messages
            .iter()
            .map(|m| {
                json!({
                    "role": m.role.as_str(),
                    "content": m.content,
                })
            })
            .collect();

        json!({
            "model": self.model,
            "messages": messages,
        })
    }

    fn extract_content(response: &Value) -> Result<String, LlmError> {
        response
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|choice| choice.get("message"))
            .and_then(|message| message.get("content"))
            .and_then(|content| content.as_str())
            .map(str::to_string)
            .ok_or_else(|| {
                LlmError::InvalidResponse("no choices[0].message.content in response".to_string())
            })
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = self.build_request(messages);

        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: Value = response.json().await?;
        Self::extract_content(&parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Role;

    fn provider() -> OpenAiProvider {
        let config = LlmConfig {
            base_url: "http://localhost:9999/".to_string(),
            model: "test-model".to_string(),
            api_key_env: String::new(),
            timeout_ms: 1000,
        };
        OpenAiProvider::new(&config).unwrap()
    }

    #[test]
    fn test_new_without_api_key_env() {
        let p = provider();
        assert!(p.api_key.is_none());
        // Trailing slash is normalized away
        assert_eq!(p.base_url, "http://localhost:9999");
    }

    #[test]
    fn test_new_missing_api_key_fails() {
        let config = LlmConfig {
            api_key_env: "AGENTR_TEST_KEY_THAT_DOES_NOT_EXIST".to_string(),
            ..LlmConfig::default()
        };
        let err = OpenAiProvider::new(&config).unwrap_err();
        assert!(matches!(err, LlmError::MissingApiKey { .. }));
    }

    #[test]
    fn test_build_request_shape() {
        let p = provider();
        let messages = vec![
            ChatMessage::system("be helpful"),
            ChatMessage::user("hello"),
        ];
        let body = p.build_request(&messages);

        assert_eq!(body["model"], "test-model");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hello");
    }

    #[test]
    fn test_extract_content() {
        let response = json!({
            "choices": [{"message": {"role": "assistant", "content": "the reply"}}]
        });
        assert_eq!(OpenAiProvider::extract_content(&response).unwrap(), "the reply");
    }

    #[test]
    fn test_extract_content_malformed() {
        let response = json!({"choices": []});
        assert!(OpenAiProvider::extract_content(&response).is_err());

        let response = json!({"error": "nope"});
        assert!(OpenAiProvider::extract_content(&response).is_err());
    }

    #[test]
    fn test_role_wire_names() {
        assert_eq!(Role::System.as_str(), "system");
        assert_eq!(Role::User.as_str(), "user");
        assert_eq!(Role::Assistant.as_str(), "assistant");
    }
}
