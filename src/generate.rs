//! Chat-completion client for grounded answer generation.
//!
//! Speaks the OpenAI-compatible `/chat/completions` shape so the generation
//! endpoint is swappable by configuration. Transient failures (429, 5xx,
//! network) are retried with exponential backoff; other client errors fail
//! fast.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use crate::config::GenerationConfig;

/// Generation-boundary failure, surfaced after bounded retries.
#[derive(Debug)]
pub enum GenerateError {
    Unavailable(String),
}

impl std::fmt::Display for GenerateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GenerateError::Unavailable(e) => write!(f, "generation unavailable: {}", e),
        }
    }
}

impl std::error::Error for GenerateError {}

/// One turn of a chat prompt.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Text generation boundary.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, messages: &[ChatMessage]) -> Result<String, GenerateError>;
}

/// HTTP chat-completions client.
pub struct ChatClient {
    config: GenerationConfig,
    api_key: String,
    client: reqwest::Client,
}

impl ChatClient {
    pub fn new(config: GenerationConfig, api_key: String) -> Result<Self, GenerateError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GenerateError::Unavailable(e.to_string()))?;
        Ok(Self {
            config,
            api_key,
            client,
        })
    }
}

/// Build the default generator from configuration, taking the API key from
/// the `OPENROUTER_API_KEY` environment variable.
pub fn create_generator(config: &GenerationConfig) -> anyhow::Result<Box<dyn Generator>> {
    let api_key = std::env::var("OPENROUTER_API_KEY")
        .map_err(|_| anyhow::anyhow!("OPENROUTER_API_KEY not set"))?;
    Ok(Box::new(ChatClient::new(config.clone(), api_key)?))
}

#[async_trait]
impl Generator for ChatClient {
    async fn generate(&self, messages: &[ChatMessage]) -> Result<String, GenerateError> {
        let url = format!(
            "{}/chat/completions",
            self.config.endpoint.trim_end_matches('/')
        );
        let body = serde_json::json!({
            "model": self.config.model,
            "temperature": self.config.temperature,
            "messages": messages,
        });

        let mut last_err = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                debug!(attempt, ?delay, "retrying chat completion");
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(&url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let json: serde_json::Value = response
                            .json()
                            .await
                            .map_err(|e| GenerateError::Unavailable(e.to_string()))?;
                        return parse_chat_response(&json);
                    }
                    let text = response.text().await.unwrap_or_default();
                    if status.as_u16() == 429 || status.is_server_error() {
                        last_err = Some(format!("chat API error {}: {}", status, text));
                        continue;
                    }
                    return Err(GenerateError::Unavailable(format!(
                        "chat API error {}: {}",
                        status, text
                    )));
                }
                Err(e) => {
                    last_err = Some(e.to_string());
                    continue;
                }
            }
        }

        Err(GenerateError::Unavailable(
            last_err.unwrap_or_else(|| "chat request failed after retries".to_string()),
        ))
    }
}

fn parse_chat_response(json: &serde_json::Value) -> Result<String, GenerateError> {
    json.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .ok_or_else(|| {
            GenerateError::Unavailable(format!("unexpected chat response shape: {}", json))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn test_config(endpoint: String, max_retries: u32) -> GenerationConfig {
        GenerationConfig {
            endpoint,
            max_retries,
            ..GenerationConfig::default()
        }
    }

    #[test]
    fn parse_valid_chat_response() {
        let json = serde_json::json!({
            "choices": [
                { "message": { "role": "assistant", "content": "  The answer.  " } }
            ]
        });
        assert_eq!(parse_chat_response(&json).unwrap(), "The answer.");
    }

    #[test]
    fn parse_rejects_empty_choices() {
        let json = serde_json::json!({ "choices": [] });
        assert!(parse_chat_response(&json).is_err());
    }

    #[tokio::test]
    async fn generate_returns_completion() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(200).json_body(serde_json::json!({
                    "choices": [
                        { "message": { "role": "assistant", "content": "42" } }
                    ]
                }));
            })
            .await;

        let client =
            ChatClient::new(test_config(server.base_url(), 0), "test-key".to_string()).unwrap();
        let answer = client
            .generate(&[ChatMessage::user("what is the answer?")])
            .await
            .unwrap();
        assert_eq!(answer, "42");
        mock.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn generate_fails_fast_on_auth_error() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(401).body("bad key");
            })
            .await;

        let client =
            ChatClient::new(test_config(server.base_url(), 3), "bad-key".to_string()).unwrap();
        let err = client
            .generate(&[ChatMessage::user("hello")])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("401"));
        mock.assert_hits_async(1).await;
    }
}
