//! OpenAI-compatible chat completions client.

use super::{CompletionRequest, LlmClient};
use crate::config::LlmSettings;
use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::debug;

/// Longest slice of an error body kept in the error message.
const ERROR_BODY_EXCERPT: usize = 300;

pub struct OpenAiClient {
    base_url: String,
    model: String,
    api_key: Option<String>,
    http: Client,
}

impl std::fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "****"))
            .finish()
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiClient {
    pub fn new(settings: &LlmSettings) -> AppResult<Self> {
        let http = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| AppError::config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            api_key: settings.api_key.clone(),
            http,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, request: &CompletionRequest) -> AppResult<String> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| AppError::llm("no API key configured"))?;

        let body = ChatRequest {
            model: &self.model,
            temperature: request.temperature,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user,
                },
            ],
        };

        let start = Instant::now();
        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let excerpt: String = text.chars().take(ERROR_BODY_EXCERPT).collect();
            return Err(AppError::llm(format!("HTTP {}: {}", status, excerpt)));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| AppError::llm(format!("malformed completion response: {}", e)))?;

        debug!(
            model = %self.model,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "LLM completion received"
        );

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| AppError::llm("completion has no content"))
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn settings(api_key: Option<&str>) -> LlmSettings {
        LlmSettings {
            model: "gpt-4o-mini".into(),
            base_url: "http://127.0.0.1:1/v1/".into(),
            api_key_env: "OPENAI_API_KEY".into(),
            api_key: api_key.map(String::from),
            timeout: Duration::from_secs(1),
        }
    }

    #[test]
    fn test_endpoint_strips_trailing_slash() {
        let client = OpenAiClient::new(&settings(Some("k"))).unwrap();
        assert_eq!(client.endpoint(), "http://127.0.0.1:1/v1/chat/completions");
    }

    #[test]
    fn test_debug_masks_key() {
        let client = OpenAiClient::new(&settings(Some("sk-secret"))).unwrap();
        let debug = format!("{:?}", client);
        assert!(!debug.contains("sk-secret"));
    }

    #[tokio::test]
    async fn test_missing_key_is_llm_error() {
        let client = OpenAiClient::new(&settings(None)).unwrap();
        let err = client
            .complete(&CompletionRequest::new("s", "u"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Llm { .. }));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_llm_error() {
        let client = OpenAiClient::new(&settings(Some("k"))).unwrap();
        let err = client
            .complete(&CompletionRequest::new("s", "u"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Llm { .. }), "{err:?}");
    }

    #[test]
    fn test_response_parsing_tolerates_missing_content() {
        let parsed: ChatResponse =
            serde_json::from_str(r#"{"choices":[{"message":{"role":"assistant"}}]}"#).unwrap();
        assert!(parsed.choices[0].message.content.is_none());
    }
}
