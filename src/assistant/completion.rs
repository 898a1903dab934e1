use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::chat::PromptRole;
use crate::config::AssistantConfig;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromptMessage {
    pub role: PromptRole,
    pub content: String,
}

impl PromptMessage {
    pub fn new(role: PromptRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("completion request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("completion service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("completion response had no choices")]
    NoChoices,
}

/// A hosted text-completion service.
#[async_trait]
pub trait Completion: Send + Sync {
    /// Returns the text of the first choice, `None` when the service replied
    /// without content.
    async fn complete(&self, messages: &[PromptMessage]) -> Result<Option<String>, CompletionError>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [PromptMessage],
    max_tokens: u32,
    temperature: f64,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// Client for OpenAI-compatible `/chat/completions` endpoints.
pub struct OpenAiClient {
    client: reqwest::Client,
    endpoint: String,
    auth_header: String,
    model: String,
    max_tokens: u32,
    temperature: f64,
}

impl OpenAiClient {
    /// `None` when no API key is configured.
    pub fn from_config(config: &AssistantConfig) -> Option<Self> {
        let api_key = config.api_key.as_deref()?;
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Some(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            auth_header: format!("Bearer {api_key}"),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }
}

#[async_trait]
impl Completion for OpenAiClient {
    async fn complete(&self, messages: &[PromptMessage]) -> Result<Option<String>, CompletionError> {
        let request = ChatRequest {
            model: &self.model,
            messages,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        debug!(model = %self.model, messages = messages.len(), "-> Sending completion request");

        let response = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::AUTHORIZATION, &self.auth_header)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response.json().await?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or(CompletionError::NoChoices)?;
        Ok(choice.message.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(base_url: &str, api_key: Option<&str>) -> AssistantConfig {
        AssistantConfig {
            api_key: api_key.map(str::to_string),
            base_url: base_url.to_string(),
            model: "gpt-4o".to_string(),
            max_tokens: 1000,
            temperature: 0.7,
        }
    }

    fn prompt() -> Vec<PromptMessage> {
        vec![
            PromptMessage::new(PromptRole::System, "You are Violet."),
            PromptMessage::new(PromptRole::User, "Hi"),
        ]
    }

    #[test]
    fn no_key_means_unconfigured() {
        assert!(OpenAiClient::from_config(&config("https://api.openai.com/v1", None)).is_none());
    }

    #[tokio::test]
    async fn returns_first_choice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({
                "model": "gpt-4o",
                "max_tokens": 1000,
                "messages": [
                    { "role": "system", "content": "You are Violet." },
                    { "role": "user", "content": "Hi" }
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{ "message": { "role": "assistant", "content": "Hello there" } }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = OpenAiClient::from_config(&config(&server.uri(), Some("sk-test"))).unwrap();
        let reply = client.complete(&prompt()).await.unwrap();
        assert_eq!(reply.as_deref(), Some("Hello there"));
    }

    #[tokio::test]
    async fn null_content_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{ "message": { "role": "assistant", "content": null } }]
            })))
            .mount(&server)
            .await;

        let client = OpenAiClient::from_config(&config(&server.uri(), Some("sk-test"))).unwrap();
        assert_eq!(client.complete(&prompt()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn error_status_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("quota exceeded"))
            .mount(&server)
            .await;

        let client = OpenAiClient::from_config(&config(&server.uri(), Some("sk-test"))).unwrap();
        let err = client.complete(&prompt()).await.unwrap_err();
        assert!(matches!(err, CompletionError::Status { status: 429, .. }));
    }

    #[tokio::test]
    async fn empty_choices_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
            .mount(&server)
            .await;

        let client = OpenAiClient::from_config(&config(&server.uri(), Some("sk-test"))).unwrap();
        assert!(matches!(
            client.complete(&prompt()).await.unwrap_err(),
            CompletionError::NoChoices
        ));
    }
}
