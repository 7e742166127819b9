use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use parking_lot::Mutex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use tracing::debug;

use crate::LlmError;

/// Connection settings for an OpenAI-compatible chat completions endpoint.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_base: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub timeout: Duration,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            model: "gpt-4o-mini".to_string(),
            temperature: 0.0,
            timeout: Duration::from_secs(60),
        }
    }
}

/// One chat turn: a system prompt, a user message and an optional page
/// screenshot attached as an image part.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub system: String,
    pub user: String,
    pub screenshot_png: Option<Vec<u8>>,
}

/// Anything that can answer a chat request with a JSON-bearing completion.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    async fn complete_json(&self, request: &ChatRequest) -> Result<String, LlmError>;
}

pub struct OpenAiChatClient {
    client: Client,
    config: LlmConfig,
}

impl OpenAiChatClient {
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        if config.api_key.is_empty() {
            return Err(LlmError::Transport("missing API key".to_string()));
        }
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|err| LlmError::Transport(format!("failed to build HTTP client: {err}")))?;
        Ok(Self { client, config })
    }

    fn user_content(request: &ChatRequest) -> JsonValue {
        match &request.screenshot_png {
            Some(png) => {
                let encoded = base64::engine::general_purpose::STANDARD.encode(png);
                json!([
                    { "type": "text", "text": request.user },
                    {
                        "type": "image_url",
                        "image_url": { "url": format!("data:image/png;base64,{encoded}") }
                    }
                ])
            }
            None => json!(request.user),
        }
    }
}

#[async_trait]
impl ChatProvider for OpenAiChatClient {
    async fn complete_json(&self, request: &ChatRequest) -> Result<String, LlmError> {
        let url = format!(
            "{}/chat/completions",
            self.config.api_base.trim_end_matches('/')
        );

        let body = ChatCompletionRequest {
            model: self.config.model.clone(),
            temperature: self.config.temperature,
            response_format: ResponseFormat {
                r#type: "json_object".to_string(),
            },
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: json!(request.system),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: Self::user_content(request),
                },
            ],
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| LlmError::Transport(format!("request failed: {err}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "<response unavailable>".to_string());
            return Err(LlmError::Transport(format!(
                "endpoint returned {status}: {text}"
            )));
        }

        let response: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|err| LlmError::Malformed(format!("response invalid: {err}")))?;

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.as_text())
            .ok_or_else(|| LlmError::Malformed("response missing content".to_string()))?;

        debug!(model = %self.config.model, bytes = content.len(), "chat completion received");
        Ok(content)
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    temperature: f32,
    response_format: ResponseFormat,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    r#type: String,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: JsonValue,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatCompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChoice {
    message: ChatCompletionMessage,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionMessage {
    content: ChatCompletionContent,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ChatCompletionContent {
    Text(String),
    Parts(Vec<ChatCompletionPart>),
}

impl ChatCompletionContent {
    fn as_text(&self) -> Option<String> {
        match self {
            ChatCompletionContent::Text(value) => Some(value.clone()),
            ChatCompletionContent::Parts(parts) => {
                let text = parts
                    .iter()
                    .filter_map(|part| part.text.as_ref())
                    .cloned()
                    .collect::<Vec<_>>()
                    .join("\n");
                if text.is_empty() {
                    None
                } else {
                    Some(text)
                }
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionPart {
    #[serde(default)]
    text: Option<String>,
}

/// Canned provider for tests and offline development: answers requests from
/// a fixed queue and records what it was asked.
#[derive(Default)]
pub struct ScriptedChatProvider {
    responses: Mutex<VecDeque<Result<String, LlmError>>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedChatProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_response(&self, content: impl Into<String>) {
        self.responses.lock().push_back(Ok(content.into()));
    }

    pub fn push_error(&self, err: LlmError) {
        self.responses.lock().push_back(Err(err));
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl ChatProvider for ScriptedChatProvider {
    async fn complete_json(&self, request: &ChatRequest) -> Result<String, LlmError> {
        self.requests.lock().push(request.clone());
        self.responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::Transport("no scripted response left".to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_content_is_plain_text_without_screenshot() {
        let request = ChatRequest {
            system: "sys".to_string(),
            user: "hello".to_string(),
            screenshot_png: None,
        };
        assert_eq!(OpenAiChatClient::user_content(&request), json!("hello"));
    }

    #[test]
    fn user_content_attaches_screenshot_as_data_url() {
        let request = ChatRequest {
            system: "sys".to_string(),
            user: "hello".to_string(),
            screenshot_png: Some(vec![1, 2, 3]),
        };
        let content = OpenAiChatClient::user_content(&request);
        let parts = content.as_array().expect("parts");
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0]["type"], "text");
        let url = parts[1]["image_url"]["url"].as_str().expect("url");
        assert!(url.starts_with("data:image/png;base64,"));
    }

    #[tokio::test]
    async fn scripted_provider_replays_in_order() {
        let provider = ScriptedChatProvider::new();
        provider.push_response("first");
        provider.push_response("second");
        let request = ChatRequest {
            system: String::new(),
            user: String::new(),
            screenshot_png: None,
        };
        assert_eq!(provider.complete_json(&request).await.unwrap(), "first");
        assert_eq!(provider.complete_json(&request).await.unwrap(), "second");
        assert!(provider.complete_json(&request).await.is_err());
    }
}
