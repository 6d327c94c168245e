//! Ollama chat backend

use super::{ChatCompletion, LlmError};
use crate::config::LlmConfig;
use crate::memory::{Message, Role};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Client for a local Ollama server (`POST /api/chat`, non-streaming)
pub struct OllamaClient {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    temperature: f32,
    top_p: f32,
    timeout: Duration,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'static str>,
    options: ChatOptions,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatOptions {
    temperature: f32,
    top_p: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: String,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: String,
}

impl OllamaClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let timeout = Duration::from_secs(config.request_timeout_secs);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::Initialization(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: format!("{}/api/chat", config.ollama_host.trim_end_matches('/')),
            model: config.model.clone(),
            temperature: config.temperature,
            top_p: config.top_p,
            timeout,
        })
    }

    fn build_request<'a>(
        &'a self,
        system: &'a str,
        messages: &'a [Message],
        json: bool,
    ) -> ChatRequest<'a> {
        let mut chat = Vec::with_capacity(messages.len() + 1);
        if !system.is_empty() {
            chat.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        chat.extend(messages.iter().map(|m| ChatMessage {
            role: match m.role {
                Role::User => "user",
                Role::Assistant => "assistant",
            },
            content: &m.content,
        }));

        ChatRequest {
            model: &self.model,
            messages: chat,
            stream: false,
            format: json.then_some("json"),
            options: ChatOptions {
                temperature: self.temperature,
                top_p: self.top_p,
            },
        }
    }
}

#[async_trait]
impl ChatCompletion for OllamaClient {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn complete(
        &self,
        system: &str,
        messages: &[Message],
        json: bool,
    ) -> Result<String, LlmError> {
        let request = self.build_request(system, messages, json);
        tracing::debug!(model = %self.model, messages = request.messages.len(), "Ollama request");

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::from_transport(e, self.timeout))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error)
                .unwrap_or(body);
            return Err(LlmError::from_status(status.as_u16(), detail));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        let content = parsed.message.content.trim().to_string();
        if content.is_empty() {
            return Err(LlmError::InvalidResponse("Empty completion".to_string()));
        }
        Ok(content)
    }
}
