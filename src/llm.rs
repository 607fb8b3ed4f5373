use anyhow::{Context, Result};
use std::sync::Arc;

use crate::config::{AiModelConfig, DecisionProvider};

/// Parameters for one chat completion.
pub struct ChatRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    pub temperature: f32,
    pub json_format: bool,
}

/// A chat-completion backend.
#[async_trait::async_trait]
pub trait ChatModel: Send + Sync {
    fn name(&self) -> &str;
    async fn chat(&self, request: ChatRequest) -> Result<String>;
}

/// Shared HTTP client for Ollama API calls.
pub struct OllamaClient {
    pub endpoint: String,
    pub model: String,
    client: reqwest::Client,
}

impl OllamaClient {
    pub fn new(endpoint: String, model: String) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait::async_trait]
impl ChatModel for OllamaClient {
    fn name(&self) -> &str {
        "ollama"
    }

    /// Send a chat request to the Ollama API and return the response content.
    async fn chat(&self, request: ChatRequest) -> Result<String> {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": request.system_prompt },
                { "role": "user", "content": request.user_prompt }
            ],
            "stream": false,
            "options": {
                "temperature": request.temperature
            }
        });

        if request.json_format {
            body["format"] = serde_json::json!("json");
        }

        let response = self
            .client
            .post(format!("{}/api/chat", self.endpoint))
            .json(&body)
            .send()
            .await
            .context("Failed to send request to Ollama")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("Ollama API error ({}): {}", status, error_text);
        }

        let response_json: serde_json::Value = response
            .json()
            .await
            .context("Failed to parse Ollama response")?;

        let content = response_json["message"]["content"]
            .as_str()
            .context("No content in Ollama response")?
            .to_string();

        Ok(content)
    }
}

/// Client for OpenAI-compatible `/chat/completions` endpoints.
pub struct OpenAiClient {
    pub endpoint: String,
    pub model: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiClient {
    pub const DEFAULT_ENDPOINT: &'static str = "https://api.openai.com/v1";
    pub const DEFAULT_MODEL: &'static str = "gpt-4o-mini";

    pub fn new(endpoint: String, model: String, api_key: String) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model,
            api_key,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait::async_trait]
impl ChatModel for OpenAiClient {
    fn name(&self) -> &str {
        "openai"
    }

    async fn chat(&self, request: ChatRequest) -> Result<String> {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": request.system_prompt },
                { "role": "user", "content": request.user_prompt }
            ],
            "temperature": request.temperature
        });

        if request.json_format {
            body["response_format"] = serde_json::json!({ "type": "json_object" });
        }

        let response = self
            .client
            .post(format!("{}/chat/completions", self.endpoint))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("Failed to send request to OpenAI")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("OpenAI API error ({}): {}", status, error_text);
        }

        let response_json: serde_json::Value = response
            .json()
            .await
            .context("Failed to parse OpenAI response")?;

        let content = response_json["choices"][0]["message"]["content"]
            .as_str()
            .context("No content in OpenAI response")?
            .to_string();

        Ok(content)
    }
}

/// Chat backend for the configured provider; `None` for rule-based briefings.
pub fn chat_model_from_config(config: &AiModelConfig) -> Option<Arc<dyn ChatModel>> {
    let or_default = |value: &str, default: &str| {
        if value.trim().is_empty() {
            default.to_string()
        } else {
            value.to_string()
        }
    };

    match config.provider {
        DecisionProvider::Ollama => Some(Arc::new(OllamaClient::new(
            config.endpoint.clone(),
            config.model.clone(),
        ))),
        DecisionProvider::Openai => Some(Arc::new(OpenAiClient::new(
            or_default(&config.endpoint, OpenAiClient::DEFAULT_ENDPOINT),
            or_default(&config.model, OpenAiClient::DEFAULT_MODEL),
            config.api_key.clone().unwrap_or_default(),
        ))),
        DecisionProvider::Rules => None,
    }
}
