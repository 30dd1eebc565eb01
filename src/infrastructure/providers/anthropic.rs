//! # Anthropic Provider
//!
//! Claude messages API binding behind the `CapabilityProvider` trait. Serves
//! every text capability: the multi-turn assistant receives the stored
//! history, the single-shot tasks only their system instruction.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{http_client, map_http_error, map_http_status};
use crate::domain::config::{AnthropicConfig, secret_from_env};
use crate::domain::traits::CapabilityProvider;
use crate::domain::types::{ChatTurn, Content, Failure, Role};

const API_VERSION: &str = "2023-06-01";

pub struct AnthropicProvider {
    api_key: String,
    model: String,
    max_tokens: u32,
    base_url: String,
}

impl AnthropicProvider {
    pub fn new(config: &AnthropicConfig) -> Result<Self> {
        let api_key = secret_from_env(&config.api_key_env).map_err(anyhow::Error::msg)?;
        Ok(Self {
            api_key,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            base_url: config
                .endpoint
                .clone()
                .unwrap_or_else(|| "https://api.anthropic.com".to_string()),
        })
    }
}

/// Anthropic API request format
#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: &'static str,
    content: String,
}

impl AnthropicMessage {
    fn from_turn(turn: &ChatTurn) -> Self {
        Self {
            role: match turn.role {
                Role::User => "user",
                Role::Assistant => "assistant",
            },
            content: turn.content.clone(),
        }
    }
}

/// Anthropic API response format
#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicResponseContent>,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponseContent {
    #[serde(rename = "type")]
    content_type: String,
    #[serde(default)]
    text: String,
}

#[async_trait]
impl CapabilityProvider for AnthropicProvider {
    async fn invoke(
        &self,
        text: &str,
        system: Option<&str>,
        history: &[ChatTurn],
    ) -> Result<Content, Failure> {
        let mut messages: Vec<AnthropicMessage> =
            history.iter().map(AnthropicMessage::from_turn).collect();
        messages.push(AnthropicMessage {
            role: "user",
            content: text.to_string(),
        });

        let request = AnthropicRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            messages,
            system: system.map(str::to_string),
            temperature: 0.0,
        };

        let url = format!("{}/v1/messages", self.base_url);
        let response = http_client()
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(|e| map_http_error("anthropic", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            // Surface the API's own error message when it parses.
            if let Ok(json) = serde_json::from_str::<serde_json::Value>(&body) {
                if let Some(message) = json
                    .get("error")
                    .and_then(|e| e.get("message"))
                    .and_then(|m| m.as_str())
                {
                    tracing::error!("anthropic rejected request: {message}");
                    return Err(Failure::Provider(format!("anthropic: {message}")));
                }
            }
            return Err(map_http_status("anthropic", status, &body));
        }

        let parsed: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| Failure::Provider(format!("anthropic: undecodable response: {e}")))?;

        let reply: String = parsed
            .content
            .into_iter()
            .filter(|block| block.content_type == "text")
            .map(|block| block.text)
            .collect();

        tracing::info!("Response received");
        Ok(Content::Text(reply))
    }
}
