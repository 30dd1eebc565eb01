//! # ElevenLabs Provider
//!
//! Text-to-speech binding returning an mp3 clip for the speech capability.

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use super::{http_client, map_http_error, map_http_status};
use crate::domain::config::{SpeechConfig, secret_from_env};
use crate::domain::traits::CapabilityProvider;
use crate::domain::types::{ChatTurn, Content, Failure};

pub struct ElevenLabsProvider {
    api_key: String,
    voice: String,
    model: String,
    base_url: String,
}

impl ElevenLabsProvider {
    pub fn new(config: &SpeechConfig) -> Result<Self> {
        let api_key = secret_from_env(&config.api_key_env).map_err(anyhow::Error::msg)?;
        Ok(Self {
            api_key,
            voice: config.voice.clone(),
            model: config.model.clone(),
            base_url: config
                .endpoint
                .clone()
                .unwrap_or_else(|| "https://api.elevenlabs.io".to_string()),
        })
    }
}

#[derive(Debug, Serialize)]
struct SpeechRequest {
    text: String,
    model_id: String,
}

#[async_trait]
impl CapabilityProvider for ElevenLabsProvider {
    async fn invoke(
        &self,
        text: &str,
        _system: Option<&str>,
        _history: &[ChatTurn],
    ) -> Result<Content, Failure> {
        let url = format!(
            "{}/v1/text-to-speech/{}?output_format=mp3_44100_64",
            self.base_url, self.voice
        );
        let request = SpeechRequest {
            text: text.to_string(),
            model_id: self.model.clone(),
        };

        let response = http_client()
            .post(&url)
            .header("xi-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| map_http_error("elevenlabs", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(map_http_status("elevenlabs", status, &body));
        }

        let audio = response
            .bytes()
            .await
            .map_err(|e| map_http_error("elevenlabs", e))?;

        tracing::info!("Audio received ({} bytes)", audio.len());
        Ok(Content::Audio(audio))
    }
}
