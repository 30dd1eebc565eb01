//! # Stable Diffusion Provider
//!
//! AUTOMATIC1111 WebUI binding: `txt2img` for the image capability, and the
//! `progress` endpoint as the credential probe backing `/login`.

use anyhow::Result;
use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{http_client, map_http_error, map_http_status};
use crate::domain::config::ImageConfig;
use crate::domain::traits::{AuthVerifier, CapabilityProvider};
use crate::domain::types::{ChatTurn, Content, Failure};
use crate::strings::prompts;

pub struct StableDiffusionProvider {
    endpoint: String,
    steps: u32,
    sampler: String,
    negative_prompt: String,
    checkpoint: Option<String>,
}

impl StableDiffusionProvider {
    pub fn new(config: &ImageConfig) -> Result<Self> {
        Ok(Self {
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            steps: config.steps,
            sampler: config.sampler.clone(),
            negative_prompt: config
                .negative_prompt
                .clone()
                .unwrap_or_else(|| prompts::IMAGE_NEGATIVE_PROMPT.to_string()),
            checkpoint: config.checkpoint.clone(),
        })
    }
}

#[derive(Debug, Serialize)]
struct Txt2ImgRequest {
    prompt: String,
    negative_prompt: String,
    steps: u32,
    sampler_index: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    override_settings: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct Txt2ImgResponse {
    images: Vec<String>,
}

#[async_trait]
impl CapabilityProvider for StableDiffusionProvider {
    async fn invoke(
        &self,
        text: &str,
        _system: Option<&str>,
        _history: &[ChatTurn],
    ) -> Result<Content, Failure> {
        let request = Txt2ImgRequest {
            prompt: text.to_string(),
            negative_prompt: self.negative_prompt.clone(),
            steps: self.steps,
            sampler_index: self.sampler.clone(),
            override_settings: self
                .checkpoint
                .as_ref()
                .map(|name| json!({ "sd_model_checkpoint": name })),
        };

        let url = format!("{}/sdapi/v1/txt2img", self.endpoint);
        tracing::info!("Request for image to {url}");
        let response = http_client()
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| map_http_error("stable-diffusion", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(map_http_status("stable-diffusion", status, &body));
        }

        let parsed: Txt2ImgResponse = response.json().await.map_err(|e| {
            Failure::Provider(format!("stable-diffusion: undecodable response: {e}"))
        })?;
        let first = parsed
            .images
            .first()
            .ok_or_else(|| Failure::Provider("stable-diffusion: empty image list".to_string()))?;
        let image = BASE64
            .decode(first)
            .map_err(|e| Failure::Provider(format!("stable-diffusion: bad image data: {e}")))?;

        tracing::info!("Image received");
        Ok(Content::Image(Bytes::from(image)))
    }
}

#[async_trait]
impl AuthVerifier for StableDiffusionProvider {
    async fn verify(&self, login: &str, password: &str) -> Result<bool, Failure> {
        let url = format!("{}/sdapi/v1/progress", self.endpoint);
        let response = http_client()
            .get(&url)
            .basic_auth(login, Some(password))
            .send()
            .await
            .map_err(|e| map_http_error("stable-diffusion", e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(true);
        }
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Ok(false);
        }
        Err(map_http_status(
            "stable-diffusion",
            status,
            &response.text().await.unwrap_or_default(),
        ))
    }
}
