//! # Configuration
//!
//! Manages the loading and parsing of the application's configuration file
//! (`config.yaml`). Defines the structs for connected services, rate/timeout
//! limits, and per-capability overrides.

use serde::Deserialize;
use std::collections::HashMap;

use crate::domain::types::CapabilityId;

/// Main application configuration structure.
/// Matches the layout of `data/config.yaml`.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub services: ServicesConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    /// Per-capability overrides keyed by capability id ("image", "chat", ...).
    #[serde(default)]
    pub capabilities: HashMap<String, CapabilityOverrides>,
}

impl AppConfig {
    pub fn parse(content: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(content)
    }

    pub fn load(path: &str) -> anyhow::Result<Self> {
        use anyhow::Context;
        let content =
            std::fs::read_to_string(path).with_context(|| format!("Failed to read {path}"))?;
        Self::parse(&content).with_context(|| format!("Failed to parse {path}"))
    }

    /// Whether a capability is gated behind `/login`.
    /// Binary backends (image, speech) default to requiring it.
    pub fn requires_auth(&self, id: CapabilityId) -> bool {
        self.capabilities
            .get(id.as_str())
            .and_then(|c| c.requires_auth)
            .unwrap_or(matches!(id, CapabilityId::Image | CapabilityId::Speech))
    }

    /// Provider deadline for a capability, in seconds.
    pub fn capability_timeout(&self, id: CapabilityId) -> u64 {
        self.capabilities
            .get(id.as_str())
            .and_then(|c| c.timeout)
            .unwrap_or(self.limits.provider_timeout)
    }
}

/// Configuration for the connected external services.
#[derive(Debug, Deserialize, Clone)]
pub struct ServicesConfig {
    pub telegram: TelegramConfig,
    pub anthropic: AnthropicConfig,
    pub image: ImageConfig,
    #[serde(default)]
    pub speech: Option<SpeechConfig>,
    /// Omitted -> sessions are kept in process memory.
    #[serde(default)]
    pub redis: Option<RedisConfig>,
}

/// Specific configuration for the Telegram transport.
#[derive(Debug, Deserialize, Clone)]
pub struct TelegramConfig {
    #[serde(default = "default_telegram_token_env")]
    pub token_env: String,
    /// Long-poll timeout in seconds.
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AnthropicConfig {
    #[serde(default = "default_anthropic_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_anthropic_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default)]
    pub endpoint: Option<String>,
}

/// Stable-Diffusion-WebUI style image backend.
#[derive(Debug, Deserialize, Clone)]
pub struct ImageConfig {
    pub endpoint: String,
    #[serde(default = "default_image_steps")]
    pub steps: u32,
    #[serde(default = "default_image_sampler")]
    pub sampler: String,
    #[serde(default)]
    pub negative_prompt: Option<String>,
    #[serde(default)]
    pub checkpoint: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SpeechConfig {
    #[serde(default = "default_speech_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_speech_voice")]
    pub voice: String,
    #[serde(default = "default_speech_model")]
    pub model: String,
    #[serde(default)]
    pub endpoint: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
}

/// Rate, timeout, and retention limits.
#[derive(Debug, Deserialize, Clone)]
pub struct LimitsConfig {
    /// Ceiling on simultaneously in-flight provider calls, system-wide.
    #[serde(default = "default_concurrent_requests")]
    pub concurrent_requests: usize,
    /// Seconds a request may wait for a permit before giving up.
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout: u64,
    /// Default per-call provider deadline in seconds.
    #[serde(default = "default_provider_timeout")]
    pub provider_timeout: u64,
    /// Context history cap per capability; oldest turns dropped first.
    #[serde(default = "default_history_max_turns")]
    pub history_max_turns: usize,
    /// Session record TTL in seconds, refreshed on every write.
    #[serde(default = "default_session_ttl")]
    pub session_ttl: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            concurrent_requests: default_concurrent_requests(),
            acquire_timeout: default_acquire_timeout(),
            provider_timeout: default_provider_timeout(),
            history_max_turns: default_history_max_turns(),
            session_ttl: default_session_ttl(),
        }
    }
}

/// Per-capability overrides.
#[derive(Debug, Default, Deserialize, Clone)]
pub struct CapabilityOverrides {
    #[serde(default)]
    pub requires_auth: Option<bool>,
    /// Provider deadline override in seconds.
    #[serde(default)]
    pub timeout: Option<u64>,
}

fn default_telegram_token_env() -> String {
    "TELEGRAM_BOT_TOKEN".to_string()
}
fn default_poll_timeout() -> u64 {
    50
}
fn default_anthropic_key_env() -> String {
    "ANTHROPIC_API_KEY".to_string()
}
fn default_anthropic_model() -> String {
    "claude-3-5-sonnet-20241022".to_string()
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_image_steps() -> u32 {
    20
}
fn default_image_sampler() -> String {
    "DPM++ 2M Karras".to_string()
}
fn default_speech_key_env() -> String {
    "ELEVENLABS_API_KEY".to_string()
}
fn default_speech_voice() -> String {
    "Charlotte".to_string()
}
fn default_speech_model() -> String {
    "eleven_turbo_v2_5".to_string()
}
fn default_concurrent_requests() -> usize {
    2
}
fn default_acquire_timeout() -> u64 {
    30
}
fn default_provider_timeout() -> u64 {
    120
}
fn default_history_max_turns() -> usize {
    20
}
fn default_session_ttl() -> u64 {
    86400
}

/// Resolve a secret from the environment variable named in the config.
pub fn secret_from_env(var: &str) -> Result<String, String> {
    std::env::var(var).map_err(|_| format!("Environment variable {var} not set"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
services:
  telegram: {}
  anthropic: {}
  image:
    endpoint: http://127.0.0.1:7860
"#;

    #[test]
    fn test_minimal_config_defaults() {
        let config = AppConfig::parse(MINIMAL).unwrap();
        assert_eq!(config.limits.concurrent_requests, 2);
        assert_eq!(config.limits.history_max_turns, 20);
        assert_eq!(config.services.telegram.poll_timeout, 50);
        assert_eq!(config.services.anthropic.model, "claude-3-5-sonnet-20241022");
        assert!(config.services.redis.is_none());
    }

    #[test]
    fn test_auth_defaults_per_capability() {
        let config = AppConfig::parse(MINIMAL).unwrap();
        assert!(config.requires_auth(CapabilityId::Image));
        assert!(config.requires_auth(CapabilityId::Speech));
        assert!(!config.requires_auth(CapabilityId::Chat));
        assert!(!config.requires_auth(CapabilityId::Summarize));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, MINIMAL).unwrap();
        let config = AppConfig::load(path.to_str().unwrap()).unwrap();
        assert_eq!(config.services.image.endpoint, "http://127.0.0.1:7860");

        assert!(AppConfig::load("does/not/exist.yaml").is_err());
    }

    #[test]
    fn test_overrides() {
        let yaml = format!(
            "{MINIMAL}\ncapabilities:\n  image:\n    requires_auth: false\n  chat:\n    timeout: 15\n"
        );
        let config = AppConfig::parse(&yaml).unwrap();
        assert!(!config.requires_auth(CapabilityId::Image));
        assert_eq!(config.capability_timeout(CapabilityId::Chat), 15);
        assert_eq!(
            config.capability_timeout(CapabilityId::Image),
            config.limits.provider_timeout
        );
    }
}
