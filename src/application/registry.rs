//! # Capability Registry
//!
//! Maps a capability id to its backend binding and normalizes every call to
//! `invoke(text, history) -> Content`. The registry applies the bounded wait
//! and hands back taxonomy failures; it performs no retries, so the state
//! machine calls `invoke` at most once per accepted input.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::domain::config::AppConfig;
use crate::domain::traits::CapabilityProvider;
use crate::domain::types::{CapabilityId, ChatTurn, Content, Failure};
use crate::strings::prompts;

/// Static and configured attributes of one capability.
#[derive(Debug, Clone)]
pub struct CapabilitySpec {
    pub id: CapabilityId,
    /// Multi-turn capabilities carry conversational memory and keep the
    /// user in the input state after each exchange.
    pub multi_turn: bool,
    pub requires_auth: bool,
    pub system: Option<&'static str>,
    pub deadline: Duration,
}

impl CapabilitySpec {
    /// Build the spec for a capability from configuration. The memory flag
    /// and system instruction are fixed per capability; auth requirement
    /// and deadline come from config.
    pub fn for_capability(config: &AppConfig, id: CapabilityId) -> Self {
        let system = match id {
            CapabilityId::Chat => Some(prompts::ASSISTANT_SYSTEM),
            CapabilityId::Summarize => Some(prompts::SUMMARIZE_SYSTEM),
            CapabilityId::Translate => Some(prompts::TRANSLATE_SYSTEM),
            CapabilityId::Image | CapabilityId::Speech => None,
        };
        Self {
            id,
            multi_turn: matches!(id, CapabilityId::Chat),
            requires_auth: config.requires_auth(id),
            system,
            deadline: Duration::from_secs(config.capability_timeout(id)),
        }
    }
}

struct Binding {
    spec: CapabilitySpec,
    provider: Arc<dyn CapabilityProvider>,
}

/// Registry of all reachable capabilities.
#[derive(Default)]
pub struct CapabilityRegistry {
    bindings: HashMap<CapabilityId, Binding>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        mut self,
        spec: CapabilitySpec,
        provider: Arc<dyn CapabilityProvider>,
    ) -> Self {
        self.bindings.insert(spec.id, Binding { spec, provider });
        self
    }

    pub fn spec(&self, id: CapabilityId) -> Option<&CapabilitySpec> {
        self.bindings.get(&id).map(|b| &b.spec)
    }

    /// Run one capability invocation under its deadline.
    pub async fn invoke(
        &self,
        id: CapabilityId,
        text: &str,
        history: &[ChatTurn],
    ) -> Result<Content, Failure> {
        let binding = self
            .bindings
            .get(&id)
            .ok_or_else(|| Failure::Provider(format!("capability {} not registered", id.as_str())))?;

        tracing::info!("Invoking capability {}", id.as_str());
        match tokio::time::timeout(
            binding.spec.deadline,
            binding.provider.invoke(text, binding.spec.system, history),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    "Capability {} exceeded its {}s deadline",
                    id.as_str(),
                    binding.spec.deadline.as_secs()
                );
                Err(Failure::ProviderTimeout)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::testing::ScriptedProvider;
    use crate::domain::config::AppConfig;

    fn config() -> AppConfig {
        AppConfig::parse(
            "services:\n  telegram: {}\n  anthropic: {}\n  image:\n    endpoint: http://sd\n",
        )
        .unwrap()
    }

    #[test]
    fn test_specs_from_config() {
        let config = config();
        let chat = CapabilitySpec::for_capability(&config, CapabilityId::Chat);
        assert!(chat.multi_turn);
        assert!(!chat.requires_auth);
        assert_eq!(chat.system, Some(prompts::ASSISTANT_SYSTEM));

        let image = CapabilitySpec::for_capability(&config, CapabilityId::Image);
        assert!(!image.multi_turn);
        assert!(image.requires_auth);
        assert!(image.system.is_none());
    }

    #[tokio::test]
    async fn test_invoke_passes_system_and_history() {
        let provider = Arc::new(ScriptedProvider::replying("done"));
        let registry = CapabilityRegistry::new().register(
            CapabilitySpec::for_capability(&config(), CapabilityId::Summarize),
            provider.clone(),
        );

        let content = registry
            .invoke(CapabilityId::Summarize, "long passage", &[])
            .await
            .unwrap();
        assert_eq!(content, Content::Text("done".to_string()));

        let calls = provider.calls().await;
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].text, "long passage");
        assert_eq!(calls[0].system.as_deref(), Some(prompts::SUMMARIZE_SYSTEM));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_maps_to_timeout_failure() {
        let provider = Arc::new(ScriptedProvider::replying("late").with_delay(
            Duration::from_secs(600),
        ));
        let mut spec = CapabilitySpec::for_capability(&config(), CapabilityId::Translate);
        spec.deadline = Duration::from_secs(5);
        let registry = CapabilityRegistry::new().register(spec, provider);

        let result = registry
            .invoke(CapabilityId::Translate, "text", &[])
            .await;
        assert_eq!(result, Err(Failure::ProviderTimeout));
    }

    #[tokio::test]
    async fn test_unregistered_capability_is_a_provider_failure() {
        let registry = CapabilityRegistry::new();
        let result = registry.invoke(CapabilityId::Speech, "hi", &[]).await;
        assert!(matches!(result, Err(Failure::Provider(_))));
    }
}
