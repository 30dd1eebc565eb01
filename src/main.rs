//! # Main Entry Point
//!
//! Initializes the application:
//! - Domain: Configuration and Types
//! - Infrastructure: Telegram, Session Store, Providers
//! - Application: Graph, Machine, Registry, Limiter, Dispatcher
//!

mod application;
mod domain;
mod infrastructure;
mod strings;

use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use std::sync::Arc;
use std::time::Duration;

use crate::application::dispatcher::Dispatcher;
use crate::application::limiter::InvokeLimiter;
use crate::application::machine::ConversationMachine;
use crate::application::registry::{CapabilityRegistry, CapabilitySpec};
use crate::application::session::SessionManager;
use crate::domain::config::AppConfig;
use crate::domain::traits::{AuthVerifier, CapabilityProvider, ChatPort, SessionStore};
use crate::domain::types::CapabilityId;
use crate::infrastructure::providers::anthropic::AnthropicProvider;
use crate::infrastructure::providers::elevenlabs::ElevenLabsProvider;
use crate::infrastructure::providers::stable_diffusion::StableDiffusionProvider;
use crate::infrastructure::store::memory::MemoryStore;
use crate::infrastructure::store::redis::RedisStore;
use crate::infrastructure::telegram::TelegramService;

#[derive(Parser)]
#[command(
    name = "relay",
    about = "Conversational front-end routing chat requests to ML backends"
)]
struct Cli {
    /// Path to the configuration file
    #[arg(long, default_value = "data/config.yaml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1. Load Configuration
    let config = AppConfig::load(&cli.config)?;

    // 2. Logging Setup
    if !std::path::Path::new("data").exists() {
        fs::create_dir("data").context("Failed to create data directory")?;
    }
    let file_appender = tracing_appender::rolling::never("data", "session.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,hyper=warn,reqwest=warn"));

    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stdout))
        .init();

    tracing::info!("Starting Relay...");

    // 3. Initialize Infrastructure
    let store: Arc<dyn SessionStore> = match &config.services.redis {
        Some(redis) => Arc::new(RedisStore::connect(&redis.url).await?),
        None => {
            tracing::warn!("No redis configured; sessions are kept in process memory");
            Arc::new(MemoryStore::new())
        }
    };

    let anthropic: Arc<dyn CapabilityProvider> =
        Arc::new(AnthropicProvider::new(&config.services.anthropic)?);
    let image = Arc::new(StableDiffusionProvider::new(&config.services.image)?);
    let auth: Arc<dyn AuthVerifier> = image.clone();

    let mut registry = CapabilityRegistry::new()
        .register(
            CapabilitySpec::for_capability(&config, CapabilityId::Chat),
            anthropic.clone(),
        )
        .register(
            CapabilitySpec::for_capability(&config, CapabilityId::Summarize),
            anthropic.clone(),
        )
        .register(
            CapabilitySpec::for_capability(&config, CapabilityId::Translate),
            anthropic,
        )
        .register(
            CapabilitySpec::for_capability(&config, CapabilityId::Image),
            image,
        );
    match &config.services.speech {
        Some(speech) => {
            registry = registry.register(
                CapabilitySpec::for_capability(&config, CapabilityId::Speech),
                Arc::new(ElevenLabsProvider::new(speech)?),
            );
        }
        None => tracing::warn!("No speech service configured; /audio will be rejected"),
    }

    // 4. Initialize Application Components
    let sessions = Arc::new(SessionManager::new(
        store,
        Duration::from_secs(config.limits.session_ttl),
    ));
    let limiter = InvokeLimiter::from_config(&config.limits);
    tracing::info!("Invocation permit pool: {}", limiter.capacity());
    let machine = Arc::new(ConversationMachine::new(
        sessions,
        Arc::new(registry),
        limiter,
        auth,
        &config.limits,
    ));
    let dispatcher = Arc::new(Dispatcher::new(machine));

    // 5. Telegram Event Loop
    let telegram = Arc::new(TelegramService::new(&config.services.telegram)?);
    let chat: Arc<dyn ChatPort> = telegram.clone();
    tracing::info!("Polling for updates");

    let mut offset = 0i64;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Stopped by user");
                break;
            }
            polled = telegram.poll(offset) => match polled {
                Ok((next_offset, events)) => {
                    offset = next_offset;
                    for decoded in events {
                        dispatcher.spawn(chat.clone(), decoded.user_id, decoded.event);
                    }
                }
                Err(e) => {
                    tracing::error!("Polling failed: {e}");
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
            }
        }
    }

    Ok(())
}
