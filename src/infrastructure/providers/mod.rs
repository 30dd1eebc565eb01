//! # Capability Providers
//!
//! Concrete backend bindings. Each provider owns its HTTP calls and maps
//! transport faults into the shared failure taxonomy before they reach the
//! application layer.

pub mod anthropic;
pub mod elevenlabs;
pub mod stable_diffusion;

use reqwest::Client;
use std::sync::OnceLock;

use crate::domain::types::Failure;

/// HTTP client reused across requests.
pub(crate) fn http_client() -> &'static Client {
    static CLIENT: OnceLock<Client> = OnceLock::new();
    CLIENT.get_or_init(|| {
        Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .expect("Failed to create HTTP client")
    })
}

/// Convert a reqwest fault into the taxonomy.
pub(crate) fn map_http_error(provider: &str, e: reqwest::Error) -> Failure {
    if e.is_timeout() {
        tracing::warn!("HTTP timeout talking to {provider}: {e}");
        Failure::ProviderTimeout
    } else {
        tracing::error!("HTTP error talking to {provider}: {e}");
        Failure::Provider(format!("{provider}: {e}"))
    }
}

/// Convert a non-success HTTP status plus body into the taxonomy.
pub(crate) fn map_http_status(provider: &str, status: reqwest::StatusCode, body: &str) -> Failure {
    tracing::error!("{provider} replied HTTP {status}: {body}");
    Failure::Provider(format!("{provider}: HTTP {status}"))
}
