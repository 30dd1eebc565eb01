//! # Domain Traits
//!
//! Abstract interfaces for the external collaborators (chat transport,
//! capability providers, session store). Allows for pluggable
//! implementations in the Infrastructure layer.

use async_trait::async_trait;
use std::time::Duration;

use crate::domain::types::{Button, ChatTurn, Content, Failure};

/// Abstract interface for the outbound side of a chat transport
/// (e.g. Telegram, Matrix, Console).
///
/// Sends that produce a user-visible message return its transport-assigned
/// id, so the caller can later edit or retract it (used for the
/// "Proceed request..." acknowledgement).
#[async_trait]
pub trait ChatPort: Send + Sync {
    /// Send a plain text message to a user.
    async fn send_message(&self, user_id: &str, content: &str) -> Result<String, String>;

    /// Send a text message with an inline keyboard attached.
    async fn send_menu(
        &self,
        user_id: &str,
        content: &str,
        buttons: &[Vec<Button>],
    ) -> Result<String, String>;

    /// Send a rendered image.
    async fn send_photo(&self, user_id: &str, image: &[u8]) -> Result<String, String>;

    /// Send an audio clip.
    async fn send_audio(&self, user_id: &str, audio: &[u8], title: &str)
        -> Result<String, String>;

    /// Replace the text of a previously sent message.
    async fn edit_message(
        &self,
        user_id: &str,
        message_id: &str,
        content: &str,
    ) -> Result<(), String>;

    /// Retract a previously sent message.
    async fn delete_message(&self, user_id: &str, message_id: &str) -> Result<(), String>;
}

/// Abstract interface for one backend capability (chat completion, image
/// generation, speech synthesis). Implementations own their provider call
/// and map provider-specific faults into the shared [`Failure`] taxonomy;
/// the registry bounds the wait with the capability's configured deadline.
#[async_trait]
pub trait CapabilityProvider: Send + Sync {
    /// Run the capability for one input. `history` is empty for
    /// capabilities without conversational memory.
    async fn invoke(
        &self,
        text: &str,
        system: Option<&str>,
        history: &[ChatTurn],
    ) -> Result<Content, Failure>;
}

/// Abstract interface for the external key-value session store.
/// Values are opaque serialized records; absent-on-read is distinct from an
/// explicit empty value.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, Failure>;

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), Failure>;

    async fn delete(&self, key: &str) -> Result<(), Failure>;
}

/// Credential check backing the `/login` command.
#[async_trait]
pub trait AuthVerifier: Send + Sync {
    /// Returns `Ok(true)` when the backend accepts the credentials.
    async fn verify(&self, login: &str, password: &str) -> Result<bool, Failure>;
}
