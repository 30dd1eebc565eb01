//! # Domain Types
//!
//! Common data structures and enums used across the application logic:
//! inbound/outbound events, capability identifiers, chat turns, and the
//! failure taxonomy every provider error is mapped into.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// One event received from the chat transport.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    /// A slash command, split into name and trailing arguments.
    Command { name: String, args: String },
    /// An inline-button press carrying its callback data.
    Button(String),
    /// A plain text message.
    Text(String),
}

impl InboundEvent {
    /// Parse a raw message body into a command or free text.
    pub fn from_text(body: &str) -> Self {
        let body = body.trim();
        if let Some(rest) = body.strip_prefix('/') {
            let (name, args) = match rest.split_once(char::is_whitespace) {
                Some((name, args)) => (name, args.trim()),
                None => (rest, ""),
            };
            InboundEvent::Command {
                name: name.to_lowercase(),
                args: args.to_string(),
            }
        } else {
            InboundEvent::Text(body.to_string())
        }
    }
}

/// An inline-keyboard button offered to the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Button {
    pub label: String,
    pub data: String,
}

impl Button {
    pub fn new(label: &str, data: &str) -> Self {
        Self {
            label: label.to_string(),
            data: data.to_string(),
        }
    }
}

/// Result payload produced by a capability invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum Content {
    Text(String),
    Image(Bytes),
    Audio(Bytes),
}

/// The backend functions reachable from the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityId {
    Chat,
    Summarize,
    Translate,
    Image,
    Speech,
}

impl CapabilityId {
    pub const ALL: [CapabilityId; 5] = [
        CapabilityId::Chat,
        CapabilityId::Summarize,
        CapabilityId::Translate,
        CapabilityId::Image,
        CapabilityId::Speech,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CapabilityId::Chat => "chat",
            CapabilityId::Summarize => "summarize",
            CapabilityId::Translate => "translate",
            CapabilityId::Image => "image",
            CapabilityId::Speech => "speech",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "chat" => Some(CapabilityId::Chat),
            "summarize" => Some(CapabilityId::Summarize),
            "translate" => Some(CapabilityId::Translate),
            "image" | "text2img" => Some(CapabilityId::Image),
            "speech" | "text2speech" | "audio" => Some(CapabilityId::Speech),
            _ => None,
        }
    }
}

/// Role of a stored conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One (role, content) pair of capability-scoped conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: &str) -> Self {
        Self {
            role: Role::User,
            content: content.to_string(),
        }
    }

    pub fn assistant(content: &str) -> Self {
        Self {
            role: Role::Assistant,
            content: content.to_string(),
        }
    }
}

/// Shared failure taxonomy. Every provider or store fault is converted into
/// one of these before it reaches the state machine.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Failure {
    #[error("capability requires authorization")]
    Unauthorized,
    #[error("provider call timed out")]
    ProviderTimeout,
    #[error("provider call failed: {0}")]
    Provider(String),
    #[error("no matching transition for input")]
    UnrecognizedInput,
    #[error("session store unavailable: {0}")]
    StoreUnavailable(String),
}

impl Failure {
    /// Text shown to the user when an invocation ends in this failure.
    pub fn user_text(&self) -> &'static str {
        match self {
            Failure::ProviderTimeout => crate::strings::messages::SERVICE_UNAVAILABLE,
            Failure::Unauthorized => crate::strings::messages::LOGIN_REQUIRED,
            Failure::UnrecognizedInput => crate::strings::messages::UNKNOWN_REQUEST,
            Failure::Provider(_) | Failure::StoreUnavailable(_) => {
                crate::strings::messages::GENERIC_ERROR
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_parsing() {
        assert_eq!(
            InboundEvent::from_text("/start"),
            InboundEvent::Command {
                name: "start".to_string(),
                args: String::new()
            }
        );
        assert_eq!(
            InboundEvent::from_text("/login alice:secret"),
            InboundEvent::Command {
                name: "login".to_string(),
                args: "alice:secret".to_string()
            }
        );
        assert_eq!(
            InboundEvent::from_text("  a red fox  "),
            InboundEvent::Text("a red fox".to_string())
        );
    }

    #[test]
    fn test_capability_id_round_trip() {
        for id in CapabilityId::ALL {
            assert_eq!(CapabilityId::from_str(id.as_str()), Some(id));
        }
        assert_eq!(CapabilityId::from_str("text2img"), Some(CapabilityId::Image));
        assert_eq!(CapabilityId::from_str("juggle"), None);
    }

    #[test]
    fn test_failure_user_text() {
        assert_eq!(
            Failure::ProviderTimeout.user_text(),
            crate::strings::messages::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            Failure::Provider("boom".to_string()).user_text(),
            crate::strings::messages::GENERIC_ERROR
        );
    }
}
