//! # Test Doubles
//!
//! Recording chat port, scripted providers, and stores used by the
//! application-layer tests.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

use crate::domain::traits::{AuthVerifier, CapabilityProvider, ChatPort, SessionStore};
use crate::domain::types::{Button, ChatTurn, Content, Failure};

/// Everything a machine under test pushed out, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum PortEvent {
    Message { user: String, id: String, text: String },
    Menu { user: String, id: String, text: String },
    Photo { user: String, id: String },
    Audio { user: String, id: String },
    Edit { user: String, target: String, text: String },
    Delete { user: String, target: String },
}

#[derive(Default)]
pub struct RecordingPort {
    events: Mutex<Vec<PortEvent>>,
    next_id: AtomicUsize,
}

impl RecordingPort {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self) -> String {
        format!("m{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub async fn events(&self) -> Vec<PortEvent> {
        self.events.lock().await.clone()
    }

    /// Plain message texts sent to one user, in order.
    pub async fn texts_for(&self, user: &str) -> Vec<String> {
        self.events
            .lock()
            .await
            .iter()
            .filter_map(|event| match event {
                PortEvent::Message { user: u, text, .. } if u == user => Some(text.clone()),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl ChatPort for RecordingPort {
    async fn send_message(&self, user_id: &str, content: &str) -> Result<String, String> {
        let id = self.next_id();
        self.events.lock().await.push(PortEvent::Message {
            user: user_id.to_string(),
            id: id.clone(),
            text: content.to_string(),
        });
        Ok(id)
    }

    async fn send_menu(
        &self,
        user_id: &str,
        content: &str,
        _buttons: &[Vec<Button>],
    ) -> Result<String, String> {
        let id = self.next_id();
        self.events.lock().await.push(PortEvent::Menu {
            user: user_id.to_string(),
            id: id.clone(),
            text: content.to_string(),
        });
        Ok(id)
    }

    async fn send_photo(&self, user_id: &str, _image: &[u8]) -> Result<String, String> {
        let id = self.next_id();
        self.events.lock().await.push(PortEvent::Photo {
            user: user_id.to_string(),
            id: id.clone(),
        });
        Ok(id)
    }

    async fn send_audio(
        &self,
        user_id: &str,
        _audio: &[u8],
        _title: &str,
    ) -> Result<String, String> {
        let id = self.next_id();
        self.events.lock().await.push(PortEvent::Audio {
            user: user_id.to_string(),
            id: id.clone(),
        });
        Ok(id)
    }

    async fn edit_message(
        &self,
        user_id: &str,
        message_id: &str,
        content: &str,
    ) -> Result<(), String> {
        self.events.lock().await.push(PortEvent::Edit {
            user: user_id.to_string(),
            target: message_id.to_string(),
            text: content.to_string(),
        });
        Ok(())
    }

    async fn delete_message(&self, user_id: &str, message_id: &str) -> Result<(), String> {
        self.events.lock().await.push(PortEvent::Delete {
            user: user_id.to_string(),
            target: message_id.to_string(),
        });
        Ok(())
    }
}

/// Arguments of one recorded provider call.
#[derive(Debug, Clone)]
pub struct ProviderCall {
    pub text: String,
    pub system: Option<String>,
    pub history: Vec<ChatTurn>,
}

/// A capability backend with scripted behavior.
pub struct ScriptedProvider {
    reply: Result<Content, Failure>,
    delay: Option<Duration>,
    calls: Mutex<Vec<ProviderCall>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedProvider {
    pub fn replying(text: &str) -> Self {
        Self::with_content(Content::Text(text.to_string()))
    }

    pub fn with_content(content: Content) -> Self {
        Self {
            reply: Ok(content),
            delay: None,
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    pub fn failing(failure: Failure) -> Self {
        Self {
            reply: Err(failure),
            delay: None,
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub async fn calls(&self) -> Vec<ProviderCall> {
        self.calls.lock().await.clone()
    }

    /// Highest number of overlapping invocations observed.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CapabilityProvider for ScriptedProvider {
    async fn invoke(
        &self,
        text: &str,
        system: Option<&str>,
        history: &[ChatTurn],
    ) -> Result<Content, Failure> {
        self.calls.lock().await.push(ProviderCall {
            text: text.to_string(),
            system: system.map(str::to_string),
            history: history.to_vec(),
        });
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.reply.clone()
    }
}

/// An auth backend that always returns the same verdict.
pub struct StaticVerifier(pub bool);

#[async_trait]
impl AuthVerifier for StaticVerifier {
    async fn verify(&self, _login: &str, _password: &str) -> Result<bool, Failure> {
        Ok(self.0)
    }
}

/// A store whose every operation fails.
pub struct FailingStore;

#[async_trait]
impl SessionStore for FailingStore {
    async fn get(&self, _key: &str) -> Result<Option<String>, Failure> {
        Err(Failure::StoreUnavailable("connection refused".to_string()))
    }

    async fn set(&self, _key: &str, _value: &str, _ttl: Option<Duration>) -> Result<(), Failure> {
        Err(Failure::StoreUnavailable("connection refused".to_string()))
    }

    async fn delete(&self, _key: &str) -> Result<(), Failure> {
        Err(Failure::StoreUnavailable("connection refused".to_string()))
    }
}
