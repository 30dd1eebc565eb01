//! # Dispatcher Front Door
//!
//! Receives decoded inbound events from the transport and hands each one to
//! the state machine as an independent unit of work. Users never block each
//! other here; the only shared resource downstream is the invoke limiter.
//! When the session store is unreachable the dispatcher replies with a
//! generic failure and leaves the stored state untouched rather than
//! guessing.

use std::sync::Arc;

use crate::application::machine::ConversationMachine;
use crate::domain::traits::ChatPort;
use crate::domain::types::{Failure, InboundEvent};

pub struct Dispatcher {
    machine: Arc<ConversationMachine>,
}

impl Dispatcher {
    pub fn new(machine: Arc<ConversationMachine>) -> Self {
        Self { machine }
    }

    /// Handle one inbound event to completion.
    pub async fn dispatch(&self, chat: &dyn ChatPort, user_id: &str, event: InboundEvent) {
        if user_id.is_empty() {
            tracing::warn!("Dropping event without user id");
            return;
        }
        let kind = match &event {
            InboundEvent::Command { name, .. } => format!("command /{name}"),
            InboundEvent::Button(data) => format!("button {data}"),
            InboundEvent::Text(_) => "text".to_string(),
        };
        tracing::info!("Received {kind} from {user_id}");

        match self.machine.handle(chat, user_id, event).await {
            Ok(()) => {}
            Err(failure) => {
                if let Failure::StoreUnavailable(reason) = &failure {
                    tracing::error!("Session store unavailable handling {user_id}: {reason}");
                } else {
                    tracing::error!("Unhandled failure for {user_id}: {failure}");
                }
                // The user always gets a reply, even when nothing else worked.
                let _ = chat.send_message(user_id, failure.user_text()).await;
            }
        }
    }

    /// Handle one inbound event on its own task.
    pub fn spawn(self: &Arc<Self>, chat: Arc<dyn ChatPort>, user_id: String, event: InboundEvent) {
        let dispatcher = self.clone();
        tokio::spawn(async move {
            dispatcher.dispatch(chat.as_ref(), &user_id, event).await;
        });
    }
}
