//! # Conversation State Machine
//!
//! The core of the bot: owns each user's place in the conversation graph,
//! validates incoming events against it, drives capability invocations under
//! the global limiter, and reconciles state with calls that may fail or
//! outlive a cancellation. All outbound traffic flows through the
//! [`ChatPort`] handed into `handle`.
//!
//! Handling is split into three phases. The *accept* phase runs under the
//! user's session lock: it resolves the edge, applies pure UI transitions,
//! and auth-gates invocations. The *invoke* phase runs unlocked: it sends
//! the acknowledgement, waits for a permit, and calls the capability. The
//! *commit* phase re-takes the lock and only writes state and context back
//! if the session epoch it observed is still current, so a `/stop` issued
//! while a call is in flight is never overwritten — the late result is
//! still delivered, but the conversation stays reset.

use std::sync::Arc;
use std::time::Duration;

use crate::application::graph::{self, ConversationState, EdgeAction};
use crate::application::limiter::InvokeLimiter;
use crate::application::registry::CapabilityRegistry;
use crate::application::session::SessionManager;
use crate::domain::config::LimitsConfig;
use crate::domain::traits::{AuthVerifier, ChatPort};
use crate::domain::types::{Button, CapabilityId, ChatTurn, Content, Failure, InboundEvent};
use crate::strings::messages;

/// Outcome of the accept phase.
enum Accepted {
    /// Fully handled under the session lock.
    Done,
    /// Credentials parsed; verification happens unlocked.
    Login { login: String, password: String },
    /// An invocation was accepted; run it unlocked, then commit.
    Invoke(PendingInvoke),
}

/// Snapshot of everything an invocation needs once the lock is released.
struct PendingInvoke {
    capability: CapabilityId,
    multi_turn: bool,
    input: String,
    history: Vec<ChatTurn>,
    epoch: u64,
    next_on_single: ConversationState,
}

pub struct ConversationMachine {
    sessions: Arc<SessionManager>,
    registry: Arc<CapabilityRegistry>,
    limiter: InvokeLimiter,
    auth: Arc<dyn AuthVerifier>,
    acquire_timeout: Duration,
    history_max_turns: usize,
}

impl ConversationMachine {
    pub fn new(
        sessions: Arc<SessionManager>,
        registry: Arc<CapabilityRegistry>,
        limiter: InvokeLimiter,
        auth: Arc<dyn AuthVerifier>,
        limits: &LimitsConfig,
    ) -> Self {
        Self {
            sessions,
            registry,
            limiter,
            auth,
            acquire_timeout: Duration::from_secs(limits.acquire_timeout),
            history_max_turns: limits.history_max_turns,
        }
    }

    /// Handle one inbound event for one user.
    pub async fn handle(
        &self,
        chat: &dyn ChatPort,
        user_id: &str,
        event: InboundEvent,
    ) -> Result<(), Failure> {
        if user_id.is_empty() {
            return Err(Failure::UnrecognizedInput);
        }

        match self.accept(chat, user_id, &event).await? {
            Accepted::Done => Ok(()),
            Accepted::Login { login, password } => {
                self.login(chat, user_id, &login, &password).await
            }
            Accepted::Invoke(pending) => self.invoke_and_commit(chat, user_id, pending).await,
        }
    }

    /// Resolve the edge and apply everything that does not need a provider.
    /// Runs under the user's session lock.
    async fn accept(
        &self,
        chat: &dyn ChatPort,
        user_id: &str,
        event: &InboundEvent,
    ) -> Result<Accepted, Failure> {
        let _guard = self.sessions.lock_user(user_id).await;
        let mut session = self.sessions.load(user_id).await?;

        let Some(edge) = graph::find_edge(session.state, event) else {
            tracing::info!("No transition from {:?} for user {user_id}", session.state);
            let _ = chat.send_message(user_id, messages::UNKNOWN_REQUEST).await;
            return Ok(Accepted::Done);
        };

        match edge.action {
            EdgeAction::ShowHelp => {
                let _ = chat.send_message(user_id, messages::HELP_TEXT).await;
            }
            EdgeAction::ShowActionMenu => {
                let menu_id = chat
                    .send_menu(user_id, messages::CHOOSE_ACTION, &action_menu())
                    .await
                    .ok();
                session.transition(
                    edge.next.unwrap_or(ConversationState::SelectingAction),
                    None,
                );
                session.menu_message_id = menu_id;
                self.sessions.save(user_id, &mut session).await?;
            }
            EdgeAction::ShowTaskMenu => {
                let menu_id = chat
                    .send_menu(user_id, messages::CHOOSE_TASK, &task_menu())
                    .await
                    .ok();
                session.transition(edge.next.unwrap_or(ConversationState::SelectingTask), None);
                session.menu_message_id = menu_id;
                self.sessions.save(user_id, &mut session).await?;
            }
            EdgeAction::AskForInput(capability) => {
                tracing::info!(
                    "Waiting for input to proceed {} for user {user_id}",
                    capability.as_str()
                );
                // Button presses rewrite the menu in place; commands get a
                // fresh prompt message.
                let menu_id = match event {
                    InboundEvent::Button(_) => session.menu_message_id.take(),
                    _ => None,
                };
                session.transition(
                    edge.next.unwrap_or(ConversationState::AwaitingInput),
                    Some(capability),
                );
                self.sessions.save(user_id, &mut session).await?;
                replace_or_send(chat, user_id, menu_id, messages::TYPE_DESCRIPTION).await;
            }
            EdgeAction::EndConversation => {
                tracing::info!("User {user_id} ended the conversation");
                let menu_id = session.menu_message_id.take();
                session.reset();
                self.sessions.save(user_id, &mut session).await?;
                match event {
                    InboundEvent::Command { .. } => {
                        let _ = chat.send_message(user_id, messages::STOPPED).await;
                    }
                    _ => {
                        replace_or_send(chat, user_id, menu_id, messages::CONVERSATION_ENDED)
                            .await;
                    }
                }
            }
            EdgeAction::Login => {
                let InboundEvent::Command { args, .. } = event else {
                    return Ok(Accepted::Done);
                };
                match parse_credentials(args) {
                    Some((login, password)) => return Ok(Accepted::Login { login, password }),
                    None => {
                        let _ = chat.send_message(user_id, messages::LOGIN_USAGE).await;
                    }
                }
            }
            EdgeAction::RunPending => {
                let InboundEvent::Text(text) = event else {
                    return Ok(Accepted::Done);
                };
                let Some(capability) = session.pending_command else {
                    let _ = chat.send_message(user_id, messages::UNKNOWN_REQUEST).await;
                    return Ok(Accepted::Done);
                };
                let Some(spec) = self.registry.spec(capability) else {
                    tracing::error!("Pending capability {} has no binding", capability.as_str());
                    let _ = chat.send_message(user_id, messages::GENERIC_ERROR).await;
                    return Ok(Accepted::Done);
                };
                if spec.requires_auth && !session.authorized {
                    tracing::info!("User {user_id} not authorized for {}", capability.as_str());
                    let _ = chat.send_message(user_id, messages::LOGIN_REQUIRED).await;
                    return Ok(Accepted::Done);
                }
                let history = if spec.multi_turn {
                    session.history(capability).to_vec()
                } else {
                    Vec::new()
                };
                return Ok(Accepted::Invoke(PendingInvoke {
                    capability,
                    multi_turn: spec.multi_turn,
                    input: text.clone(),
                    history,
                    epoch: session.epoch,
                    next_on_single: edge.next.unwrap_or(ConversationState::Idle),
                }));
            }
        }
        Ok(Accepted::Done)
    }

    /// Run an accepted invocation and reconcile the session afterwards.
    async fn invoke_and_commit(
        &self,
        chat: &dyn ChatPort,
        user_id: &str,
        pending: PendingInvoke,
    ) -> Result<(), Failure> {
        // The acknowledgement goes out before any waiting, so it always
        // precedes the result.
        let ack_id = match chat.send_message(user_id, messages::PROCEED_REQUEST).await {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::warn!("Failed to acknowledge request of {user_id}: {e}");
                None
            }
        };

        let outcome =
            match tokio::time::timeout(self.acquire_timeout, self.limiter.acquire()).await {
                Ok(permit) => {
                    let result = self
                        .registry
                        .invoke(pending.capability, &pending.input, &pending.history)
                        .await;
                    drop(permit);
                    result
                }
                Err(_) => {
                    tracing::warn!(
                        "No free invocation slot within {}s",
                        self.acquire_timeout.as_secs()
                    );
                    Err(Failure::ProviderTimeout)
                }
            };

        if let Err(e) = self.commit(user_id, &pending, &outcome).await {
            // The result is still worth delivering; only the state write is lost.
            tracing::error!("Failed to commit session of {user_id}: {e}");
        }

        let delivery = match &outcome {
            Ok(Content::Text(text)) => chat.send_message(user_id, text).await.map(|_| ()),
            Ok(Content::Image(image)) => chat.send_photo(user_id, image).await.map(|_| ()),
            Ok(Content::Audio(audio)) => chat
                .send_audio(user_id, audio, messages::AUDIO_TITLE)
                .await
                .map(|_| ()),
            Err(failure) => {
                tracing::error!(
                    "Capability {} failed for {user_id}: {failure}",
                    pending.capability.as_str()
                );
                chat.send_message(user_id, failure.user_text()).await.map(|_| ())
            }
        };
        if let Err(e) = delivery {
            tracing::error!("Failed to deliver result to {user_id}: {e}");
        }

        // Retract the acknowledgement now that the result is out.
        if let Some(ack_id) = ack_id {
            if let Err(e) = chat.delete_message(user_id, &ack_id).await {
                tracing::warn!("Failed to retract acknowledgement for {user_id}: {e}");
            }
        }
        Ok(())
    }

    /// Write state and context back unless the conversation moved on while
    /// the call was in flight.
    async fn commit(
        &self,
        user_id: &str,
        pending: &PendingInvoke,
        outcome: &Result<Content, Failure>,
    ) -> Result<(), Failure> {
        let _guard = self.sessions.lock_user(user_id).await;
        let mut session = self.sessions.load(user_id).await?;

        if session.epoch != pending.epoch {
            tracing::info!(
                "Conversation of {user_id} moved on; result delivered without state change"
            );
            return Ok(());
        }

        if pending.multi_turn {
            // Stay in the input state; remember the exchange on success.
            if let Ok(Content::Text(reply)) = outcome {
                session.push_turns(
                    pending.capability,
                    [ChatTurn::user(&pending.input), ChatTurn::assistant(reply)],
                    self.history_max_turns,
                );
                self.sessions.save(user_id, &mut session).await?;
            }
        } else {
            // Forward progress even on failure, so the user is never stuck.
            session.transition(pending.next_on_single, None);
            self.sessions.save(user_id, &mut session).await?;
        }
        Ok(())
    }

    /// Verify credentials against the auth backend and persist the verdict.
    async fn login(
        &self,
        chat: &dyn ChatPort,
        user_id: &str,
        login: &str,
        password: &str,
    ) -> Result<(), Failure> {
        tracing::info!("Trying to login user {user_id}");
        match self.auth.verify(login, password).await {
            Ok(true) => {
                {
                    let _guard = self.sessions.lock_user(user_id).await;
                    let mut session = self.sessions.load(user_id).await?;
                    session.authorized = true;
                    self.sessions.save(user_id, &mut session).await?;
                }
                let _ = chat.send_message(user_id, messages::LOGIN_OK).await;
            }
            Ok(false) => {
                let _ = chat.send_message(user_id, messages::LOGIN_FAILED).await;
            }
            Err(failure) => {
                tracing::error!("Credential check failed for {user_id}: {failure}");
                let _ = chat.send_message(user_id, failure.user_text()).await;
            }
        }
        Ok(())
    }
}

/// Edit a previous menu message into `text`, falling back to a fresh
/// message when there is none or the transport refuses the edit.
async fn replace_or_send(
    chat: &dyn ChatPort,
    user_id: &str,
    message_id: Option<String>,
    text: &str,
) {
    if let Some(id) = message_id {
        if chat.edit_message(user_id, &id, text).await.is_ok() {
            return;
        }
    }
    let _ = chat.send_message(user_id, text).await;
}

/// `<login>:<password>`, both non-empty.
fn parse_credentials(args: &str) -> Option<(String, String)> {
    let (login, password) = args.split_once(':')?;
    let (login, password) = (login.trim(), password.trim());
    if login.is_empty() || password.is_empty() {
        return None;
    }
    Some((login.to_string(), password.to_string()))
}

fn action_menu() -> Vec<Vec<Button>> {
    vec![vec![
        Button::new("text2text", "text2text"),
        Button::new("text2image", "text2img"),
        Button::new("chat", "chat"),
        Button::new("text2speech", "speech"),
        Button::new("cancel", "end"),
    ]]
}

fn task_menu() -> Vec<Vec<Button>> {
    vec![vec![
        Button::new("summarize", "summarize"),
        Button::new("translate", "translate"),
        Button::new("cancel", "end"),
    ]]
}
