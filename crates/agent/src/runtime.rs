//! Composition root handed to the HTTP surface and the CLI.

use std::sync::Arc;

use guichet_core::{errors::DomainError, messages, ConversationId, Directive, UsageStats};
use tracing::info;

use crate::registry::SessionRegistry;
use crate::session::TurnProcessor;
use crate::transport::{TransportAdapter, TransportError};

/// Result of one submitted user message, ready for the public
/// request/response shape.
#[derive(Clone, Debug, PartialEq)]
pub struct MessageOutcome {
    pub conversation_id: ConversationId,
    pub answer: String,
    pub directive: Directive,
    pub usage: UsageStats,
}

/// The assembled dialogue engine: registry plus turn processor.
///
/// Constructed once at bootstrap and shared by reference; there is no
/// ambient global state anywhere in the engine.
pub struct DialogueRuntime {
    registry: Arc<SessionRegistry>,
    processor: TurnProcessor,
}

impl DialogueRuntime {
    pub fn new(registry: Arc<SessionRegistry>, processor: TurnProcessor) -> Self {
        Self { registry, processor }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Open (or re-attach to) the live session for `session_id` and greet
    /// it through the transport. The greeting is spoken at most once per
    /// session; reconnecting to an existing conversation stays silent.
    pub async fn open_session(
        &self,
        session_id: &str,
        conversation_id: Option<&str>,
        transport: &dyn TransportAdapter,
    ) -> Result<ConversationId, TransportError> {
        let (conversation_id, slot) =
            self.registry.get_or_create(session_id, conversation_id).await;

        let mut session = slot.lock().await;
        let greet = session.take_welcome();
        drop(session);

        if greet {
            transport.speak(messages::WELCOME).await?;
            info!(
                event_name = "dialogue.session.welcomed",
                conversation_id = %conversation_id.as_str(),
                session_id,
                "welcome delivered"
            );
        }

        Ok(conversation_id)
    }

    /// Submit one user message on behalf of `session_id`.
    ///
    /// Resolves (or mints) the conversation, then holds the slot lock for
    /// the whole turn so submissions for one conversation id run strictly
    /// one at a time, in arrival order at the mutex.
    pub async fn handle_message(
        &self,
        session_id: &str,
        user_message: &str,
        conversation_id: Option<&str>,
    ) -> Result<MessageOutcome, DomainError> {
        if user_message.trim().is_empty() {
            return Err(DomainError::EmptyUserMessage);
        }

        let (conversation_id, slot) =
            self.registry.get_or_create(session_id, conversation_id).await;

        let mut session = slot.lock().await;
        let outcome = self.processor.process_turn(&mut session, user_message).await;
        drop(session);

        info!(
            event_name = "dialogue.message.handled",
            conversation_id = %conversation_id.as_str(),
            session_id,
            total_tokens = outcome.usage.total_tokens,
            "message handled"
        );

        Ok(MessageOutcome {
            conversation_id,
            answer: outcome.answer,
            directive: outcome.directive,
            usage: outcome.usage,
        })
    }
}
