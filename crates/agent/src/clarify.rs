//! Caller-side clarification protocol.
//!
//! When a turn ends in `ClarifyRequest`, the caller relays the question,
//! collects exactly one more user input, and resubmits it on the same
//! conversation. A second `ClarifyRequest` in a row becomes a hand-off;
//! no input at all leaves the conversation open with a fixed notice.

use guichet_core::{messages, Directive};
use tracing::info;

use crate::monitor::ActivityTracker;
use crate::runtime::{DialogueRuntime, MessageOutcome};
use crate::transport::{TransportAdapter, TransportError};

/// Where the conversation stands after a turn has been fully rendered.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConversationStatus {
    /// The user may submit a fresh turn.
    Open,
    /// A human advisor takes over; the caller should end the conversation.
    HandedOff,
}

/// Render `outcome` to the transport, running the clarification exchange
/// when the directive asks for it.
///
/// The retry is bounded to one: if the clarified turn asks for
/// clarification again, the fixed give-up notice is sent and the
/// conversation is handed off. A clarification reply counts as user
/// activity and refreshes `tracker`, so the idle monitor never farewells
/// a user who just answered the question.
pub async fn render_outcome(
    runtime: &DialogueRuntime,
    transport: &dyn TransportAdapter,
    tracker: &ActivityTracker,
    session_id: &str,
    outcome: MessageOutcome,
) -> Result<ConversationStatus, TransportError> {
    match outcome.directive {
        Directive::Answer(text) => {
            transport.send_text(&text).await?;
            Ok(ConversationStatus::Open)
        }
        Directive::Handoff(reason) => {
            transport.send_text(&reason).await?;
            Ok(ConversationStatus::HandedOff)
        }
        Directive::ClarifyRequest(question) => {
            transport.send_text(&question).await?;
            clarify_once(runtime, transport, tracker, session_id, outcome.conversation_id.as_str())
                .await
        }
    }
}

async fn clarify_once(
    runtime: &DialogueRuntime,
    transport: &dyn TransportAdapter,
    tracker: &ActivityTracker,
    session_id: &str,
    conversation_id: &str,
) -> Result<ConversationStatus, TransportError> {
    let reply = transport.receive_text().await?.filter(|text| !text.trim().is_empty());
    let Some(reply) = reply else {
        transport.send_text(messages::NO_CLARIFICATION).await?;
        return Ok(ConversationStatus::Open);
    };
    tracker.touch();

    let Ok(outcome) = runtime.handle_message(session_id, &reply, Some(conversation_id)).await
    else {
        // Blank replies were filtered above; this only fires on a
        // whitespace-only resubmission racing the filter, treat as none.
        transport.send_text(messages::NO_CLARIFICATION).await?;
        return Ok(ConversationStatus::Open);
    };

    match outcome.directive {
        Directive::Answer(text) => {
            transport.send_text(&text).await?;
            Ok(ConversationStatus::Open)
        }
        Directive::Handoff(reason) => {
            transport.send_text(&reason).await?;
            Ok(ConversationStatus::HandedOff)
        }
        Directive::ClarifyRequest(_) => {
            info!(
                event_name = "dialogue.clarify.gave_up",
                conversation_id,
                "second clarification request, handing off"
            );
            transport.send_text(messages::CLARIFY_GIVE_UP).await?;
            Ok(ConversationStatus::HandedOff)
        }
    }
}
