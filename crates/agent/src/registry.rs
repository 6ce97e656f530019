//! Shared keyed store of live conversations.
//!
//! Each conversation id maps to a slot wrapping the session in its own
//! async mutex. A caller locks the slot for the whole turn, so two
//! concurrent submissions for the same conversation id can never
//! interleave history mutation; the slot map itself is only held long
//! enough to resolve or insert a slot.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use guichet_core::ConversationId;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::session::DialogueSession;

/// Per-conversation slot; lock it to own the session for one turn.
pub type SessionSlot = Arc<Mutex<DialogueSession>>;

#[derive(Default)]
pub struct SessionRegistry {
    slots: Mutex<HashMap<String, SessionSlot>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve `conversation_id` to its slot, minting a fresh conversation
    /// when the id is absent or unknown.
    pub async fn get_or_create(
        &self,
        session_id: &str,
        conversation_id: Option<&str>,
    ) -> (ConversationId, SessionSlot) {
        let mut slots = self.slots.lock().await;

        if let Some(known) = conversation_id {
            if let Some(slot) = slots.get(known) {
                return (ConversationId(known.to_string()), Arc::clone(slot));
            }
            debug!(
                event_name = "dialogue.registry.unknown_conversation",
                conversation_id = known,
                "unknown conversation id supplied, minting a fresh one"
            );
        }

        let minted = ConversationId::mint(session_id);
        let slot: SessionSlot =
            Arc::new(Mutex::new(DialogueSession::new(minted.clone(), session_id)));
        slots.insert(minted.as_str().to_string(), Arc::clone(&slot));
        info!(
            event_name = "dialogue.registry.session_created",
            conversation_id = %minted.as_str(),
            session_id,
            live_sessions = slots.len(),
            "conversation created"
        );
        (minted, slot)
    }

    /// Drop one conversation. Returns whether it existed.
    pub async fn evict(&self, conversation_id: &str) -> bool {
        let removed = self.slots.lock().await.remove(conversation_id).is_some();
        if removed {
            info!(
                event_name = "dialogue.registry.session_evicted",
                conversation_id,
                "conversation evicted"
            );
        }
        removed
    }

    /// Sweep conversations idle for longer than `ttl`.
    ///
    /// A slot whose mutex is held has a turn in flight and is skipped;
    /// it will be re-examined on the next sweep.
    pub async fn evict_idle(&self, ttl: Duration) -> Vec<ConversationId> {
        let mut slots = self.slots.lock().await;
        let mut evicted = Vec::new();

        slots.retain(|_, slot| match slot.try_lock() {
            Ok(session) if session.idle_for() > ttl => {
                evicted.push(session.conversation_id.clone());
                false
            }
            _ => true,
        });

        if !evicted.is_empty() {
            info!(
                event_name = "dialogue.registry.idle_sweep",
                evicted = evicted.len(),
                live_sessions = slots.len(),
                "idle conversations evicted"
            );
        }
        evicted
    }

    pub async fn len(&self) -> usize {
        self.slots.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.slots.lock().await.is_empty()
    }
}
