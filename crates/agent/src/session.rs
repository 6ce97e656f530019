//! One conversation's state and the turn loop that drives it.
//!
//! A turn is: user text in, at most two gateway calls (one when the model
//! requests a tool, one to resume after the tool result), one directive
//! out. The session is locked by the caller for the whole turn, so every
//! history append here is already serialized per conversation id.

use std::sync::Arc;
use std::time::{Duration, Instant};

use guichet_core::{
    messages, ConversationHistory, ConversationId, Directive, DirectiveMarkers, UsageStats,
};
use tracing::{info, warn};

use crate::gateway::{
    generate_with_retry, CompletionContent, GatewayError, LlmGateway, RetryPolicy, ToolSchema,
};
use crate::tools::ToolDispatcher;

/// Per-conversation state owned by the registry.
pub struct DialogueSession {
    pub conversation_id: ConversationId,
    pub session_id: String,
    pub history: ConversationHistory,
    last_activity_at: Instant,
    welcome_sent: bool,
}

impl DialogueSession {
    pub fn new(conversation_id: ConversationId, session_id: impl Into<String>) -> Self {
        Self {
            conversation_id,
            session_id: session_id.into(),
            history: ConversationHistory::new(),
            last_activity_at: Instant::now(),
            welcome_sent: false,
        }
    }

    /// Record user activity; read by the idle sweep and the monitor.
    pub fn touch(&mut self) {
        self.last_activity_at = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_activity_at.elapsed()
    }

    /// True exactly once: the first caller gets to deliver the greeting.
    pub fn take_welcome(&mut self) -> bool {
        !std::mem::replace(&mut self.welcome_sent, true)
    }
}

/// What one `process_turn` produced for the caller.
#[derive(Clone, Debug, PartialEq)]
pub struct TurnOutcome {
    pub answer: String,
    pub directive: Directive,
    pub usage: UsageStats,
}

/// The turn loop: append the user turn, call the gateway, run at most
/// one tool round trip, substitute the sentinel on empty text, parse the
/// directive, trim.
pub struct TurnProcessor {
    gateway: Arc<dyn LlmGateway>,
    dispatcher: Arc<ToolDispatcher>,
    system_prompt: String,
    tool_schemas: Vec<ToolSchema>,
    markers: DirectiveMarkers,
    retry: RetryPolicy,
    max_history_pairs: usize,
}

impl TurnProcessor {
    pub fn new(
        gateway: Arc<dyn LlmGateway>,
        dispatcher: Arc<ToolDispatcher>,
        system_prompt: String,
        markers: DirectiveMarkers,
        retry: RetryPolicy,
        max_history_pairs: usize,
    ) -> Self {
        Self {
            gateway,
            dispatcher,
            system_prompt,
            tool_schemas: ToolDispatcher::catalogue(),
            markers,
            retry,
            max_history_pairs,
        }
    }

    /// Drive one user message to a final answer.
    ///
    /// Never fails: gateway exhaustion and protocol anomalies degrade to
    /// fixed French text, and the history is left consistent (a
    /// tool_request is always followed by its tool_result, and the turn
    /// always ends with a model turn).
    pub async fn process_turn(
        &self,
        session: &mut DialogueSession,
        user_text: &str,
    ) -> TurnOutcome {
        session.touch();
        session.history.push_user(user_text);
        let mut usage = UsageStats::default();

        let first = match self.generate(session).await {
            Ok(completion) => completion,
            Err(error) => return self.unavailable(session, usage, error),
        };
        usage.add(first.usage);

        let final_text = match first.content {
            CompletionContent::Text(text) => text,
            CompletionContent::ToolCall(call) => {
                info!(
                    event_name = "dialogue.turn.tool_call",
                    conversation_id = %session.conversation_id.as_str(),
                    tool = %call.name,
                    "model requested a tool"
                );
                session.history.push_tool_request(call.clone());
                let result = self.dispatcher.execute(&call).await;
                session.history.push_tool_result(result);

                let second = match self.generate(session).await {
                    Ok(completion) => completion,
                    Err(error) => return self.unavailable(session, usage, error),
                };
                usage.add(second.usage);

                match second.content {
                    CompletionContent::Text(text) => text,
                    CompletionContent::ToolCall(extra) => {
                        // One round trip per user turn; a second request
                        // would loop, so answer with the sentinel instead.
                        warn!(
                            event_name = "dialogue.turn.tool_chain_stopped",
                            conversation_id = %session.conversation_id.as_str(),
                            tool = %extra.name,
                            "second tool call in one turn, answering with the sentinel"
                        );
                        String::new()
                    }
                }
            }
        };

        self.finish(session, final_text, usage)
    }

    async fn generate(
        &self,
        session: &DialogueSession,
    ) -> Result<crate::gateway::Completion, GatewayError> {
        generate_with_retry(
            self.gateway.as_ref(),
            self.retry,
            session.history.turns(),
            &self.system_prompt,
            &self.tool_schemas,
        )
        .await
    }

    fn finish(
        &self,
        session: &mut DialogueSession,
        final_text: String,
        usage: UsageStats,
    ) -> TurnOutcome {
        let answer = if final_text.trim().is_empty() {
            messages::NO_ANSWER_SENTINEL.to_string()
        } else {
            final_text
        };

        session.history.push_model(answer.clone());
        let directive = self.markers.parse(&answer);
        session.history.trim_to_pairs(self.max_history_pairs);

        info!(
            event_name = "dialogue.turn.completed",
            conversation_id = %session.conversation_id.as_str(),
            history_pairs = session.history.pair_count(),
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            "turn completed"
        );

        TurnOutcome { answer: directive.display_text().to_string(), directive, usage }
    }

    fn unavailable(
        &self,
        session: &mut DialogueSession,
        usage: UsageStats,
        error: GatewayError,
    ) -> TurnOutcome {
        warn!(
            event_name = "dialogue.turn.gateway_unavailable",
            conversation_id = %session.conversation_id.as_str(),
            error = %error,
            "gateway retries exhausted, answering with the apology"
        );
        self.finish(session, messages::GATEWAY_UNAVAILABLE.to_string(), usage)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use guichet_core::{
        messages, ConversationId, Directive, DirectiveMarkers, ToolCall, Turn, UsageStats,
    };
    use guichet_db::repositories::{InMemoryClaimRepository, InMemoryContractRepository};
    use serde_json::json;

    use crate::gateway::{Completion, GatewayError, RetryPolicy, ScriptedGateway};
    use crate::tools::ToolDispatcher;

    use super::{DialogueSession, TurnProcessor};

    fn session() -> DialogueSession {
        DialogueSession::new(ConversationId("conv_test_0a1b2c3d".to_string()), "test")
    }

    fn processor(gateway: Arc<ScriptedGateway>) -> TurnProcessor {
        processor_with_pairs(gateway, 10)
    }

    fn processor_with_pairs(gateway: Arc<ScriptedGateway>, max_pairs: usize) -> TurnProcessor {
        let dispatcher = Arc::new(ToolDispatcher::new(
            Arc::new(InMemoryContractRepository::default()),
            Arc::new(InMemoryClaimRepository::default()),
        ));
        TurnProcessor::new(
            gateway,
            dispatcher,
            "prompt de test".to_string(),
            DirectiveMarkers::default(),
            RetryPolicy { max_retries: 1, base_delay_ms: 1, max_delay_ms: 2 },
            max_pairs,
        )
    }

    fn usage(prompt: u64, completion: u64) -> UsageStats {
        UsageStats::new(prompt, completion, prompt + completion)
    }

    fn lookup_call() -> ToolCall {
        ToolCall::new("get_contrat_details", json!({ "numero_contrat": "NC123" }))
    }

    #[tokio::test]
    async fn plain_answer_appends_user_and_model_turns() {
        let gateway = Arc::new(ScriptedGateway::with_script(vec![Ok(Completion::text(
            "Votre contrat est actif.",
            usage(100, 12),
        ))]));
        let processor = processor(Arc::clone(&gateway));
        let mut session = session();

        let outcome = processor.process_turn(&mut session, "Mon contrat est-il actif?").await;

        assert_eq!(outcome.answer, "Votre contrat est actif.");
        assert_eq!(outcome.directive, Directive::Answer("Votre contrat est actif.".to_string()));
        assert_eq!(outcome.usage, usage(100, 12));
        assert_eq!(session.history.len(), 2);
        assert!(matches!(session.history.turns()[0], Turn::User(_)));
        assert!(matches!(session.history.turns()[1], Turn::Model(_)));
    }

    #[tokio::test]
    async fn tool_round_trip_appends_the_exchange_and_accumulates_usage() {
        let gateway = Arc::new(ScriptedGateway::with_script(vec![
            Ok(Completion::tool_call(lookup_call(), usage(120, 15))),
            Ok(Completion::text("Le contrat NC123 est introuvable.", usage(160, 42))),
        ]));
        let processor = processor(Arc::clone(&gateway));
        let mut session = session();

        let outcome =
            processor.process_turn(&mut session, "Détails du contrat NC123?").await;

        // user, tool_request, tool_result, model
        assert_eq!(session.history.len(), 4);
        assert!(matches!(session.history.turns()[1], Turn::ToolRequest(_)));
        assert!(matches!(session.history.turns()[2], Turn::ToolResult(_)));
        assert_eq!(outcome.usage, usage(280, 57));
        // The resumed call saw the history including the tool exchange.
        assert_eq!(gateway.observed_history_lens().await, vec![1, 3]);
    }

    #[tokio::test]
    async fn a_second_tool_call_ends_the_turn_with_the_sentinel() {
        let gateway = Arc::new(ScriptedGateway::with_script(vec![
            Ok(Completion::tool_call(lookup_call(), UsageStats::default())),
            Ok(Completion::tool_call(lookup_call(), UsageStats::default())),
            // Would be a third round trip; must never be reached.
            Ok(Completion::tool_call(lookup_call(), UsageStats::default())),
        ]));
        let processor = processor(Arc::clone(&gateway));
        let mut session = session();

        let outcome = processor.process_turn(&mut session, "Boucle?").await;

        assert_eq!(outcome.answer, messages::NO_ANSWER_SENTINEL);
        assert_eq!(gateway.calls().await, 2);
        // History still ends with a model turn, tool pair intact.
        assert_eq!(session.history.len(), 4);
        assert!(matches!(session.history.turns()[3], Turn::Model(_)));
    }

    #[tokio::test]
    async fn empty_completion_is_replaced_by_the_sentinel() {
        let gateway = Arc::new(ScriptedGateway::answering(vec!["   "]));
        let processor = processor(gateway);
        let mut session = session();

        let outcome = processor.process_turn(&mut session, "Bonjour?").await;

        assert_eq!(outcome.answer, messages::NO_ANSWER_SENTINEL);
        assert_eq!(
            outcome.directive,
            Directive::Answer(messages::NO_ANSWER_SENTINEL.to_string())
        );
    }

    #[tokio::test]
    async fn gateway_exhaustion_degrades_to_the_apology() {
        let gateway = Arc::new(ScriptedGateway::with_script(vec![
            Err(GatewayError::Timeout),
            Err(GatewayError::Timeout),
        ]));
        let processor = processor(Arc::clone(&gateway));
        let mut session = session();

        let outcome = processor.process_turn(&mut session, "Bonjour?").await;

        assert_eq!(outcome.answer, messages::GATEWAY_UNAVAILABLE);
        assert_eq!(outcome.usage, UsageStats::default());
        // The user turn stays so the user can retry on the same history.
        assert_eq!(session.history.len(), 2);
        assert!(matches!(session.history.turns()[0], Turn::User(_)));
        assert!(matches!(session.history.turns()[1], Turn::Model(_)));
    }

    #[tokio::test]
    async fn gateway_failure_after_a_tool_exchange_keeps_the_pair_intact() {
        let gateway = Arc::new(ScriptedGateway::with_script(vec![
            Ok(Completion::tool_call(lookup_call(), usage(120, 15))),
            Err(GatewayError::Server { status: 503 }),
            Err(GatewayError::Server { status: 503 }),
        ]));
        let processor = processor(gateway);
        let mut session = session();

        let outcome = processor.process_turn(&mut session, "Détails?").await;

        assert_eq!(outcome.answer, messages::GATEWAY_UNAVAILABLE);
        assert_eq!(outcome.usage, usage(120, 15));
        assert_eq!(session.history.len(), 5);
        assert!(matches!(session.history.turns()[1], Turn::ToolRequest(_)));
        assert!(matches!(session.history.turns()[2], Turn::ToolResult(_)));
        assert!(matches!(session.history.turns()[4], Turn::Model(_)));
    }

    #[tokio::test]
    async fn handoff_marker_is_parsed_from_the_final_text() {
        let gateway =
            Arc::new(ScriptedGateway::answering(vec!["[HANDOFF] Demande de résiliation."]));
        let processor = processor(gateway);
        let mut session = session();

        let outcome = processor.process_turn(&mut session, "Je veux résilier.").await;

        assert_eq!(outcome.directive, Directive::Handoff("Demande de résiliation.".to_string()));
        assert_eq!(outcome.answer, "Demande de résiliation.");
    }

    #[tokio::test]
    async fn history_is_trimmed_to_the_configured_bound() {
        let answers: Vec<String> = (0..31).map(|index| format!("réponse {index}")).collect();
        let gateway = Arc::new(ScriptedGateway::answering(answers));
        let processor = processor_with_pairs(gateway, 10);
        let mut session = session();

        for index in 0..31 {
            processor.process_turn(&mut session, &format!("question {index}")).await;
        }

        assert_eq!(session.history.pair_count(), 10);
        assert_eq!(
            session.history.turns().first(),
            Some(&Turn::User("question 21".to_string()))
        );
    }

    #[tokio::test]
    async fn turn_touches_the_activity_marker() {
        let gateway = Arc::new(ScriptedGateway::answering(vec!["Bonjour."]));
        let processor = processor(gateway);
        let mut session = session();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(session.idle_for().as_millis() >= 20);

        processor.process_turn(&mut session, "Bonjour?").await;

        assert!(session.idle_for().as_millis() < 20);
    }

    #[test]
    fn welcome_is_taken_exactly_once() {
        let mut session = session();

        assert!(session.take_welcome());
        assert!(!session.take_welcome());
        assert!(!session.take_welcome());
    }
}
