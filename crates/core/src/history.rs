use serde_json::{json, Value};

/// Default number of retained user/model pairs per conversation.
pub const DEFAULT_MAX_HISTORY_PAIRS: usize = 10;

/// A model-requested invocation of a backend tool.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolCall {
    pub name: String,
    pub arguments: Value,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        Self { name: name.into(), arguments }
    }
}

/// Outcome of one tool invocation, errors included as values.
///
/// Error payloads are plain `{"error": "..."}` objects so they can be fed
/// back to the model as a function response without translation.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolResult {
    pub name: String,
    pub payload: Value,
}

impl ToolResult {
    pub fn ok(name: impl Into<String>, payload: Value) -> Self {
        Self { name: name.into(), payload }
    }

    pub fn error(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self { name: name.into(), payload: json!({ "error": message.into() }) }
    }

    pub fn is_error(&self) -> bool {
        self.payload.get("error").is_some()
    }

    /// The error text, when this result is an error.
    pub fn error_message(&self) -> Option<&str> {
        self.payload.get("error").and_then(Value::as_str)
    }
}

/// One entry in a conversation. Immutable once appended.
#[derive(Clone, Debug, PartialEq)]
pub enum Turn {
    User(String),
    Model(String),
    ToolRequest(ToolCall),
    ToolResult(ToolResult),
}

impl Turn {
    pub fn is_user(&self) -> bool {
        matches!(self, Turn::User(_))
    }
}

/// Ordered, bounded turn sequence for one conversation.
///
/// Logical shape: each user turn is followed by an optional
/// tool_request/tool_result pair and exactly one model turn. Trimming cuts
/// at user-turn boundaries only, so a tool exchange is never split from
/// the user turn that caused it.
#[derive(Clone, Debug, Default)]
pub struct ConversationHistory {
    turns: Vec<Turn>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_user(&mut self, text: impl Into<String>) {
        self.turns.push(Turn::User(text.into()));
    }

    pub fn push_model(&mut self, text: impl Into<String>) {
        self.turns.push(Turn::Model(text.into()));
    }

    pub fn push_tool_request(&mut self, call: ToolCall) {
        self.turns.push(Turn::ToolRequest(call));
    }

    pub fn push_tool_result(&mut self, result: ToolResult) {
        self.turns.push(Turn::ToolResult(result));
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Number of user/model segments currently stored (counted by user turns).
    pub fn pair_count(&self) -> usize {
        self.turns.iter().filter(|turn| turn.is_user()).count()
    }

    /// Drop the oldest whole segments until at most `max_pairs` remain.
    pub fn trim_to_pairs(&mut self, max_pairs: usize) {
        if max_pairs == 0 {
            self.turns.clear();
            return;
        }

        let user_positions: Vec<usize> = self
            .turns
            .iter()
            .enumerate()
            .filter(|(_, turn)| turn.is_user())
            .map(|(index, _)| index)
            .collect();

        if user_positions.len() <= max_pairs {
            return;
        }

        let cut = user_positions[user_positions.len() - max_pairs];
        self.turns.drain(..cut);
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{ConversationHistory, ToolCall, ToolResult, Turn};

    fn history_with_pairs(count: usize) -> ConversationHistory {
        let mut history = ConversationHistory::new();
        for index in 0..count {
            history.push_user(format!("question {index}"));
            history.push_model(format!("réponse {index}"));
        }
        history
    }

    #[test]
    fn trim_keeps_most_recent_pairs() {
        let mut history = history_with_pairs(31);

        history.trim_to_pairs(10);

        assert_eq!(history.pair_count(), 10);
        assert_eq!(history.turns().first(), Some(&Turn::User("question 21".to_string())));
        assert_eq!(history.turns().last(), Some(&Turn::Model("réponse 30".to_string())));
    }

    #[test]
    fn trim_is_a_noop_under_the_bound() {
        let mut history = history_with_pairs(4);

        history.trim_to_pairs(10);

        assert_eq!(history.pair_count(), 4);
        assert_eq!(history.len(), 8);
    }

    #[test]
    fn trim_to_zero_pairs_clears_the_history() {
        let mut history = history_with_pairs(3);

        history.trim_to_pairs(0);

        assert!(history.is_empty());
        assert_eq!(history.pair_count(), 0);
    }

    #[test]
    fn trim_never_splits_a_tool_exchange() {
        let mut history = ConversationHistory::new();
        history.push_user("ancienne question");
        history.push_model("ancienne réponse");
        history.push_user("détails du contrat NC123?");
        history.push_tool_request(ToolCall::new(
            "get_contrat_details",
            json!({ "numero_contrat": "NC123" }),
        ));
        history.push_tool_result(ToolResult::ok("get_contrat_details", json!({ "statut": "Actif" })));
        history.push_model("Votre contrat est actif.");

        history.trim_to_pairs(1);

        // The retained segment starts at its user turn with the tool pair intact.
        assert_eq!(history.len(), 4);
        assert!(matches!(history.turns()[0], Turn::User(_)));
        assert!(matches!(history.turns()[1], Turn::ToolRequest(_)));
        assert!(matches!(history.turns()[2], Turn::ToolResult(_)));
        assert!(matches!(history.turns()[3], Turn::Model(_)));
    }

    #[test]
    fn tool_result_error_is_tagged() {
        let result = ToolResult::error("open_claim", "Paramètres pour sinistre manquants.");

        assert!(result.is_error());
        assert_eq!(result.error_message(), Some("Paramètres pour sinistre manquants."));

        let ok = ToolResult::ok("open_claim", json!({ "claim_id_ref": "CLAIM-0A1B2C3D" }));
        assert!(!ok.is_error());
    }
}
