use crate::messages;

/// Control instruction extracted from the final model text of a turn.
///
/// Parsed exactly once at the engine boundary; downstream code matches on
/// the variant and never re-inspects the raw text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Directive {
    /// Plain answer to render to the user.
    Answer(String),
    /// The model needs one more detail before it can answer.
    ClarifyRequest(String),
    /// The conversation should move to a human advisor.
    Handoff(String),
}

impl Directive {
    /// The text a transport should render for this directive.
    pub fn display_text(&self) -> &str {
        match self {
            Self::Answer(text) | Self::ClarifyRequest(text) | Self::Handoff(text) => text,
        }
    }
}

/// Literal prefixes the model uses to flag hand-off and clarification.
///
/// The two markers must be distinct and non-overlapping; hand-off always
/// wins when both could match.
#[derive(Clone, Debug)]
pub struct DirectiveMarkers {
    pub handoff: String,
    pub clarify: String,
}

impl Default for DirectiveMarkers {
    fn default() -> Self {
        Self { handoff: "[HANDOFF]".to_string(), clarify: "[CLARIFY]".to_string() }
    }
}

impl DirectiveMarkers {
    /// Classify `text` by literal prefix, hand-off before clarify.
    pub fn parse(&self, text: &str) -> Directive {
        let trimmed = text.trim();

        if let Some(rest) = trimmed.strip_prefix(self.handoff.as_str()) {
            let reason = rest.trim();
            if reason.is_empty() {
                return Directive::Handoff(messages::HANDOFF_DEFAULT.to_string());
            }
            return Directive::Handoff(reason.to_string());
        }

        if let Some(rest) = trimmed.strip_prefix(self.clarify.as_str()) {
            return Directive::ClarifyRequest(rest.trim().to_string());
        }

        Directive::Answer(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::{Directive, DirectiveMarkers};
    use crate::messages;

    #[test]
    fn plain_text_is_an_answer() {
        let markers = DirectiveMarkers::default();
        let directive = markers.parse("Votre contrat couvre les dégâts des eaux.");

        assert_eq!(
            directive,
            Directive::Answer("Votre contrat couvre les dégâts des eaux.".to_string())
        );
    }

    #[test]
    fn clarify_prefix_yields_clarify_request_with_question() {
        let markers = DirectiveMarkers::default();
        let directive = markers.parse("[CLARIFY] Quel est votre numéro de contrat?");

        assert_eq!(
            directive,
            Directive::ClarifyRequest("Quel est votre numéro de contrat?".to_string())
        );
    }

    #[test]
    fn handoff_prefix_yields_handoff_with_reason() {
        let markers = DirectiveMarkers::default();
        let directive = markers.parse("[HANDOFF] Demande de résiliation.");

        assert_eq!(directive, Directive::Handoff("Demande de résiliation.".to_string()));
    }

    #[test]
    fn bare_handoff_uses_default_message() {
        let markers = DirectiveMarkers::default();
        let directive = markers.parse("  [HANDOFF]  ");

        assert_eq!(directive, Directive::Handoff(messages::HANDOFF_DEFAULT.to_string()));
    }

    #[test]
    fn handoff_takes_precedence_over_clarify() {
        let markers = DirectiveMarkers::default();
        let directive = markers.parse("[HANDOFF][CLARIFY] les deux marqueurs");

        assert!(matches!(directive, Directive::Handoff(_)));
    }

    #[test]
    fn markers_only_match_as_prefix() {
        let markers = DirectiveMarkers::default();
        let directive = markers.parse("Je peux répondre, pas besoin de [CLARIFY].");

        assert!(matches!(directive, Directive::Answer(_)));
    }
}
