//! Fixed French strings spoken by the assistant.
//!
//! Every user-facing escape hatch (empty completion, exhausted gateway,
//! clarification give-up, idle disconnect) resolves to one of these
//! constants so the user never sees raw internal errors.

/// Substituted when the model returns an empty completion.
pub const NO_ANSWER_SENTINEL: &str = "[Pas de réponse disponible.]";

/// Played once when a live session is established.
pub const WELCOME: &str =
    "Bonjour, vous êtes connecté à l'assistant ARTEX. Comment puis-je vous aider?";

/// Sent right before an idle session is disconnected.
pub const IDLE_FAREWELL: &str =
    "Déconnexion en raison d'une période d'inactivité. Au revoir.";

/// Hand-off text when the model gives no reason of its own.
pub const HANDOFF_DEFAULT: &str = "Je vous mets en relation avec un conseiller.";

/// Announced when a second clarification request forces a hand-off.
pub const CLARIFY_GIVE_UP: &str = "Encore besoin de détails, transfert.";

/// Emitted when the user provides no clarification at all.
pub const NO_CLARIFICATION: &str = "Pas de précision.";

/// Terminal answer once gateway retries are exhausted.
pub const GATEWAY_UNAVAILABLE: &str =
    "Je suis désolé, l'assistant est momentanément indisponible. Merci de réessayer dans quelques instants.";

/// Console greeting for the interactive chat command.
pub const CLI_GREETING: &str =
    "Bonjour! Je suis l'assistant IA d'ARTEX ASSURANCES. Comment puis-je vous aider?";

/// Console goodbye when the user ends the chat.
pub const CLI_GOODBYE: &str = "Au revoir!";
