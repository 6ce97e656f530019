//! System prompt resolution: built-in persona with an optional file override.

use std::fs;
use std::path::Path;

use tracing::warn;

/// Largest accepted override file, in bytes.
const MAX_PROMPT_BYTES: u64 = 10 * 1024;

/// Built-in persona prompt. Teaches the model the two directive markers
/// the engine parses, so changing those markers means changing this text.
pub const DEFAULT_SYSTEM_PROMPT: &str = "\
Tu es un assistant virtuel pour ARTEX ASSURANCES, nommé Jules.
Réponds en français. Sois professionnel et amical.
Si une question est ambiguë, demande des précisions en commençant ta réponse par '[CLARIFY]'.
Si tu ne peux pas répondre ou si l'utilisateur veut parler à un humain, commence ta réponse par '[HANDOFF]'.";

/// Resolve the system prompt, preferring a valid override file.
///
/// The override is used only if the file exists, is at most 10 KiB,
/// decodes as UTF-8, and is non-empty once trimmed. Anything else falls
/// back to the built-in prompt with a warning, never an error: a broken
/// prompt file must not take the assistant down.
pub fn resolve_system_prompt(override_path: Option<&Path>) -> String {
    let Some(path) = override_path else {
        return DEFAULT_SYSTEM_PROMPT.to_string();
    };

    match load_override(path) {
        Ok(prompt) => prompt,
        Err(reason) => {
            warn!(
                event_name = "dialogue.prompt.fallback",
                path = %path.display(),
                reason = %reason,
                "system prompt override rejected, using the built-in default"
            );
            DEFAULT_SYSTEM_PROMPT.to_string()
        }
    }
}

fn load_override(path: &Path) -> Result<String, String> {
    let metadata = fs::metadata(path).map_err(|error| format!("not readable: {error}"))?;
    if metadata.len() > MAX_PROMPT_BYTES {
        return Err(format!("file is {} bytes, limit is {MAX_PROMPT_BYTES}", metadata.len()));
    }

    let bytes = fs::read(path).map_err(|error| format!("could not read: {error}"))?;
    let text = String::from_utf8(bytes).map_err(|_| "not valid UTF-8".to_string())?;

    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err("file is empty".to_string());
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::{resolve_system_prompt, DEFAULT_SYSTEM_PROMPT};

    #[test]
    fn no_override_uses_the_default() {
        assert_eq!(resolve_system_prompt(None), DEFAULT_SYSTEM_PROMPT);
    }

    #[test]
    fn default_prompt_teaches_both_markers() {
        assert!(DEFAULT_SYSTEM_PROMPT.contains("[CLARIFY]"));
        assert!(DEFAULT_SYSTEM_PROMPT.contains("[HANDOFF]"));
        assert!(DEFAULT_SYSTEM_PROMPT.contains("Jules"));
    }

    #[test]
    fn valid_override_is_used_and_trimmed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("prompt.txt");
        fs::write(&path, "  Tu es un assistant de test.\n\n").expect("write prompt");

        assert_eq!(resolve_system_prompt(Some(&path)), "Tu es un assistant de test.");
    }

    #[test]
    fn missing_file_falls_back() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("absent.txt");

        assert_eq!(resolve_system_prompt(Some(&path)), DEFAULT_SYSTEM_PROMPT);
    }

    #[test]
    fn oversized_file_falls_back() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("huge.txt");
        fs::write(&path, "x".repeat(11 * 1024)).expect("write prompt");

        assert_eq!(resolve_system_prompt(Some(&path)), DEFAULT_SYSTEM_PROMPT);
    }

    #[test]
    fn blank_file_falls_back() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("blank.txt");
        fs::write(&path, "   \n\t ").expect("write prompt");

        assert_eq!(resolve_system_prompt(Some(&path)), DEFAULT_SYSTEM_PROMPT);
    }

    #[test]
    fn non_utf8_file_falls_back() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("binary.txt");
        fs::write(&path, [0xffu8, 0xfe, 0x00, 0x41]).expect("write bytes");

        assert_eq!(resolve_system_prompt(Some(&path)), DEFAULT_SYSTEM_PROMPT);
    }
}
