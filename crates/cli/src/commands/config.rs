use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use guichet_core::config::{AppConfig, LoadOptions};
use toml::Value;

use crate::commands::CommandResult;

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "config",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let file = config_file_doc.as_ref();
    let path = config_file_path.as_deref();

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];

    let mut field = |key: &'static str, value: String, env_var: Option<&'static str>| {
        lines.push(render_line(key, &value, field_source(key, env_var, file, path)));
    };

    field("database.url", config.database.url.clone(), Some("GUICHET_DATABASE_URL"));
    field(
        "database.max_connections",
        config.database.max_connections.to_string(),
        Some("GUICHET_DATABASE_MAX_CONNECTIONS"),
    );
    field(
        "database.timeout_secs",
        config.database.timeout_secs.to_string(),
        Some("GUICHET_DATABASE_TIMEOUT_SECS"),
    );

    field(
        "gateway.provider",
        format!("{:?}", config.gateway.provider),
        Some("GUICHET_GATEWAY_PROVIDER"),
    );
    let api_key = if config.gateway.api_key.is_some() { "<redacted>" } else { "<unset>" };
    field("gateway.api_key", api_key.to_string(), Some("GUICHET_GATEWAY_API_KEY"));
    field("gateway.base_url", config.gateway.base_url.clone(), Some("GUICHET_GATEWAY_BASE_URL"));
    field("gateway.model", config.gateway.model.clone(), Some("GUICHET_GATEWAY_MODEL"));
    field(
        "gateway.max_retries",
        config.gateway.max_retries.to_string(),
        Some("GUICHET_GATEWAY_MAX_RETRIES"),
    );

    field(
        "dialogue.max_history_pairs",
        config.dialogue.max_history_pairs.to_string(),
        Some("GUICHET_DIALOGUE_MAX_HISTORY_PAIRS"),
    );
    field(
        "dialogue.idle_timeout_secs",
        config.dialogue.idle_timeout_secs.to_string(),
        Some("GUICHET_DIALOGUE_IDLE_TIMEOUT_SECS"),
    );
    field(
        "dialogue.idle_poll_secs",
        config.dialogue.idle_poll_secs.to_string(),
        Some("GUICHET_DIALOGUE_IDLE_POLL_SECS"),
    );
    field(
        "dialogue.system_prompt_path",
        config
            .dialogue
            .system_prompt_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<unset>".to_string()),
        Some("GUICHET_DIALOGUE_SYSTEM_PROMPT_PATH"),
    );

    field(
        "server.bind_address",
        config.server.bind_address.clone(),
        Some("GUICHET_SERVER_BIND_ADDRESS"),
    );
    field("server.port", config.server.port.to_string(), Some("GUICHET_SERVER_PORT"));
    field(
        "server.health_check_port",
        config.server.health_check_port.to_string(),
        Some("GUICHET_SERVER_HEALTH_CHECK_PORT"),
    );

    field("logging.level", config.logging.level.clone(), Some("GUICHET_LOGGING_LEVEL"));
    field("logging.format", format!("{:?}", config.logging.format), Some("GUICHET_LOGGING_FORMAT"));

    CommandResult { exit_code: 0, output: lines.join("\n") }
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn field_source(
    key: &str,
    env_var: Option<&str>,
    file_doc: Option<&Value>,
    file_path: Option<&Path>,
) -> String {
    if let Some(var) = env_var {
        if env::var(var).map(|value| !value.trim().is_empty()).unwrap_or(false) {
            return format!("env {var}");
        }
    }

    if let (Some(doc), Some(path)) = (file_doc, file_path) {
        if file_defines_key(doc, key) {
            return format!("file {}", path.display());
        }
    }

    "default".to_string()
}

fn file_defines_key(doc: &Value, dotted_key: &str) -> bool {
    let mut current = doc;
    for part in dotted_key.split('.') {
        match current.get(part) {
            Some(next) => current = next,
            None => return false,
        }
    }
    true
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("guichet.toml"), PathBuf::from("config/guichet.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
    raw.parse::<Value>().ok()
}

#[cfg(test)]
mod tests {
    use toml::Value;

    use super::file_defines_key;

    #[test]
    fn dotted_keys_resolve_into_toml_tables() {
        let doc: Value = "[gateway]\nmodel = \"gemini-1.5-flash-latest\"\n".parse().expect("toml");

        assert!(file_defines_key(&doc, "gateway.model"));
        assert!(!file_defines_key(&doc, "gateway.api_key"));
        assert!(!file_defines_key(&doc, "database.url"));
    }
}
