use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub gateway: GatewayConfig,
    pub dialogue: DialogueConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct GatewayConfig {
    pub provider: GatewayProvider,
    pub api_key: Option<SecretString>,
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

#[derive(Clone, Debug)]
pub struct DialogueConfig {
    pub max_history_pairs: usize,
    pub idle_timeout_secs: u64,
    pub idle_poll_secs: u64,
    pub farewell_grace_secs: u64,
    pub system_prompt_path: Option<PathBuf>,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub health_check_port: u16,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayProvider {
    Gemini,
    Noop,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub gateway_provider: Option<GatewayProvider>,
    pub gateway_model: Option<String>,
    pub gateway_api_key: Option<String>,
    pub system_prompt_path: Option<PathBuf>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://guichet.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            gateway: GatewayConfig {
                provider: GatewayProvider::Gemini,
                api_key: None,
                base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
                model: "gemini-1.5-flash-latest".to_string(),
                timeout_secs: 30,
                max_retries: 3,
                base_backoff_ms: 1_000,
                max_backoff_ms: 16_000,
            },
            dialogue: DialogueConfig {
                max_history_pairs: 10,
                idle_timeout_secs: 30,
                idle_poll_secs: 5,
                farewell_grace_secs: 2,
                system_prompt_path: None,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8000,
                health_check_port: 8080,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for GatewayProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "gemini" => Ok(Self::Gemini),
            "noop" => Ok(Self::Noop),
            other => Err(ConfigError::Validation(format!(
                "unsupported gateway provider `{other}` (expected gemini|noop)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("guichet.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(gateway) = patch.gateway {
            if let Some(provider) = gateway.provider {
                self.gateway.provider = provider;
            }
            if let Some(api_key_value) = gateway.api_key {
                self.gateway.api_key = Some(secret_value(api_key_value));
            }
            if let Some(base_url) = gateway.base_url {
                self.gateway.base_url = base_url;
            }
            if let Some(model) = gateway.model {
                self.gateway.model = model;
            }
            if let Some(timeout_secs) = gateway.timeout_secs {
                self.gateway.timeout_secs = timeout_secs;
            }
            if let Some(max_retries) = gateway.max_retries {
                self.gateway.max_retries = max_retries;
            }
            if let Some(base_backoff_ms) = gateway.base_backoff_ms {
                self.gateway.base_backoff_ms = base_backoff_ms;
            }
            if let Some(max_backoff_ms) = gateway.max_backoff_ms {
                self.gateway.max_backoff_ms = max_backoff_ms;
            }
        }

        if let Some(dialogue) = patch.dialogue {
            if let Some(max_history_pairs) = dialogue.max_history_pairs {
                self.dialogue.max_history_pairs = max_history_pairs;
            }
            if let Some(idle_timeout_secs) = dialogue.idle_timeout_secs {
                self.dialogue.idle_timeout_secs = idle_timeout_secs;
            }
            if let Some(idle_poll_secs) = dialogue.idle_poll_secs {
                self.dialogue.idle_poll_secs = idle_poll_secs;
            }
            if let Some(farewell_grace_secs) = dialogue.farewell_grace_secs {
                self.dialogue.farewell_grace_secs = farewell_grace_secs;
            }
            if let Some(system_prompt_path) = dialogue.system_prompt_path {
                self.dialogue.system_prompt_path = Some(PathBuf::from(system_prompt_path));
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(health_check_port) = server.health_check_port {
                self.server.health_check_port = health_check_port;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("GUICHET_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("GUICHET_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("GUICHET_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("GUICHET_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("GUICHET_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("GUICHET_GATEWAY_PROVIDER") {
            self.gateway.provider = value.parse()?;
        }
        if let Some(value) = read_env("GUICHET_GATEWAY_API_KEY") {
            self.gateway.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("GUICHET_GATEWAY_BASE_URL") {
            self.gateway.base_url = value;
        }
        if let Some(value) = read_env("GUICHET_GATEWAY_MODEL") {
            self.gateway.model = value;
        }
        if let Some(value) = read_env("GUICHET_GATEWAY_TIMEOUT_SECS") {
            self.gateway.timeout_secs = parse_u64("GUICHET_GATEWAY_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("GUICHET_GATEWAY_MAX_RETRIES") {
            self.gateway.max_retries = parse_u32("GUICHET_GATEWAY_MAX_RETRIES", &value)?;
        }
        if let Some(value) = read_env("GUICHET_GATEWAY_BASE_BACKOFF_MS") {
            self.gateway.base_backoff_ms = parse_u64("GUICHET_GATEWAY_BASE_BACKOFF_MS", &value)?;
        }
        if let Some(value) = read_env("GUICHET_GATEWAY_MAX_BACKOFF_MS") {
            self.gateway.max_backoff_ms = parse_u64("GUICHET_GATEWAY_MAX_BACKOFF_MS", &value)?;
        }

        if let Some(value) = read_env("GUICHET_DIALOGUE_MAX_HISTORY_PAIRS") {
            self.dialogue.max_history_pairs =
                parse_u32("GUICHET_DIALOGUE_MAX_HISTORY_PAIRS", &value)? as usize;
        }
        if let Some(value) = read_env("GUICHET_DIALOGUE_IDLE_TIMEOUT_SECS") {
            self.dialogue.idle_timeout_secs =
                parse_u64("GUICHET_DIALOGUE_IDLE_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("GUICHET_DIALOGUE_IDLE_POLL_SECS") {
            self.dialogue.idle_poll_secs = parse_u64("GUICHET_DIALOGUE_IDLE_POLL_SECS", &value)?;
        }
        if let Some(value) = read_env("GUICHET_DIALOGUE_FAREWELL_GRACE_SECS") {
            self.dialogue.farewell_grace_secs =
                parse_u64("GUICHET_DIALOGUE_FAREWELL_GRACE_SECS", &value)?;
        }
        if let Some(value) = read_env("GUICHET_DIALOGUE_SYSTEM_PROMPT_PATH") {
            self.dialogue.system_prompt_path = Some(PathBuf::from(value));
        }

        if let Some(value) = read_env("GUICHET_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("GUICHET_SERVER_PORT") {
            self.server.port = parse_u16("GUICHET_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("GUICHET_SERVER_HEALTH_CHECK_PORT") {
            self.server.health_check_port =
                parse_u16("GUICHET_SERVER_HEALTH_CHECK_PORT", &value)?;
        }

        let log_level = read_env("GUICHET_LOGGING_LEVEL").or_else(|| read_env("GUICHET_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("GUICHET_LOGGING_FORMAT").or_else(|| read_env("GUICHET_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(gateway_provider) = overrides.gateway_provider {
            self.gateway.provider = gateway_provider;
        }
        if let Some(gateway_model) = overrides.gateway_model {
            self.gateway.model = gateway_model;
        }
        if let Some(gateway_api_key) = overrides.gateway_api_key {
            self.gateway.api_key = Some(secret_value(gateway_api_key));
        }
        if let Some(system_prompt_path) = overrides.system_prompt_path {
            self.dialogue.system_prompt_path = Some(system_prompt_path);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_gateway(&self.gateway)?;
        validate_dialogue(&self.dialogue)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("guichet.toml"), PathBuf::from("config/guichet.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_gateway(gateway: &GatewayConfig) -> Result<(), ConfigError> {
    if gateway.timeout_secs == 0 || gateway.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "gateway.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if gateway.max_retries > 10 {
        return Err(ConfigError::Validation(
            "gateway.max_retries must be at most 10".to_string(),
        ));
    }

    if gateway.base_backoff_ms == 0 || gateway.base_backoff_ms > gateway.max_backoff_ms {
        return Err(ConfigError::Validation(
            "gateway.base_backoff_ms must be nonzero and at most gateway.max_backoff_ms"
                .to_string(),
        ));
    }

    match gateway.provider {
        GatewayProvider::Gemini => {
            let missing = gateway
                .api_key
                .as_ref()
                .map(|value| value.expose_secret().trim().is_empty())
                .unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "gateway.api_key is required for the gemini provider (set GUICHET_GATEWAY_API_KEY)"
                        .to_string(),
                ));
            }
            if gateway.base_url.trim().is_empty() {
                return Err(ConfigError::Validation(
                    "gateway.base_url must not be empty for the gemini provider".to_string(),
                ));
            }
        }
        GatewayProvider::Noop => {}
    }

    Ok(())
}

fn validate_dialogue(dialogue: &DialogueConfig) -> Result<(), ConfigError> {
    if dialogue.max_history_pairs == 0 {
        return Err(ConfigError::Validation(
            "dialogue.max_history_pairs must be greater than zero".to_string(),
        ));
    }

    if dialogue.idle_poll_secs == 0 {
        return Err(ConfigError::Validation(
            "dialogue.idle_poll_secs must be greater than zero".to_string(),
        ));
    }

    if dialogue.idle_timeout_secs <= dialogue.idle_poll_secs {
        return Err(ConfigError::Validation(
            "dialogue.idle_timeout_secs must be greater than dialogue.idle_poll_secs".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation(
            "server.port must be greater than zero".to_string(),
        ));
    }

    if server.health_check_port == 0 {
        return Err(ConfigError::Validation(
            "server.health_check_port must be greater than zero".to_string(),
        ));
    }

    if server.port == server.health_check_port {
        return Err(ConfigError::Validation(
            "server.port and server.health_check_port must differ".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    gateway: Option<GatewayPatch>,
    dialogue: Option<DialoguePatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct GatewayPatch {
    provider: Option<GatewayProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
    base_backoff_ms: Option<u64>,
    max_backoff_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct DialoguePatch {
    max_history_pairs: Option<usize>,
    idle_timeout_secs: Option<u64>,
    idle_poll_secs: Option<u64>,
    farewell_grace_secs: Option<u64>,
    system_prompt_path: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    health_check_port: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, GatewayProvider, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_GATEWAY_API_KEY", "gk-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("guichet.toml");
            fs::write(
                &path,
                r#"
[gateway]
api_key = "${TEST_GATEWAY_API_KEY}"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            let api_key = config
                .gateway
                .api_key
                .as_ref()
                .ok_or_else(|| "api key should be present".to_string())?;
            ensure(
                api_key.expose_secret() == "gk-from-env",
                "api key should be loaded from environment",
            )?;
            Ok(())
        })();

        clear_vars(&["TEST_GATEWAY_API_KEY"]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("GUICHET_GATEWAY_API_KEY", "gk-test");
        env::set_var("GUICHET_LOG_LEVEL", "warn");
        env::set_var("GUICHET_LOG_FORMAT", "pretty");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Pretty),
                "pretty logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_vars(&["GUICHET_GATEWAY_API_KEY", "GUICHET_LOG_LEVEL", "GUICHET_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("GUICHET_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("GUICHET_GATEWAY_API_KEY", "gk-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("guichet.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[gateway]
api_key = "gk-from-file"

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            let api_key = config
                .gateway
                .api_key
                .as_ref()
                .ok_or_else(|| "api key should be present".to_string())?;
            ensure(
                api_key.expose_secret() == "gk-from-env",
                "env api key should win over file and defaults",
            )?;
            Ok(())
        })();

        clear_vars(&["GUICHET_DATABASE_URL", "GUICHET_GATEWAY_API_KEY"]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        clear_vars(&["GUICHET_GATEWAY_API_KEY", "GUICHET_GATEWAY_PROVIDER"]);

        let error = match AppConfig::load(LoadOptions::default()) {
            Ok(_) => {
                return Err("expected validation failure but config load succeeded".to_string())
            }
            Err(error) => error,
        };
        let has_message = matches!(
            error,
            ConfigError::Validation(ref message) if message.contains("gateway.api_key")
        );
        ensure(has_message, "validation failure should mention gateway.api_key")
    }

    #[test]
    fn noop_provider_needs_no_credentials() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        clear_vars(&["GUICHET_GATEWAY_API_KEY"]);
        env::set_var("GUICHET_GATEWAY_PROVIDER", "noop");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            ensure(
                matches!(config.gateway.provider, GatewayProvider::Noop),
                "provider should be noop",
            )
        })();

        clear_vars(&["GUICHET_GATEWAY_PROVIDER"]);
        result
    }

    #[test]
    fn dialogue_poll_must_undercut_timeout() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("GUICHET_GATEWAY_API_KEY", "gk-test");
        env::set_var("GUICHET_DIALOGUE_IDLE_TIMEOUT_SECS", "5");
        env::set_var("GUICHET_DIALOGUE_IDLE_POLL_SECS", "5");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err(
                        "expected validation failure but config load succeeded".to_string()
                    )
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("idle_timeout_secs")
            );
            ensure(has_message, "validation failure should mention idle_timeout_secs")
        })();

        clear_vars(&[
            "GUICHET_GATEWAY_API_KEY",
            "GUICHET_DIALOGUE_IDLE_TIMEOUT_SECS",
            "GUICHET_DIALOGUE_IDLE_POLL_SECS",
        ]);
        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("GUICHET_GATEWAY_API_KEY", "gk-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(
                !debug.contains("gk-secret-value"),
                "debug output should not contain the api key",
            )?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )?;
            Ok(())
        })();

        clear_vars(&["GUICHET_GATEWAY_API_KEY"]);
        result
    }
}
