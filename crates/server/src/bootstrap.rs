//! Application wiring: configuration to a ready dialogue runtime.

use std::sync::Arc;

use guichet_agent::{
    DialogueRuntime, GatewayError, GeminiGateway, LlmGateway, NoopLlmGateway, RetryPolicy,
    SessionRegistry, ToolDispatcher, TurnProcessor,
};
use guichet_core::config::{AppConfig, ConfigError, GatewayProvider, LoadOptions};
use guichet_core::DirectiveMarkers;
use guichet_db::repositories::{SqlClaimRepository, SqlContractRepository};
use guichet_db::{connect_with_settings, migrations, DbPool};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub runtime: Arc<DialogueRuntime>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("gateway initialization failed: {0}")]
    Gateway(#[from] GatewayError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

/// Wire the engine from an already-validated configuration.
///
/// Fails fast on unreachable persistence or missing gateway credentials;
/// nothing here is recoverable per-request.
pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let gateway: Arc<dyn LlmGateway> = match config.gateway.provider {
        GatewayProvider::Gemini => Arc::new(GeminiGateway::from_config(&config.gateway)?),
        GatewayProvider::Noop => Arc::new(NoopLlmGateway),
    };

    let dispatcher = Arc::new(ToolDispatcher::new(
        Arc::new(SqlContractRepository::new(db_pool.clone())),
        Arc::new(SqlClaimRepository::new(db_pool.clone())),
    ));

    let system_prompt =
        guichet_agent::prompt::resolve_system_prompt(config.dialogue.system_prompt_path.as_deref());
    let retry = RetryPolicy {
        max_retries: config.gateway.max_retries,
        base_delay_ms: config.gateway.base_backoff_ms,
        max_delay_ms: config.gateway.max_backoff_ms,
    };
    let processor = TurnProcessor::new(
        gateway,
        dispatcher,
        system_prompt,
        DirectiveMarkers::default(),
        retry,
        config.dialogue.max_history_pairs,
    );
    let runtime = Arc::new(DialogueRuntime::new(Arc::new(SessionRegistry::new()), processor));

    info!(
        event_name = "system.bootstrap.runtime_ready",
        correlation_id = "bootstrap",
        provider = ?config.gateway.provider,
        "dialogue runtime assembled"
    );

    Ok(Application { config, db_pool, runtime })
}

#[cfg(test)]
mod tests {
    use guichet_core::config::{ConfigOverrides, GatewayProvider, LoadOptions};

    use super::{bootstrap, BootstrapError};

    fn options(provider: GatewayProvider) -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:".to_string()),
                gateway_provider: Some(provider),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_with_noop_provider_builds_a_ready_runtime() {
        let mut load = options(GatewayProvider::Noop);
        load.overrides.gateway_api_key = Some("unused".to_string());
        let app = bootstrap(load).await.expect("bootstrap succeeds");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'table' AND name IN ('adherent', 'contrat', 'sinistre')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("baseline tables present");
        assert_eq!(table_count, 3);

        let outcome =
            app.runtime.handle_message("probe", "Bonjour", None).await.expect("engine answers");
        assert!(!outcome.answer.is_empty());
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_when_gemini_credentials_are_missing() {
        let result = bootstrap(options(GatewayProvider::Gemini)).await;

        match result.err().expect("bootstrap must fail without credentials") {
            BootstrapError::Config(error) => {
                assert!(error.to_string().contains("gateway.api_key"));
            }
            other => panic!("expected a configuration failure, got {other:?}"),
        }
    }
}
