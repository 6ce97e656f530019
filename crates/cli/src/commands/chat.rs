//! Interactive console chat against the live engine.
//!
//! Runs the full stack locally: database, migrations, the configured
//! gateway, and the per-session idle monitor. The monitor owns the
//! timeout path (farewell then disconnect); the loop here only reads
//! input, submits turns, and renders outcomes.

use std::io::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use guichet_agent::{
    render_outcome, ActivityTracker, ConversationStatus, DialogueRuntime, GeminiGateway,
    IdleMonitor, LlmGateway, MonitorSettings, NoopLlmGateway, RetryPolicy, SessionRegistry,
    ToolDispatcher, TransportAdapter, TransportError, TurnProcessor,
};
use guichet_core::config::{AppConfig, GatewayProvider, LoadOptions};
use guichet_core::{messages, DirectiveMarkers};
use guichet_db::repositories::{SqlClaimRepository, SqlContractRepository};
use guichet_db::{connect_with_settings, migrations};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::{watch, Mutex};

use crate::commands::CommandResult;

const SESSION_ID: &str = "console";
const QUIT_WORDS: [&str; 2] = ["quitter", "exit"];

/// Stdin/stdout transport for one console session.
///
/// `disconnect` flips a closed flag that unblocks any pending read, so
/// the idle monitor can end the session while the loop waits on the
/// keyboard.
struct ConsoleTransport {
    lines: Mutex<Lines<BufReader<Stdin>>>,
    closed: watch::Sender<bool>,
}

impl ConsoleTransport {
    fn new() -> Self {
        let (closed, _) = watch::channel(false);
        Self { lines: Mutex::new(BufReader::new(tokio::io::stdin()).lines()), closed }
    }
}

#[async_trait]
impl TransportAdapter for ConsoleTransport {
    async fn send_text(&self, text: &str) -> Result<(), TransportError> {
        println!("Jules: {text}");
        Ok(())
    }

    async fn receive_text(&self) -> Result<Option<String>, TransportError> {
        if *self.closed.borrow() {
            return Ok(None);
        }
        print!("Vous: ");
        std::io::stdout().flush().map_err(|error| TransportError::Receive(error.to_string()))?;

        let mut closed = self.closed.subscribe();
        let mut lines = self.lines.lock().await;
        tokio::select! {
            line = lines.next_line() => {
                line.map_err(|error| TransportError::Receive(error.to_string()))
            }
            _ = closed.wait_for(|closed| *closed) => Ok(None),
        }
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        let _ = self.closed.send(true);
        Ok(())
    }
}

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "chat",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "chat",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    match runtime.block_on(chat_session(config)) {
        Ok(()) => CommandResult { exit_code: 0, output: messages::CLI_GOODBYE.to_string() },
        Err(failure) => failure,
    }
}

async fn chat_session(config: AppConfig) -> Result<(), CommandResult> {
    let pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(|error| {
        CommandResult::failure("chat", "db_connectivity", format!("failed to connect: {error}"), 4)
    })?;

    migrations::run_pending(&pool).await.map_err(|error| {
        CommandResult::failure("chat", "migration", format!("migration failed: {error}"), 5)
    })?;

    let gateway: Arc<dyn LlmGateway> = match config.gateway.provider {
        GatewayProvider::Gemini => {
            Arc::new(GeminiGateway::from_config(&config.gateway).map_err(|error| {
                CommandResult::failure(
                    "chat",
                    "gateway_init",
                    format!("gateway initialization failed: {error}"),
                    2,
                )
            })?)
        }
        GatewayProvider::Noop => Arc::new(NoopLlmGateway),
    };

    let dispatcher = Arc::new(ToolDispatcher::new(
        Arc::new(SqlContractRepository::new(pool.clone())),
        Arc::new(SqlClaimRepository::new(pool.clone())),
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
    let engine = DialogueRuntime::new(Arc::new(SessionRegistry::new()), processor);

    let transport: Arc<ConsoleTransport> = Arc::new(ConsoleTransport::new());
    let tracker = ActivityTracker::new();

    println!("{}", messages::CLI_GREETING);
    println!("(tapez `quitter` ou `exit` pour terminer)");

    // Session greeting first; the idle clock only starts counting once
    // the user has been welcomed.
    let opened = engine
        .open_session(SESSION_ID, None, transport.as_ref())
        .await
        .map_err(transport_failure)?;
    let mut conversation_id: Option<String> = Some(opened.as_str().to_string());
    tracker.touch();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let monitor = IdleMonitor::new(
        MonitorSettings::from_config(&config.dialogue),
        tracker.clone(),
        transport.clone() as Arc<dyn TransportAdapter>,
        shutdown_rx,
    );
    let monitor_handle = tokio::spawn(monitor.run());

    loop {
        // A `None` read means the monitor disconnected us (farewell
        // already rendered) or stdin hit EOF.
        let Some(line) = transport.receive_text().await.map_err(transport_failure)? else {
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if QUIT_WORDS.contains(&input) {
            break;
        }
        tracker.touch();

        let outcome = match engine.handle_message(SESSION_ID, input, conversation_id.as_deref()).await
        {
            Ok(outcome) => outcome,
            Err(error) => {
                println!("Jules: {}", error);
                continue;
            }
        };
        conversation_id = Some(outcome.conversation_id.as_str().to_string());

        let status = render_outcome(&engine, transport.as_ref(), &tracker, SESSION_ID, outcome)
            .await
            .map_err(transport_failure)?;
        if status == ConversationStatus::HandedOff {
            break;
        }
    }

    let _ = shutdown_tx.send(true);
    let _ = monitor_handle.await;
    pool.close().await;
    Ok(())
}

fn transport_failure(error: TransportError) -> CommandResult {
    CommandResult::failure("chat", "transport", format!("console transport failed: {error}"), 3)
}
