mod bootstrap;
mod chat;
mod health;

use std::time::Duration;

use anyhow::Result;
use guichet_core::config::{AppConfig, LoadOptions};

fn init_logging(config: &AppConfig) {
    use guichet_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Load config and initialize logging before any other operations
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;

    health::spawn(
        &app.config.server.bind_address,
        app.config.server.health_check_port,
        health::HealthState::new(app.db_pool.clone(), app.config.gateway.provider),
    )
    .await?;

    chat::spawn(&app.config.server.bind_address, app.config.server.port, app.runtime.clone())
        .await?;

    spawn_idle_sweep(&app);

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        "guichet-server started"
    );
    wait_for_shutdown().await?;
    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "guichet-server stopping"
    );

    Ok(())
}

/// Background sweep that drops conversations idle past the dialogue
/// timeout, so the registry never grows without bound.
fn spawn_idle_sweep(app: &bootstrap::Application) {
    let registry = app.runtime.registry().clone();
    let ttl = Duration::from_secs(app.config.dialogue.idle_timeout_secs);
    let interval = Duration::from_secs(app.config.dialogue.idle_poll_secs);

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            registry.evict_idle(ttl).await;
        }
    });
}

async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
