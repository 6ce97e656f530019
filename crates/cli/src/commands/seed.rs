use crate::commands::CommandResult;
use guichet_core::config::{AppConfig, LoadOptions};
use guichet_db::{connect_with_settings, migrations, DemoPortfolio};

/// Load and verify the demo portfolio. Re-running refreshes the seeded
/// rows, so the command is idempotent.
pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "seed",
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
                "seed",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let result = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;

        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;

        let seeded = DemoPortfolio::load(&pool)
            .await
            .map_err(|error| ("seed", error.to_string(), 6u8))?;
        let verification = DemoPortfolio::verify(&pool)
            .await
            .map_err(|error| ("seed", error.to_string(), 6u8))?;
        pool.close().await;

        if !verification.all_present {
            let failed = verification
                .checks
                .iter()
                .filter(|(_, present)| !present)
                .map(|(label, _)| *label)
                .collect::<Vec<_>>()
                .join(", ");
            return Err(("seed", format!("verification failed for: {failed}"), 6u8));
        }

        Ok(seeded)
    });

    match result {
        Ok(seeded) => {
            let mut lines = vec!["demo portfolio seeded and verified:".to_string()];
            for contract in &seeded.contracts_seeded {
                lines.push(format!(
                    "  - {}: {} ({})",
                    contract.numero_contrat,
                    contract.description,
                    contract.nom_formule.unwrap_or("sans formule"),
                ));
            }
            CommandResult::success("seed", lines.join("\n"))
        }
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}
