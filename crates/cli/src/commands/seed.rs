use aula_core::config::LoadOptions;
use aula_db::{connect_with_config, migrations, AcademicSeedDataset, TableSeedInfo};

use crate::commands::{build_runtime, load_config, CommandResult, StepFailure};

pub fn run(options: &LoadOptions) -> CommandResult {
    let config = match load_config("seed", options) {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match build_runtime("seed") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = connect_with_config(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;

        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;

        // Reseeding starts from empty tables.
        AcademicSeedDataset::clean(&pool)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;
        let seed_result = AcademicSeedDataset::load(&pool)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;

        let verification = AcademicSeedDataset::verify(&pool)
            .await
            .map_err(|error| ("seed_verification", error.to_string(), 6u8))?;

        let run_result: Result<Vec<TableSeedInfo>, StepFailure> = if verification.all_present {
            Ok(seed_result.tables)
        } else {
            let failed_checks = verification
                .checks
                .iter()
                .filter_map(|(check, passed)| (!passed).then_some(*check))
                .collect::<Vec<_>>();
            Err(("seed_verification", verification_message(&failed_checks), 6u8))
        };

        pool.close().await;
        run_result
    });

    match result {
        Ok(tables) => CommandResult::success("seed", summary(&tables)),
        Err(failure) => CommandResult::from_step("seed", failure),
    }
}

fn verification_message(failed_checks: &[&str]) -> String {
    if failed_checks.is_empty() {
        "Some seed data failed to load".to_string()
    } else {
        format!("Seed verification failed for checks: {}", failed_checks.join(", "))
    }
}

fn summary(tables: &[TableSeedInfo]) -> String {
    let lines = tables
        .iter()
        .map(|info| format!("  - {}: {} rows", info.table, info.rows))
        .collect::<Vec<_>>();
    format!("academic demo dataset loaded:\n{}", lines.join("\n"))
}
