// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `engram prune` command implementation.
//!
//! Runs one retention sweep against the local store and prints what was
//! removed. Command-line overrides make it usable even when periodic
//! retention is disabled in config.

use engram_config::EngramConfig;
use engram_core::EngramError;
use engram_server::retention;
use engram_storage::Database;
use engram_storage::queries::observations;

pub async fn run_prune(
    config: &EngramConfig,
    days: Option<u32>,
    max_observations: Option<u64>,
) -> Result<(), EngramError> {
    let mut retention_config = config.retention.clone();
    if let Some(days) = days {
        retention_config.days = days;
    }
    if let Some(max) = max_observations {
        retention_config.max_observations = max;
    }
    if retention_config.days == 0 && retention_config.max_observations == 0 {
        println!("retention disabled; pass --days or --max-observations to prune");
        return Ok(());
    }

    let db = Database::open(&config.storage.database_path, config.storage.wal_mode).await?;
    let report = retention::sweep_once(&db, &retention_config).await?;
    let remaining = observations::count_observations(&db).await?;
    db.close().await?;

    println!(
        "pruned {} observations ({} by age, {} by ceiling), {remaining} remaining",
        report.total(),
        report.pruned_by_age,
        report.pruned_by_ceiling,
    );
    Ok(())
}
