// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Retention sweeps: age-based pruning and the observation ceiling.
//!
//! Both policies are off by default (zero disables). Favorites and
//! observations tagged `archived` are never removed by either policy.

use chrono::Utc;
use engram_config::RetentionConfig;
use engram_core::EngramError;
use engram_storage::Database;
use engram_storage::queries::observations;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub pruned_by_age: u64,
    pub pruned_by_ceiling: u64,
}

impl SweepReport {
    pub fn total(&self) -> u64 {
        self.pruned_by_age + self.pruned_by_ceiling
    }
}

/// One retention pass. Safe to call with both policies disabled.
pub async fn sweep_once(db: &Database, config: &RetentionConfig) -> Result<SweepReport, EngramError> {
    let mut report = SweepReport::default();

    if config.days > 0 {
        let cutoff = Utc::now().timestamp() - i64::from(config.days) * 86_400;
        report.pruned_by_age = observations::prune_older_than(db, cutoff).await?;
    }
    if config.max_observations > 0 {
        report.pruned_by_ceiling =
            observations::enforce_ceiling(db, config.max_observations).await?;
    }

    if report.total() > 0 {
        info!(
            by_age = report.pruned_by_age,
            by_ceiling = report.pruned_by_ceiling,
            "retention sweep pruned observations"
        );
    } else {
        debug!("retention sweep found nothing to prune");
    }
    Ok(report)
}

/// Periodic sweep loop. Returns immediately when retention is disabled.
pub async fn run_sweeper(db: Database, config: RetentionConfig, shutdown: CancellationToken) {
    if config.days == 0 && config.max_observations == 0 {
        info!("retention disabled, sweeper not started");
        return;
    }
    let interval = std::time::Duration::from_secs(config.sweep_interval_secs.max(1));
    info!(?interval, "retention sweeper started");
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("retention sweeper stopping");
                return;
            }
            _ = tokio::time::sleep(interval) => {}
        }
        if let Err(e) = sweep_once(&db, &config).await {
            warn!(error = %e, "retention sweep failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engram_core::{Observation, ObservationKind};
    use engram_storage::queries::sessions;

    async fn seed(db: &Database, memory_id: &str, age_days: i64) {
        let epoch = Utc::now().timestamp() - age_days * 86_400;
        let obs = Observation {
            id: 0,
            memory_id: memory_id.to_string(),
            session_id: "sess-1".to_string(),
            kind: ObservationKind::Learning,
            title: memory_id.to_string(),
            subtitle: None,
            narrative: format!("{memory_id} narrative"),
            facts: vec![],
            concepts: vec![],
            files_read: vec![],
            files_modified: vec![],
            project: "engram".to_string(),
            prompt_number: 1,
            created_at: String::new(),
            created_epoch: epoch,
            token_cost: 4,
            favorite: false,
        };
        observations::insert_observation(db, &obs).await.unwrap();
    }

    #[tokio::test]
    async fn disabled_retention_prunes_nothing() {
        let db = Database::open_in_memory().await.unwrap();
        sessions::open_session(&db, "sess-1", "engram").await.unwrap();
        seed(&db, "mem-ancient", 10_000).await;

        let config = RetentionConfig {
            days: 0,
            max_observations: 0,
            sweep_interval_secs: 3600,
        };
        let report = sweep_once(&db, &config).await.unwrap();
        assert_eq!(report.total(), 0);
        assert_eq!(observations::count_observations(&db).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn age_policy_prunes_only_old_rows() {
        let db = Database::open_in_memory().await.unwrap();
        sessions::open_session(&db, "sess-1", "engram").await.unwrap();
        seed(&db, "mem-old", 100).await;
        seed(&db, "mem-new", 1).await;

        let config = RetentionConfig {
            days: 30,
            max_observations: 0,
            sweep_interval_secs: 3600,
        };
        let report = sweep_once(&db, &config).await.unwrap();
        assert_eq!(report.pruned_by_age, 1);
        assert!(observations::get_by_memory_id(&db, "mem-new").await.unwrap().is_some());
        assert!(observations::get_by_memory_id(&db, "mem-old").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn ceiling_policy_applies_after_age() {
        let db = Database::open_in_memory().await.unwrap();
        sessions::open_session(&db, "sess-1", "engram").await.unwrap();
        for i in 0..4 {
            seed(&db, &format!("mem-{i}"), 10 - i).await;
        }

        let config = RetentionConfig {
            days: 0,
            max_observations: 2,
            sweep_interval_secs: 3600,
        };
        let report = sweep_once(&db, &config).await.unwrap();
        assert_eq!(report.pruned_by_ceiling, 2);
        assert_eq!(observations::count_observations(&db).await.unwrap(), 2);
        // Oldest went first.
        assert!(observations::get_by_memory_id(&db, "mem-0").await.unwrap().is_none());
        assert!(observations::get_by_memory_id(&db, "mem-3").await.unwrap().is_some());
    }
}
