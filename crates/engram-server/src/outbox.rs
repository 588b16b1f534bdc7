// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Background worker draining the durable outbox.
//!
//! Each pass lists pending entries oldest-first and retries them with a
//! linearly increasing delay between entries. Validation-class failures
//! fail fast via `mark_failed`; the attempt ceiling turns an entry
//! terminal so the worker never spins on a poison message.

use std::sync::Arc;
use std::time::Duration;

use engram_core::{EngramError, PendingStatus, SummaryProvider};
use engram_storage::Database;
use engram_storage::queries::{observations, outbox, summaries};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Deserialize)]
struct SummaryRequestPayload {
    session_id: String,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub sent: usize,
    pub failed: usize,
    pub still_pending: usize,
}

pub struct OutboxWorker {
    db: Database,
    provider: Option<Arc<dyn SummaryProvider>>,
    poll_interval: Duration,
    backoff_base: Duration,
}

impl OutboxWorker {
    pub fn new(
        db: Database,
        provider: Option<Arc<dyn SummaryProvider>>,
        poll_interval: Duration,
        backoff_base: Duration,
    ) -> Self {
        Self {
            db,
            provider,
            poll_interval,
            backoff_base,
        }
    }

    /// Poll until cancelled.
    pub async fn run(self, shutdown: CancellationToken) {
        info!(interval = ?self.poll_interval, "outbox worker started");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("outbox worker stopping");
                    return;
                }
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
            match self.drain_once().await {
                Ok(report) if report.sent + report.failed > 0 => {
                    info!(sent = report.sent, failed = report.failed, "outbox pass finished");
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "outbox pass failed"),
            }
        }
    }

    /// One full pass over the pending queue.
    pub async fn drain_once(&self) -> Result<DrainReport, EngramError> {
        let pending = outbox::list_pending(&self.db).await?;
        let mut report = DrainReport::default();

        for (i, entry) in pending.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.backoff_base * i as u32).await;
            }
            match self.deliver(&entry.kind, &entry.payload).await {
                Ok(()) => {
                    outbox::mark_sent(&self.db, entry.id).await?;
                    report.sent += 1;
                }
                Err(e) => {
                    debug!(id = entry.id, kind = entry.kind, error = %e, "delivery failed");
                    match outbox::mark_failed(&self.db, entry.id, &e.to_string()).await? {
                        PendingStatus::Failed => report.failed += 1,
                        _ => report.still_pending += 1,
                    }
                }
            }
        }
        Ok(report)
    }

    async fn deliver(&self, kind: &str, payload: &str) -> Result<(), EngramError> {
        match kind {
            crate::SUMMARY_REQUEST_KIND => self.deliver_summary(payload).await,
            other => Err(EngramError::Validation(format!(
                "unknown outbox message kind: {other}"
            ))),
        }
    }

    async fn deliver_summary(&self, payload: &str) -> Result<(), EngramError> {
        let payload: SummaryRequestPayload = serde_json::from_str(payload)
            .map_err(|e| EngramError::Validation(format!("malformed outbox payload: {e}")))?;
        let Some(provider) = &self.provider else {
            return Err(EngramError::Config("no summary provider configured".into()));
        };

        // The summary may have landed through another path meanwhile.
        if summaries::get_summary(&self.db, &payload.session_id).await?.is_some() {
            return Ok(());
        }
        let collected = observations::for_session(&self.db, &payload.session_id).await?;
        let summary = provider.summarize(&payload.session_id, &collected).await?;
        summaries::insert_summary(&self.db, &summary).await?;
        Ok(())
    }
}
