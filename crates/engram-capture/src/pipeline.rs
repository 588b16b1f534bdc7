// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session capture pipeline.
//!
//! Owns the event flow: open or resume a session, extract observation
//! candidates from each event, dedup against the session working set,
//! persist survivors, and at session end roll the session up into a
//! summary when it crossed the observation threshold.
//!
//! Summarization is best-effort. A transient provider failure degrades
//! into a durable outbox entry instead of failing the session close.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use engram_config::CaptureConfig;
use engram_core::{
    CaptureEvent, EngramError, Extractor, Observation, Session, Summary, SummaryProvider,
};
use engram_storage::Database;
use engram_storage::queries::{observations, outbox, sessions, summaries};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Outbox message kind for a deferred summary request.
pub const SUMMARY_REQUEST_KIND: &str = "summary_request";

pub struct CapturePipeline {
    db: Database,
    config: CaptureConfig,
    extractor: Arc<dyn Extractor>,
    provider: Option<Arc<dyn SummaryProvider>>,
    // Normalized narratives per live session, newest at the back.
    working_sets: DashMap<String, VecDeque<String>>,
}

impl CapturePipeline {
    pub fn new(
        db: Database,
        config: CaptureConfig,
        extractor: Arc<dyn Extractor>,
        provider: Option<Arc<dyn SummaryProvider>>,
    ) -> Self {
        Self {
            db,
            config,
            extractor,
            provider,
            working_sets: DashMap::new(),
        }
    }

    /// Open or resume a session and warm its dedup working set from the
    /// project's most recent observations, so a fact already captured in
    /// an earlier session is not re-stored by this one.
    pub async fn on_session_start(
        &self,
        session_id: &str,
        project: &str,
    ) -> Result<Session, EngramError> {
        let session = sessions::open_session(&self.db, session_id, project).await?;

        let existing =
            observations::recent_for_project(&self.db, project, self.config.working_set_size)
                .await?;
        let mut set = VecDeque::with_capacity(self.config.working_set_size);
        // Newest first from the query; push oldest first so eviction
        // drops the oldest.
        for obs in existing.iter().rev() {
            set.push_back(normalize(&obs.narrative));
        }
        self.working_sets.insert(session_id.to_string(), set);

        info!(
            session_id,
            project,
            warmed = self.working_sets.get(session_id).map(|s| s.len()).unwrap_or(0),
            "session started"
        );
        Ok(session)
    }

    /// Process one event: extract, filter, dedup, persist.
    ///
    /// Returns the observations actually written. Replaying the same
    /// event is a no-op thanks to working-set dedup.
    pub async fn on_event(&self, event: &CaptureEvent) -> Result<Vec<Observation>, EngramError> {
        sessions::touch_session(&self.db, &event.session_id).await?;
        let session = sessions::get_session(&self.db, &event.session_id)
            .await?
            .ok_or_else(|| EngramError::NotFound(format!("session {}", event.session_id)))?;

        let candidates = self.extractor.extract(event);
        debug!(
            session_id = event.session_id,
            extractor = self.extractor.name(),
            candidates = candidates.len(),
            "extraction finished"
        );

        let mut written = Vec::new();
        for candidate in candidates {
            if !self
                .config
                .allowed_kinds
                .iter()
                .any(|k| k == candidate.kind.as_str())
            {
                warn!(kind = candidate.kind.as_str(), "kind outside allow-list, dropped");
                continue;
            }

            let normalized = normalize(&candidate.narrative);
            if self.seen(&event.session_id, &normalized) {
                debug!(session_id = event.session_id, "duplicate narrative, dropped");
                continue;
            }

            let now = Utc::now();
            let obs = Observation {
                id: 0,
                memory_id: new_memory_id(),
                session_id: event.session_id.clone(),
                kind: candidate.kind,
                title: candidate.title,
                subtitle: None,
                narrative: candidate.narrative.clone(),
                facts: vec![],
                concepts: vec![],
                files_read: vec![],
                files_modified: vec![],
                project: event.project.clone(),
                prompt_number: session.prompt_count,
                created_at: now.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string(),
                created_epoch: now.timestamp(),
                token_cost: (candidate.narrative.len() / 4) as i64,
                favorite: false,
            };
            let id = observations::insert_observation(&self.db, &obs).await?;
            self.remember(&event.session_id, normalized);
            written.push(Observation { id, ..obs });
        }

        Ok(written)
    }

    /// Close a session. If it crossed the summary threshold and a
    /// provider is configured, generate and persist the rollup; on a
    /// transient provider failure, enqueue the request instead.
    pub async fn on_session_end(&self, session_id: &str) -> Result<Option<Summary>, EngramError> {
        sessions::complete_session(&self.db, session_id).await?;
        self.working_sets.remove(session_id);

        let collected = observations::for_session(&self.db, session_id).await?;
        // Summarize only when the session went past the threshold.
        if collected.len() <= self.config.summary_threshold {
            debug!(
                session_id,
                observations = collected.len(),
                threshold = self.config.summary_threshold,
                "below summary threshold"
            );
            return Ok(None);
        }
        let Some(provider) = &self.provider else {
            return Ok(None);
        };
        if summaries::get_summary(&self.db, session_id).await?.is_some() {
            return Ok(None);
        }

        match provider.summarize(session_id, &collected).await {
            Ok(summary) => {
                summaries::insert_summary(&self.db, &summary).await?;
                info!(session_id, provider = provider.name(), "session summarized");
                Ok(Some(summary))
            }
            Err(e) if e.is_transient() || matches!(e, EngramError::Provider { .. }) => {
                warn!(session_id, error = %e, "summary deferred to outbox");
                let payload = serde_json::json!({ "session_id": session_id }).to_string();
                outbox::enqueue(&self.db, session_id, SUMMARY_REQUEST_KIND, &payload).await?;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn seen(&self, session_id: &str, normalized: &str) -> bool {
        self.working_sets
            .get(session_id)
            .map(|set| set.iter().any(|n| n == normalized))
            .unwrap_or(false)
    }

    fn remember(&self, session_id: &str, normalized: String) {
        let mut set = self.working_sets.entry(session_id.to_string()).or_default();
        set.push_back(normalized);
        while set.len() > self.config.working_set_size {
            set.pop_front();
        }
    }
}

/// Case-folded, whitespace-collapsed form used for dedup comparison.
fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Display handle: millisecond timestamp plus a random suffix.
pub fn new_memory_id() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}", Utc::now().timestamp_millis(), &suffix[..8])
}
