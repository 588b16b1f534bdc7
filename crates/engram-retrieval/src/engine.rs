// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ranked retrieval over the observation store.
//!
//! Candidates come from the BM25 shadow index, optionally merged with
//! an external similarity backend, and are ranked by a weighted sum of
//! text relevance, semantic similarity, and exponential recency decay.
//! Kind filters are hard: they apply after scoring and a filtered-out
//! observation never reappears regardless of score.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use engram_config::RetrievalConfig;
use engram_core::{EngramError, ObservationKind, ScoredObservation, SimilarityBackend};
use engram_storage::Database;
use engram_storage::queries::observations;
use tracing::{debug, warn};

/// One retrieval request.
#[derive(Debug, Clone, Default)]
pub struct SearchRequest {
    pub query: String,
    /// Hard post-filter; empty means all kinds.
    pub kinds: Vec<ObservationKind>,
    /// Maximum results. Zero yields an empty result set.
    pub limit: usize,
    pub project: Option<String>,
}

pub struct RetrievalEngine {
    db: Database,
    config: RetrievalConfig,
    similarity: Option<Arc<dyn SimilarityBackend>>,
}

impl RetrievalEngine {
    pub fn new(
        db: Database,
        config: RetrievalConfig,
        similarity: Option<Arc<dyn SimilarityBackend>>,
    ) -> Self {
        Self {
            db,
            config,
            similarity,
        }
    }

    /// Execute a search and return scored observations, best first.
    ///
    /// An empty or unindexable query degrades to a pure-recency listing
    /// rather than an error. Ties break toward the most recent.
    pub async fn search(&self, req: &SearchRequest) -> Result<Vec<ScoredObservation>, EngramError> {
        if req.limit == 0 {
            return Ok(vec![]);
        }

        let match_query = sanitize_fts_query(&req.query);
        let Some(match_query) = match_query else {
            debug!(query = req.query, "no indexable terms, degrading to recency");
            return self.recents(req).await;
        };

        let hits = observations::search_text(&self.db, &match_query, self.config.max_candidates)
            .await?;

        // Text relevance per rowid, min-max normalized into 0..=1.
        let mut text_scores: HashMap<i64, f64> = HashMap::new();
        if !hits.is_empty() {
            let best = -hits.iter().map(|(_, s)| *s).fold(f64::INFINITY, f64::min);
            let worst = -hits.iter().map(|(_, s)| *s).fold(f64::NEG_INFINITY, f64::max);
            let range = best - worst;
            for (id, bm25) in &hits {
                let relevance = -bm25;
                let normalized = if range > f64::EPSILON {
                    (relevance - worst) / range
                } else {
                    1.0
                };
                text_scores.insert(*id, normalized);
            }
        }

        // Similarity candidates extend the pool; backend failures only
        // degrade ranking, never the whole request.
        let mut sim_scores: HashMap<i64, f64> = HashMap::new();
        if let Some(backend) = &self.similarity {
            match backend.similar(&req.query, self.config.max_candidates).await {
                Ok(neighbors) => {
                    let memory_ids: Vec<String> =
                        neighbors.iter().map(|(id, _)| id.clone()).collect();
                    let rowids = observations::rowids_for_memory_ids(&self.db, &memory_ids).await?;
                    let by_memory_id: HashMap<&str, i64> =
                        rowids.iter().map(|(mid, id)| (mid.as_str(), *id)).collect();
                    for (memory_id, score) in &neighbors {
                        if let Some(id) = by_memory_id.get(memory_id.as_str()) {
                            sim_scores.insert(*id, score.clamp(0.0, 1.0));
                        }
                    }
                }
                Err(e) => {
                    warn!(backend = backend.name(), error = %e, "similarity backend unavailable");
                }
            }
        }

        let mut candidate_ids: Vec<i64> = text_scores.keys().copied().collect();
        for id in sim_scores.keys() {
            if !text_scores.contains_key(id) {
                candidate_ids.push(*id);
            }
        }
        if candidate_ids.is_empty() {
            debug!(query = req.query, "no index hits, degrading to recency");
            return self.recents(req).await;
        }

        let now = Utc::now().timestamp();
        let fetched = observations::get_by_rowids(&self.db, &candidate_ids).await?;
        let mut scored: Vec<ScoredObservation> = fetched
            .into_iter()
            .filter(|obs| req.kinds.is_empty() || req.kinds.contains(&obs.kind))
            .filter(|obs| {
                req.project
                    .as_deref()
                    .map(|p| obs.project == p)
                    .unwrap_or(true)
            })
            .map(|obs| {
                let text = text_scores.get(&obs.id).copied().unwrap_or(0.0);
                let sim = sim_scores.get(&obs.id).copied().unwrap_or(0.0);
                let recency = recency_decay(
                    now - obs.created_epoch,
                    self.config.recency_half_life_days,
                );
                let score = self.config.w_text * text
                    + self.config.w_similarity * sim
                    + self.config.w_recency * recency;
                ScoredObservation {
                    observation: obs,
                    score,
                }
            })
            .collect();

        sort_scored(&mut scored);
        scored.truncate(req.limit);
        Ok(scored)
    }

    /// Pure-recency listing used when the query has no indexable terms
    /// or none of its terms hit the index.
    async fn recents(&self, req: &SearchRequest) -> Result<Vec<ScoredObservation>, EngramError> {
        let rows = match req.project.as_deref() {
            Some(project) => {
                observations::recent_for_project(&self.db, project, self.config.max_candidates)
                    .await?
            }
            None => observations::recent(&self.db, self.config.max_candidates).await?,
        };
        let now = Utc::now().timestamp();
        let mut scored: Vec<ScoredObservation> = rows
            .into_iter()
            .filter(|obs| req.kinds.is_empty() || req.kinds.contains(&obs.kind))
            .map(|obs| {
                let recency = recency_decay(
                    now - obs.created_epoch,
                    self.config.recency_half_life_days,
                );
                ScoredObservation {
                    observation: obs,
                    score: self.config.w_recency * recency,
                }
            })
            .collect();
        sort_scored(&mut scored);
        scored.truncate(req.limit);
        Ok(scored)
    }
}

fn sort_scored(scored: &mut [ScoredObservation]) {
    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.observation.created_epoch.cmp(&a.observation.created_epoch))
            .then_with(|| b.observation.id.cmp(&a.observation.id))
    });
}

/// Exponential decay: 1.0 now, 0.5 after one half-life.
fn recency_decay(age_secs: i64, half_life_days: f64) -> f64 {
    let age_days = (age_secs.max(0) as f64) / 86_400.0;
    0.5_f64.powf(age_days / half_life_days)
}

/// Rewrite user text into a safe FTS5 MATCH expression.
///
/// Each alphanumeric term is double-quoted so FTS operators and
/// punctuation in user input cannot change query semantics. Returns
/// None when nothing indexable remains.
fn sanitize_fts_query(query: &str) -> Option<String> {
    let terms: Vec<String> = query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{t}\""))
        .collect();
    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use engram_core::Observation;
    use engram_storage::queries::sessions;

    fn engine(db: Database, similarity: Option<Arc<dyn SimilarityBackend>>) -> RetrievalEngine {
        RetrievalEngine::new(db, RetrievalConfig::default(), similarity)
    }

    fn observation(memory_id: &str, narrative: &str, epoch: i64) -> Observation {
        Observation {
            id: 0,
            memory_id: memory_id.to_string(),
            session_id: "sess-1".to_string(),
            kind: ObservationKind::Learning,
            title: narrative.chars().take(40).collect(),
            subtitle: None,
            narrative: narrative.to_string(),
            facts: vec![],
            concepts: vec![],
            files_read: vec![],
            files_modified: vec![],
            project: "engram".to_string(),
            prompt_number: 1,
            created_at: "2026-08-01T00:00:00.000Z".to_string(),
            created_epoch: epoch,
            token_cost: (narrative.len() / 4) as i64,
            favorite: false,
        }
    }

    async fn seed(db: &Database, rows: &[Observation]) {
        sessions::open_session(db, "sess-1", "engram").await.unwrap();
        for obs in rows {
            observations::insert_observation(db, obs).await.unwrap();
        }
    }

    #[test]
    fn sanitizer_quotes_terms_and_strips_operators() {
        assert_eq!(
            sanitize_fts_query("retry AND backoff*").as_deref(),
            Some("\"retry\" \"AND\" \"backoff\"")
        );
        assert_eq!(sanitize_fts_query("  (\"*  "), None);
        assert_eq!(sanitize_fts_query(""), None);
    }

    #[test]
    fn decay_halves_per_half_life() {
        assert!((recency_decay(0, 30.0) - 1.0).abs() < 1e-9);
        assert!((recency_decay(30 * 86_400, 30.0) - 0.5).abs() < 1e-9);
        assert!((recency_decay(60 * 86_400, 30.0) - 0.25).abs() < 1e-9);
    }

    #[tokio::test]
    async fn zero_limit_is_empty() {
        let db = Database::open_in_memory().await.unwrap();
        seed(&db, &[observation("mem-1", "the borrow checker rejects this", 1000)]).await;
        let got = engine(db, None)
            .search(&SearchRequest {
                query: "borrow".into(),
                limit: 0,
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(got.is_empty());
    }

    #[tokio::test]
    async fn text_match_ranks_above_non_match() {
        let db = Database::open_in_memory().await.unwrap();
        let now = Utc::now().timestamp();
        seed(
            &db,
            &[
                observation("mem-1", "the outbox uses linear backoff", now - 5000),
                observation("mem-2", "unrelated note about parsers", now),
            ],
        )
        .await;
        let got = engine(db, None)
            .search(&SearchRequest {
                query: "linear backoff".into(),
                limit: 10,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].observation.memory_id, "mem-1");
        assert!(got[0].score > 0.0);
    }

    #[tokio::test]
    async fn empty_query_degrades_to_recency() {
        let db = Database::open_in_memory().await.unwrap();
        let now = Utc::now().timestamp();
        seed(
            &db,
            &[
                observation("mem-old", "older note", now - 10_000),
                observation("mem-new", "newer note", now),
            ],
        )
        .await;
        let got = engine(db, None)
            .search(&SearchRequest {
                query: "   ".into(),
                limit: 10,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].observation.memory_id, "mem-new");
    }

    #[tokio::test]
    async fn unmatchable_query_degrades_to_recency() {
        let db = Database::open_in_memory().await.unwrap();
        let now = Utc::now().timestamp();
        seed(
            &db,
            &[
                observation("mem-old", "older note", now - 10_000),
                observation("mem-new", "newer note", now),
            ],
        )
        .await;
        // Well-formed terms that hit nothing in the index.
        let got = engine(db, None)
            .search(&SearchRequest {
                query: "zeppelin quasar".into(),
                limit: 10,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].observation.memory_id, "mem-new");
    }

    #[tokio::test]
    async fn kind_filter_is_hard() {
        let db = Database::open_in_memory().await.unwrap();
        let now = Utc::now().timestamp();
        let mut decision = observation("mem-1", "we keep the retry budget bounded", now);
        decision.kind = ObservationKind::Decision;
        let learning = observation("mem-2", "the retry budget interacts with timeouts", now);
        seed(&db, &[decision, learning]).await;

        let got = engine(db, None)
            .search(&SearchRequest {
                query: "retry budget".into(),
                kinds: vec![ObservationKind::Decision],
                limit: 10,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].observation.kind, ObservationKind::Decision);
    }

    struct FixedSimilarity {
        neighbors: Vec<(String, f64)>,
    }

    #[async_trait]
    impl SimilarityBackend for FixedSimilarity {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn similar(
            &self,
            _query: &str,
            _limit: usize,
        ) -> Result<Vec<(String, f64)>, EngramError> {
            Ok(self.neighbors.clone())
        }
    }

    struct FailingSimilarity;

    #[async_trait]
    impl SimilarityBackend for FailingSimilarity {
        fn name(&self) -> &str {
            "failing"
        }

        async fn similar(
            &self,
            _query: &str,
            _limit: usize,
        ) -> Result<Vec<(String, f64)>, EngramError> {
            Err(EngramError::Provider {
                message: "backend down".into(),
                source: None,
            })
        }
    }

    #[tokio::test]
    async fn similarity_extends_the_candidate_pool() {
        let db = Database::open_in_memory().await.unwrap();
        let now = Utc::now().timestamp();
        seed(
            &db,
            &[
                observation("mem-text", "tokio spawns the worker task", now),
                observation("mem-sim", "async runtime scheduling details", now),
            ],
        )
        .await;

        let backend = Arc::new(FixedSimilarity {
            neighbors: vec![("mem-sim".to_string(), 0.9)],
        });
        let got = engine(db, Some(backend))
            .search(&SearchRequest {
                query: "tokio worker".into(),
                limit: 10,
                ..Default::default()
            })
            .await
            .unwrap();
        let ids: Vec<&str> = got.iter().map(|s| s.observation.memory_id.as_str()).collect();
        assert!(ids.contains(&"mem-text"));
        assert!(ids.contains(&"mem-sim"));
    }

    #[tokio::test]
    async fn similarity_failure_degrades_not_errors() {
        let db = Database::open_in_memory().await.unwrap();
        let now = Utc::now().timestamp();
        seed(&db, &[observation("mem-1", "tokio spawns the worker task", now)]).await;

        let got = engine(db, Some(Arc::new(FailingSimilarity)))
            .search(&SearchRequest {
                query: "tokio worker".into(),
                limit: 10,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(got.len(), 1);
    }

    #[tokio::test]
    async fn equal_scores_break_toward_recent() {
        let db = Database::open_in_memory().await.unwrap();
        seed(
            &db,
            &[
                observation("mem-a", "identical payload", 1_000),
                observation("mem-b", "identical payload", 2_000),
            ],
        )
        .await;
        // Both so old that recency contributes ~0; text scores equal.
        let got = engine(db, None)
            .search(&SearchRequest {
                query: "identical payload".into(),
                limit: 10,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].observation.memory_id, "mem-b");
    }
}
