// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Capability traits at the seams of the engine.
//!
//! Extraction, summarization, and semantic similarity are all pluggable:
//! the pipeline and the retrieval engine depend only on these traits so
//! a statistical extractor or a different provider can be substituted
//! without touching either component.

use async_trait::async_trait;

use crate::error::EngramError;
use crate::types::{CaptureEvent, ExtractedObservation, Observation, Summary};

/// Turns raw event text into observation candidates.
///
/// Extractors are deterministic and infallible: unmatched input yields
/// an empty Vec, never an error. False positives are expected and are
/// mitigated downstream by ranking and pruning.
pub trait Extractor: Send + Sync {
    /// Extractor name for logging.
    fn name(&self) -> &str;

    /// Extract observation candidates from one event.
    fn extract(&self, event: &CaptureEvent) -> Vec<ExtractedObservation>;
}

/// Out-of-process session summarization.
///
/// Always treated as fallible and possibly slow: callers dispatch it
/// asynchronously and degrade failures into pending outbox entries.
#[async_trait]
pub trait SummaryProvider: Send + Sync {
    /// Provider name for logging and config matching.
    fn name(&self) -> &str;

    /// Roll up a session's observations into a [`Summary`].
    async fn summarize(
        &self,
        session_id: &str,
        observations: &[Observation],
    ) -> Result<Summary, EngramError>;
}

/// Narrow interface to an optional external similarity backend.
///
/// The engine never implements its own embedding index; when a backend
/// is configured its nearest-neighbor results are merged into ranking.
#[async_trait]
pub trait SimilarityBackend: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Nearest neighbors for a query: (memory_id, similarity in 0..=1).
    async fn similar(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<(String, f64)>, EngramError>;
}
