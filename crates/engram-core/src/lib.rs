// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Engram memory engine.
//!
//! Provides the error taxonomy, domain types (sessions, observations,
//! summaries, the durable outbox), and the capability traits that the
//! capture and retrieval crates plug into.

pub mod error;
pub mod traits;
pub mod types;

pub use error::EngramError;
pub use traits::{Extractor, SimilarityBackend, SummaryProvider};
pub use types::{
    CaptureEvent, ExtractedObservation, Observation, ObservationKind, PendingMessage,
    PendingStatus, ScoredObservation, Session, Summary, Tag,
};
