// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types for the Engram memory engine.

use serde::{Deserialize, Serialize};

/// One continuous interaction scope with the assistant.
///
/// Created on the first event of a session, mutated on each subsequent
/// event (prompt counter, updated_at). Deleting a session cascades to
/// all of its observations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Internal numeric row id (0 until persisted).
    pub id: i64,
    /// Stable external session identifier.
    pub session_id: String,
    /// Owning project.
    pub project: String,
    /// ISO 8601 creation timestamp.
    pub created_at: String,
    /// Creation time as epoch seconds, for range queries.
    pub created_epoch: i64,
    /// ISO 8601 last-update timestamp.
    pub updated_at: String,
    /// Last-update time as epoch seconds.
    pub updated_epoch: i64,
    /// Whether the session has ended.
    pub completed: bool,
    /// Running prompt counter.
    pub prompt_count: i64,
}

/// Kind of a captured observation.
///
/// The set is open: unknown kinds survive a round-trip through
/// [`ObservationKind::Other`], and the capture path validates against
/// a configurable allow-list rather than this enum.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObservationKind {
    Preference,
    Decision,
    Learning,
    Context,
    Discovery,
    Implementation,
    Issue,
    /// A kind outside the built-in set, preserved verbatim.
    #[serde(untagged)]
    Other(String),
}

impl ObservationKind {
    /// String form used for SQLite storage and wire formats.
    pub fn as_str(&self) -> &str {
        match self {
            ObservationKind::Preference => "preference",
            ObservationKind::Decision => "decision",
            ObservationKind::Learning => "learning",
            ObservationKind::Context => "context",
            ObservationKind::Discovery => "discovery",
            ObservationKind::Implementation => "implementation",
            ObservationKind::Issue => "issue",
            ObservationKind::Other(s) => s,
        }
    }

    /// Parse from the stored string form.
    pub fn from_str_value(s: &str) -> Self {
        match s {
            "preference" => ObservationKind::Preference,
            "decision" => ObservationKind::Decision,
            "learning" => ObservationKind::Learning,
            "context" => ObservationKind::Context,
            "discovery" => ObservationKind::Discovery,
            "implementation" => ObservationKind::Implementation,
            "issue" => ObservationKind::Issue,
            other => ObservationKind::Other(other.to_string()),
        }
    }
}

/// A single captured fact tied to a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    /// Internal numeric row id (0 until persisted).
    pub id: i64,
    /// Display handle: timestamp plus random suffix. Unique but not
    /// the primary key.
    pub memory_id: String,
    /// External id of the owning session.
    pub session_id: String,
    /// Observation kind.
    pub kind: ObservationKind,
    /// Short title line.
    pub title: String,
    /// Optional subtitle.
    pub subtitle: Option<String>,
    /// Free-text narrative.
    pub narrative: String,
    /// Ordered short fact strings.
    pub facts: Vec<String>,
    /// Ordered concept tags.
    pub concepts: Vec<String>,
    /// Files read during the captured activity.
    pub files_read: Vec<String>,
    /// Files modified during the captured activity.
    pub files_modified: Vec<String>,
    /// Owning project.
    pub project: String,
    /// Prompt number within the session.
    pub prompt_number: i64,
    /// ISO 8601 creation timestamp.
    pub created_at: String,
    /// Creation time as epoch seconds.
    pub created_epoch: i64,
    /// Estimated token cost of the narrative.
    pub token_cost: i64,
    /// Whether the user marked this observation as a favorite.
    pub favorite: bool,
}

/// An observation with a retrieval score attached.
#[derive(Debug, Clone)]
pub struct ScoredObservation {
    pub observation: Observation,
    /// Combined retrieval score (text relevance, similarity, recency).
    pub score: f64,
}

/// A session-level rollup generated at session end.
///
/// Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Summary {
    /// Internal numeric row id (0 until persisted).
    pub id: i64,
    /// External id of the owning session.
    pub session_id: String,
    /// What was requested.
    pub request: String,
    /// What was investigated.
    pub investigated: String,
    /// What was learned.
    pub learned: String,
    /// What was completed.
    pub completed: String,
    /// Suggested next steps.
    pub next_steps: String,
    /// Free-form notes.
    pub notes: String,
    /// ISO 8601 creation timestamp.
    pub created_at: String,
    /// Creation time as epoch seconds.
    pub created_epoch: i64,
}

/// Status of a durable outbox entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PendingStatus {
    Pending,
    Sent,
    Failed,
}

impl PendingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PendingStatus::Pending => "pending",
            PendingStatus::Sent => "sent",
            PendingStatus::Failed => "failed",
        }
    }

    pub fn from_str_value(s: &str) -> Self {
        match s {
            "sent" => PendingStatus::Sent,
            "failed" => PendingStatus::Failed,
            _ => PendingStatus::Pending,
        }
    }
}

/// A durable outbox entry for a write deferred by a transient failure.
///
/// Deleted-equivalent terminal states are `sent` (success) and `failed`
/// (attempt ceiling reached); entries are never silently dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingMessage {
    pub id: i64,
    /// External id of the owning session.
    pub session_id: String,
    /// Message type discriminator (e.g. "summary_request").
    pub kind: String,
    /// JSON payload.
    pub payload: String,
    pub status: PendingStatus,
    /// Attempts made so far.
    pub attempts: i64,
    /// Attempt ceiling; reaching it moves the entry to `failed`.
    pub max_attempts: i64,
    /// Last error message, if any attempt failed.
    pub last_error: Option<String>,
    pub created_epoch: i64,
    pub updated_epoch: i64,
}

/// User-curated label attached to observations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tag {
    pub id: i64,
    /// Unique tag name.
    pub name: String,
    pub color: Option<String>,
    pub description: Option<String>,
}

/// Raw event text carried into the capture pipeline.
#[derive(Debug, Clone)]
pub struct CaptureEvent {
    /// External id of the session this event belongs to.
    pub session_id: String,
    /// Owning project.
    pub project: String,
    /// User-authored input text.
    pub input_text: String,
    /// Assistant response text.
    pub response_text: String,
}

/// An observation candidate produced by an extractor, before persistence.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedObservation {
    pub kind: ObservationKind,
    /// Title derived from the matched span.
    pub title: String,
    /// The matched span verbatim.
    pub narrative: String,
}
