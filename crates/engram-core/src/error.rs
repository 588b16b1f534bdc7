// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Engram memory engine.

use thiserror::Error;

/// The primary error type used across all Engram crates.
///
/// Each variant maps to a distinct handling policy: validation and
/// not-found errors are surfaced to the caller and never retried,
/// transient I/O errors are retried with bounded backoff, provider
/// errors are converted into pending outbox entries, and consistency
/// errors are fatal for further writes to the store.
#[derive(Debug, Error)]
pub enum EngramError {
    /// Missing or malformed request parameters. Surfaced, never retried.
    #[error("validation error: {0}")]
    Validation(String),

    /// Unknown id or session. Surfaced, never retried.
    #[error("not found: {0}")]
    NotFound(String),

    /// Connection refused, timeout, or a temporarily locked store.
    /// Retried with bounded backoff, then surfaced.
    #[error("transient i/o error: {source}")]
    TransientIo {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Summarization backend failure. Converted to a pending message,
    /// never silently dropped and never blocking the caller.
    #[error("provider error: {message}")]
    Provider {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Shadow index diverged from the primary table or a cascade
    /// invariant was violated. Fatal: the store refuses further writes.
    #[error("consistency error: {0}")]
    Consistency(String),

    /// Configuration errors (invalid TOML, bad values, missing fields).
    #[error("configuration error: {0}")]
    Config(String),

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl EngramError {
    /// Short machine-readable kind string, stable across releases.
    ///
    /// Outward-facing errors are always (kind, message) pairs so
    /// clients can branch on kind without parsing messages.
    pub fn kind(&self) -> &'static str {
        match self {
            EngramError::Validation(_) => "validation",
            EngramError::NotFound(_) => "not_found",
            EngramError::TransientIo { .. } => "transient_io",
            EngramError::Provider { .. } => "provider",
            EngramError::Consistency(_) => "consistency",
            EngramError::Config(_) => "config",
            EngramError::Timeout { .. } => "timeout",
            EngramError::Internal(_) => "internal",
        }
    }

    /// Whether a bounded retry is appropriate for this error.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EngramError::TransientIo { .. } | EngramError::Timeout { .. }
        )
    }
}
