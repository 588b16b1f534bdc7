// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ambient observation capture for the Engram memory engine.
//!
//! - **RegexExtractor**: trigger-phrase extraction with span gating
//! - **CapturePipeline**: session lifecycle, dedup, persistence
//! - **AnthropicSummarizer**: session rollups via the Messages API

pub mod extractor;
pub mod pipeline;
pub mod summarizer;

pub use extractor::RegexExtractor;
pub use pipeline::{CapturePipeline, new_memory_id};
pub use summarizer::AnthropicSummarizer;
