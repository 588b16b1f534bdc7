// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ranked retrieval and context assembly for the Engram memory engine.
//!
//! - **RetrievalEngine**: BM25 + optional similarity + recency ranking
//! - **ContextAssembler**: greedy packing under a token budget

pub mod assembler;
pub mod engine;

pub use assembler::{AssembledContext, ContextAssembler, estimate_tokens};
pub use engine::{RetrievalEngine, SearchRequest};
