// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Request service for the Engram memory engine.
//!
//! Two surfaces over one store: an axum HTTP API for tooling and
//! dashboards, and a line-delimited JSON-RPC loop over stdio for the
//! assistant. Background tasks drain the durable outbox and run
//! retention sweeps.
//!
//! - **http**: `/health`, `/api/search`, `/api/timeline`,
//!   `/api/export`, `/api/stats`
//! - **rpc**: `initialize`, `shutdown`, `recall_context`,
//!   `search_memories`, `save_memory`, plus the capture lifecycle
//!   (`session_start`, `record_event`, `session_end`)
//! - **cache**: short-TTL search cache, invalidated on writes
//! - **outbox**: retry worker with linear backoff
//! - **retention**: age and ceiling pruning

pub mod cache;
pub mod export;
pub mod http;
pub mod outbox;
pub mod retention;
pub mod rpc;

pub use engram_capture::pipeline::SUMMARY_REQUEST_KIND;

pub use cache::SearchCache;
pub use http::{AppState, start_server};
pub use outbox::OutboxWorker;
pub use rpc::{RpcHandler, run_stdio};
