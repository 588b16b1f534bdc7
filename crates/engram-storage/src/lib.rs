// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence layer for the Engram memory engine.
//!
//! A single background connection (WAL, foreign keys on) owns all
//! access; query modules wrap it with typed async functions. The FTS5
//! shadow index over observations is kept in sync by triggers and
//! verified at startup.
//!
//! - **Database**: connection handle, pragmas, migrations, poisoning
//! - **queries::sessions**: session lifecycle and cascade delete
//! - **queries::observations**: CRUD, BM25 search, retention
//! - **queries::summaries**: write-once session rollups
//! - **queries::outbox**: durable retry queue for deferred writes
//! - **queries::tags**: curation labels and favorites support

pub mod database;
mod migrations;
pub mod models;
pub mod queries;

pub use database::Database;
pub use models::*;
