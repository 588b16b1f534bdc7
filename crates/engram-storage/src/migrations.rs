// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedded database migrations using refinery.
//!
//! SQL migration files are compiled in via `embed_migrations!` and run
//! automatically on database open, in strictly increasing version
//! order, each inside its own transaction. Refinery records applied
//! versions in its append-only `refinery_schema_history` table.

use engram_core::EngramError;
use tokio_rusqlite::Connection;

mod embedded {
    use refinery::embed_migrations;
    embed_migrations!("migrations");
}

/// Run all pending migrations against the given connection.
///
/// A failed migration aborts and leaves the store at the last
/// successfully applied version; it is never partially applied.
pub async fn run_migrations(conn: &Connection) -> Result<(), EngramError> {
    conn.call(|conn| -> Result<(), rusqlite::Error> {
        embedded::migrations::runner()
            .run(conn)
            .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
        Ok(())
    })
    .await
    .map_err(|e| EngramError::Internal(format!("migration failed: {e}")))
}
