// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management: PRAGMA setup, WAL mode, migrations,
//! and write poisoning on consistency violations.
//!
//! All writes are serialized through tokio-rusqlite's single background
//! thread; the [`Database`] struct IS the single writer. Query modules
//! accept `&Database` and go through `connection().call()`. Do not
//! create additional Connection instances for writes.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use engram_core::EngramError;
use tokio_rusqlite::Connection;
use tracing::{debug, error};

use crate::migrations;

/// Handle to the single SQLite store.
#[derive(Clone)]
pub struct Database {
    conn: Connection,
    /// Set when a consistency invariant is found violated; all further
    /// writes are refused until the store is repaired.
    write_poisoned: Arc<AtomicBool>,
}

/// Convert raw rusqlite errors into the engine taxonomy.
///
/// SQLITE_BUSY / SQLITE_LOCKED are transient (the store is temporarily
/// locked and a bounded retry is appropriate); everything else is
/// internal.
pub fn map_sqlite_err(e: rusqlite::Error) -> EngramError {
    if let rusqlite::Error::SqliteFailure(code, _) = &e {
        if matches!(
            code.code,
            rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
        ) {
            return EngramError::TransientIo {
                source: Box::new(e),
            };
        }
    }
    EngramError::Internal(format!("storage error: {e}"))
}

/// Convert tokio-rusqlite call errors into the engine taxonomy.
pub fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> EngramError {
    match e {
        tokio_rusqlite::Error::Error(inner) => map_sqlite_err(inner),
        other => EngramError::Internal(format!("storage error: {other}")),
    }
}

impl Database {
    /// Open (creating if absent) the store at `path` and bring it to the
    /// latest schema version.
    ///
    /// Applies pending migrations in strictly increasing order, each in
    /// its own transaction; a failed migration leaves the store at the
    /// last successfully applied version.
    pub async fn open(path: &str, wal_mode: bool) -> Result<Self, EngramError> {
        if let Some(parent) = std::path::Path::new(path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| EngramError::TransientIo {
                source: Box::new(e),
            })?;
        }

        let conn = Connection::open(path).await.map_err(map_sqlite_err)?;

        conn.call(move |conn| -> Result<(), rusqlite::Error> {
            if wal_mode {
                conn.pragma_update(None, "journal_mode", "WAL")?;
            }
            conn.pragma_update(None, "foreign_keys", "ON")?;
            conn.pragma_update(None, "busy_timeout", 5000)?;
            conn.pragma_update(None, "synchronous", "NORMAL")?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;

        migrations::run_migrations(&conn).await?;

        debug!(path, "database opened and migrated");
        Ok(Self {
            conn,
            write_poisoned: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Open an in-memory store (tests).
    pub async fn open_in_memory() -> Result<Self, EngramError> {
        let conn = Connection::open_in_memory().await.map_err(map_sqlite_err)?;
        conn.call(|conn| -> Result<(), rusqlite::Error> {
            conn.pragma_update(None, "foreign_keys", "ON")?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;
        migrations::run_migrations(&conn).await?;
        Ok(Self {
            conn,
            write_poisoned: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Raw connection handle for query modules.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Fail if the store has been poisoned by a consistency violation.
    ///
    /// Every mutating query calls this first; reads stay available.
    pub fn assert_writable(&self) -> Result<(), EngramError> {
        if self.write_poisoned.load(Ordering::Acquire) {
            return Err(EngramError::Consistency(
                "store refused writes after a consistency violation; run repair".to_string(),
            ));
        }
        Ok(())
    }

    /// The schema version recorded by the most recent successful
    /// migration, or 0 for a store with no applied migrations.
    pub async fn schema_version(&self) -> Result<i64, EngramError> {
        self.conn
            .call(|conn| -> Result<i64, rusqlite::Error> {
                conn.query_row(
                    "SELECT coalesce(max(version), 0) FROM refinery_schema_history",
                    [],
                    |row| row.get(0),
                )
            })
            .await
            .map_err(map_tr_err)
    }

    /// Verify the shadow index row count matches the primary table.
    ///
    /// On divergence the store is poisoned for writes and a fatal
    /// [`EngramError::Consistency`] is returned; reads continue so the
    /// damage can be inspected.
    pub async fn verify_shadow_index(&self) -> Result<(), EngramError> {
        let (primary, shadow) = self
            .conn
            .call(|conn| -> Result<(i64, i64), rusqlite::Error> {
                let primary: i64 =
                    conn.query_row("SELECT count(*) FROM observations", [], |row| row.get(0))?;
                let shadow: i64 = conn.query_row(
                    "SELECT count(*) FROM observations_fts",
                    [],
                    |row| row.get(0),
                )?;
                Ok((primary, shadow))
            })
            .await
            .map_err(map_tr_err)?;

        if primary != shadow {
            self.write_poisoned.store(true, Ordering::Release);
            error!(primary, shadow, "shadow index diverged from observations");
            return Err(EngramError::Consistency(format!(
                "shadow index has {shadow} rows but observations has {primary}"
            )));
        }
        Ok(())
    }

    /// Liveness probe used by the health endpoint.
    pub async fn ping(&self) -> Result<(), EngramError> {
        self.conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    /// On-disk store size in bytes (page_count times page_size).
    pub async fn store_size_bytes(&self) -> Result<i64, EngramError> {
        self.conn
            .call(|conn| -> Result<i64, rusqlite::Error> {
                let pages: i64 = conn.query_row("PRAGMA page_count", [], |row| row.get(0))?;
                let page_size: i64 = conn.query_row("PRAGMA page_size", [], |row| row.get(0))?;
                Ok(pages * page_size)
            })
            .await
            .map_err(map_tr_err)
    }

    /// Checkpoint the WAL and release the handle.
    pub async fn close(&self) -> Result<(), EngramError> {
        self.conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        debug!("WAL checkpoint complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn open_creates_file_and_applies_migrations() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("engram.db");
        let db = Database::open(path.to_str().unwrap(), true).await.unwrap();

        assert!(path.exists());
        let version = db.schema_version().await.unwrap();
        assert!(version >= 3, "all three migrations should apply, got {version}");
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn reopen_is_idempotent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("engram.db");
        let db = Database::open(path.to_str().unwrap(), true).await.unwrap();
        let v1 = db.schema_version().await.unwrap();
        db.close().await.unwrap();
        drop(db);

        let db = Database::open(path.to_str().unwrap(), true).await.unwrap();
        let v2 = db.schema_version().await.unwrap();
        assert_eq!(v1, v2);
        db.close().await.unwrap();
    }

    #[test]
    fn busy_call_errors_map_to_transient() {
        let busy = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        );
        let mapped = map_tr_err(tokio_rusqlite::Error::Error(busy));
        assert!(mapped.is_transient());

        let closed = map_tr_err(tokio_rusqlite::Error::ConnectionClosed);
        assert!(!closed.is_transient());
    }

    #[tokio::test]
    async fn ping_succeeds_on_open_store() {
        let db = Database::open_in_memory().await.unwrap();
        db.ping().await.unwrap();
    }

    #[tokio::test]
    async fn fresh_store_shadow_index_is_consistent() {
        let db = Database::open_in_memory().await.unwrap();
        db.verify_shadow_index().await.unwrap();
        db.assert_writable().unwrap();
    }
}
