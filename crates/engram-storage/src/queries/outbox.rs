// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable outbox for writes deferred by transient failures.
//!
//! Entries move pending -> sent on success, or pending -> failed once
//! the attempt ceiling is hit. Both terminal states keep the row so
//! nothing is silently dropped.

use engram_core::EngramError;
use rusqlite::params;

use crate::database::{Database, map_tr_err};
use crate::models::{PendingMessage, PendingStatus};

const PENDING_COLUMNS: &str = "id, session_id, kind, payload, status, attempts, max_attempts, \
     last_error, created_epoch, updated_epoch";

fn row_to_pending(row: &rusqlite::Row) -> Result<PendingMessage, rusqlite::Error> {
    let status: String = row.get(4)?;
    Ok(PendingMessage {
        id: row.get(0)?,
        session_id: row.get(1)?,
        kind: row.get(2)?,
        payload: row.get(3)?,
        status: PendingStatus::from_str_value(&status),
        attempts: row.get(5)?,
        max_attempts: row.get(6)?,
        last_error: row.get(7)?,
        created_epoch: row.get(8)?,
        updated_epoch: row.get(9)?,
    })
}

/// Enqueue a new pending entry. Returns its row id.
pub async fn enqueue(
    db: &Database,
    session_id: &str,
    kind: &str,
    payload: &str,
) -> Result<i64, EngramError> {
    db.assert_writable()?;
    let session_id = session_id.to_string();
    let kind = kind.to_string();
    let payload = payload.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO pending_messages (session_id, kind, payload)
                 VALUES (?1, ?2, ?3)",
                params![session_id, kind, payload],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(map_tr_err)
}

/// All entries still awaiting delivery, oldest first.
pub async fn list_pending(db: &Database) -> Result<Vec<PendingMessage>, EngramError> {
    db.connection()
        .call(move |conn| {
            let sql = format!(
                "SELECT {PENDING_COLUMNS} FROM pending_messages
                 WHERE status = 'pending' ORDER BY created_epoch ASC, id ASC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([], row_to_pending)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
        .map_err(map_tr_err)
}

/// Mark an entry delivered.
pub async fn mark_sent(db: &Database, id: i64) -> Result<(), EngramError> {
    db.assert_writable()?;
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE pending_messages
                 SET status = 'sent', updated_epoch = unixepoch()
                 WHERE id = ?1",
                params![id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Record a failed delivery attempt.
///
/// Increments the attempt counter; once attempts reach the entry's
/// ceiling the status flips to `failed` and the worker stops retrying.
/// Returns the status after the update.
pub async fn mark_failed(
    db: &Database,
    id: i64,
    error: &str,
) -> Result<PendingStatus, EngramError> {
    db.assert_writable()?;
    let error = error.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE pending_messages
                 SET attempts = attempts + 1,
                     last_error = ?2,
                     updated_epoch = unixepoch(),
                     status = CASE WHEN attempts + 1 >= max_attempts
                                   THEN 'failed' ELSE 'pending' END
                 WHERE id = ?1",
                params![id, error],
            )?;
            let status: String = conn.query_row(
                "SELECT status FROM pending_messages WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )?;
            Ok(PendingStatus::from_str_value(&status))
        })
        .await
        .map_err(map_tr_err)
}

/// Counts per status (pending, sent, failed).
pub async fn status_counts(db: &Database) -> Result<Vec<(String, i64)>, EngramError> {
    db.connection()
        .call(|conn| {
            let mut stmt = conn
                .prepare("SELECT status, count(*) FROM pending_messages GROUP BY status")?;
            let rows = stmt
                .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
        .map_err(map_tr_err)
}
