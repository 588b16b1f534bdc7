// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session summary persistence.
//!
//! Summaries are write-once: a second insert for the same session is
//! rejected so that a completed session's rollup never mutates.

use engram_core::EngramError;
use rusqlite::params;

use crate::database::{Database, map_tr_err};
use crate::models::Summary;

const SUMMARY_COLUMNS: &str = "id, session_id, request, investigated, learned, completed, \
     next_steps, notes, created_at, created_epoch";

fn row_to_summary(row: &rusqlite::Row) -> Result<Summary, rusqlite::Error> {
    Ok(Summary {
        id: row.get(0)?,
        session_id: row.get(1)?,
        request: row.get(2)?,
        investigated: row.get(3)?,
        learned: row.get(4)?,
        completed: row.get(5)?,
        next_steps: row.get(6)?,
        notes: row.get(7)?,
        created_at: row.get(8)?,
        created_epoch: row.get(9)?,
    })
}

/// Insert a summary for a session. Returns the assigned row id.
///
/// Fails with a validation error if the session already has one.
pub async fn insert_summary(db: &Database, summary: &Summary) -> Result<i64, EngramError> {
    db.assert_writable()?;
    let summary = summary.clone();
    let sid = summary.session_id.clone();
    let existing = get_summary(db, &summary.session_id).await?;
    if existing.is_some() {
        return Err(EngramError::Validation(format!(
            "session {sid} already has a summary"
        )));
    }
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO summaries
                     (session_id, request, investigated, learned, completed, next_steps, notes)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    summary.session_id,
                    summary.request,
                    summary.investigated,
                    summary.learned,
                    summary.completed,
                    summary.next_steps,
                    summary.notes,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(map_tr_err)
}

/// Get the summary for a session, if one was written.
pub async fn get_summary(db: &Database, session_id: &str) -> Result<Option<Summary>, EngramError> {
    let session_id = session_id.to_string();
    db.connection()
        .call(move |conn| {
            let sql = format!("SELECT {SUMMARY_COLUMNS} FROM summaries WHERE session_id = ?1");
            let mut stmt = conn.prepare(&sql)?;
            match stmt.query_row(params![session_id], row_to_summary) {
                Ok(summary) => Ok(Some(summary)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Total summary count.
pub async fn count_summaries(db: &Database) -> Result<i64, EngramError> {
    db.connection()
        .call(|conn| conn.query_row("SELECT count(*) FROM summaries", [], |row| row.get(0)))
        .await
        .map_err(map_tr_err)
}
