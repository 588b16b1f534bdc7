// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session lifecycle operations.

use engram_core::EngramError;
use rusqlite::params;

use crate::database::{Database, map_tr_err};
use crate::models::Session;

fn row_to_session(row: &rusqlite::Row) -> Result<Session, rusqlite::Error> {
    Ok(Session {
        id: row.get(0)?,
        session_id: row.get(1)?,
        project: row.get(2)?,
        created_at: row.get(3)?,
        created_epoch: row.get(4)?,
        updated_at: row.get(5)?,
        updated_epoch: row.get(6)?,
        completed: row.get::<_, i64>(7)? != 0,
        prompt_count: row.get(8)?,
    })
}

const SESSION_COLUMNS: &str = "id, session_id, project, created_at, created_epoch, \
     updated_at, updated_epoch, completed, prompt_count";

/// Idempotently create or resume a session.
///
/// Creates the row on the first event of a session; subsequent calls
/// leave the existing row untouched. Returns the current row either way.
pub async fn open_session(
    db: &Database,
    session_id: &str,
    project: &str,
) -> Result<Session, EngramError> {
    db.assert_writable()?;
    let session_id = session_id.to_string();
    let project = project.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO sessions (session_id, project) VALUES (?1, ?2)
                 ON CONFLICT(session_id) DO NOTHING",
                params![session_id, project],
            )?;
            let sql = format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE session_id = ?1");
            let mut stmt = conn.prepare(&sql)?;
            stmt.query_row(params![session_id], row_to_session)
        })
        .await
        .map_err(map_tr_err)
}

/// Get a session by its external id.
pub async fn get_session(db: &Database, session_id: &str) -> Result<Option<Session>, EngramError> {
    let session_id = session_id.to_string();
    db.connection()
        .call(move |conn| {
            let sql = format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE session_id = ?1");
            let mut stmt = conn.prepare(&sql)?;
            match stmt.query_row(params![session_id], row_to_session) {
                Ok(session) => Ok(Some(session)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Bump the prompt counter and updated-at stamps for an event.
pub async fn touch_session(db: &Database, session_id: &str) -> Result<(), EngramError> {
    db.assert_writable()?;
    let sid = session_id.to_string();
    let session_id = session_id.to_string();
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE sessions SET prompt_count = prompt_count + 1,
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now'),
                     updated_epoch = unixepoch()
                 WHERE session_id = ?1",
                params![session_id],
            )?;
            if changed == 0 {
                return Err(rusqlite::Error::QueryReturnedNoRows);
            }
            Ok(())
        })
        .await
        .map_err(|e| match e {
            tokio_rusqlite::Error::Error(rusqlite::Error::QueryReturnedNoRows) => {
                EngramError::NotFound(format!("session {sid}"))
            }
            other => map_tr_err(other),
        })
}

/// Mark a session completed.
pub async fn complete_session(db: &Database, session_id: &str) -> Result<(), EngramError> {
    db.assert_writable()?;
    let session_id = session_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE sessions SET completed = 1,
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now'),
                     updated_epoch = unixepoch()
                 WHERE session_id = ?1",
                params![session_id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Explicitly prune a session.
///
/// Foreign keys cascade the delete to the session's observations, their
/// tag associations and favorite entries, and the FTS triggers remove
/// the shadow rows inside the same transaction. Returns the number of
/// observations removed alongside the session.
pub async fn delete_session(db: &Database, session_id: &str) -> Result<u64, EngramError> {
    db.assert_writable()?;
    let sid = session_id.to_string();
    let session_id = session_id.to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let observations: i64 = tx.query_row(
                "SELECT count(*) FROM observations WHERE session_id = ?1",
                params![session_id],
                |row| row.get(0),
            )?;
            let removed = tx.execute(
                "DELETE FROM sessions WHERE session_id = ?1",
                params![session_id],
            )?;
            if removed == 0 {
                return Err(rusqlite::Error::QueryReturnedNoRows);
            }
            tx.commit()?;
            Ok(observations as u64)
        })
        .await
        .map_err(|e| match e {
            tokio_rusqlite::Error::Error(rusqlite::Error::QueryReturnedNoRows) => {
                EngramError::NotFound(format!("session {sid}"))
            }
            other => map_tr_err(other),
        })
}

/// Count of all sessions.
pub async fn count_sessions(db: &Database) -> Result<i64, EngramError> {
    db.connection()
        .call(|conn| conn.query_row("SELECT count(*) FROM sessions", [], |row| row.get(0)))
        .await
        .map_err(map_tr_err)
}
