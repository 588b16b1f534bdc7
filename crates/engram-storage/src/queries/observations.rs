// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Observation CRUD, full-text search, and retention queries.
//!
//! List-valued fields (facts, concepts, file lists) are stored as JSON
//! text columns; the FTS triggers index them alongside title, subtitle,
//! and narrative so facts and concepts are searchable.

use engram_core::EngramError;
use rusqlite::params;

use crate::database::{Database, map_tr_err};
use crate::models::{Observation, ObservationKind};

const OBSERVATION_COLUMNS: &str = "id, memory_id, session_id, kind, title, subtitle, narrative, \
     facts, concepts, files_read, files_modified, project, prompt_number, \
     created_at, created_epoch, token_cost, favorite";

fn parse_list(raw: String) -> Vec<String> {
    serde_json::from_str(&raw).unwrap_or_default()
}

fn row_to_observation(row: &rusqlite::Row) -> Result<Observation, rusqlite::Error> {
    let kind: String = row.get(3)?;
    Ok(Observation {
        id: row.get(0)?,
        memory_id: row.get(1)?,
        session_id: row.get(2)?,
        kind: ObservationKind::from_str_value(&kind),
        title: row.get(4)?,
        subtitle: row.get(5)?,
        narrative: row.get(6)?,
        facts: parse_list(row.get(7)?),
        concepts: parse_list(row.get(8)?),
        files_read: parse_list(row.get(9)?),
        files_modified: parse_list(row.get(10)?),
        project: row.get(11)?,
        prompt_number: row.get(12)?,
        created_at: row.get(13)?,
        created_epoch: row.get(14)?,
        token_cost: row.get(15)?,
        favorite: row.get::<_, i64>(16)? != 0,
    })
}

/// Insert an observation. Returns the assigned row id.
///
/// The FTS shadow row is written by trigger inside the same implicit
/// transaction as the primary insert.
pub async fn insert_observation(db: &Database, obs: &Observation) -> Result<i64, EngramError> {
    db.assert_writable()?;
    let obs = obs.clone();
    let facts = serde_json::to_string(&obs.facts)
        .map_err(|e| EngramError::Internal(format!("serialize facts: {e}")))?;
    let concepts = serde_json::to_string(&obs.concepts)
        .map_err(|e| EngramError::Internal(format!("serialize concepts: {e}")))?;
    let files_read = serde_json::to_string(&obs.files_read)
        .map_err(|e| EngramError::Internal(format!("serialize files_read: {e}")))?;
    let files_modified = serde_json::to_string(&obs.files_modified)
        .map_err(|e| EngramError::Internal(format!("serialize files_modified: {e}")))?;

    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO observations
                     (memory_id, session_id, kind, title, subtitle, narrative,
                      facts, concepts, files_read, files_modified,
                      project, prompt_number, created_at, created_epoch, token_cost, favorite)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
                params![
                    obs.memory_id,
                    obs.session_id,
                    obs.kind.as_str(),
                    obs.title,
                    obs.subtitle,
                    obs.narrative,
                    facts,
                    concepts,
                    files_read,
                    files_modified,
                    obs.project,
                    obs.prompt_number,
                    obs.created_at,
                    obs.created_epoch,
                    obs.token_cost,
                    obs.favorite as i64,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(map_tr_err)
}

/// Get one observation by its display handle.
pub async fn get_by_memory_id(
    db: &Database,
    memory_id: &str,
) -> Result<Option<Observation>, EngramError> {
    let memory_id = memory_id.to_string();
    db.connection()
        .call(move |conn| {
            let sql =
                format!("SELECT {OBSERVATION_COLUMNS} FROM observations WHERE memory_id = ?1");
            let mut stmt = conn.prepare(&sql)?;
            match stmt.query_row(params![memory_id], row_to_observation) {
                Ok(obs) => Ok(Some(obs)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Batch retrieval by row id, used after a ranked search.
pub async fn get_by_rowids(db: &Database, ids: &[i64]) -> Result<Vec<Observation>, EngramError> {
    if ids.is_empty() {
        return Ok(vec![]);
    }
    let ids = ids.to_vec();
    db.connection()
        .call(move |conn| {
            let placeholders: Vec<String> = (1..=ids.len()).map(|i| format!("?{i}")).collect();
            let sql = format!(
                "SELECT {OBSERVATION_COLUMNS} FROM observations WHERE id IN ({})",
                placeholders.join(", ")
            );
            let mut stmt = conn.prepare(&sql)?;
            let sql_params: Vec<&dyn rusqlite::types::ToSql> =
                ids.iter().map(|id| id as &dyn rusqlite::types::ToSql).collect();
            let rows = stmt
                .query_map(sql_params.as_slice(), row_to_observation)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
        .map_err(map_tr_err)
}

/// Most recent observations, newest first.
pub async fn recent(db: &Database, limit: usize) -> Result<Vec<Observation>, EngramError> {
    db.connection()
        .call(move |conn| {
            let sql = format!(
                "SELECT {OBSERVATION_COLUMNS} FROM observations
                 ORDER BY created_epoch DESC, id DESC LIMIT ?1"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![limit as i64], row_to_observation)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
        .map_err(map_tr_err)
}

/// Most recent observations for one project, newest first.
pub async fn recent_for_project(
    db: &Database,
    project: &str,
    limit: usize,
) -> Result<Vec<Observation>, EngramError> {
    let project = project.to_string();
    db.connection()
        .call(move |conn| {
            let sql = format!(
                "SELECT {OBSERVATION_COLUMNS} FROM observations WHERE project = ?1
                 ORDER BY created_epoch DESC, id DESC LIMIT ?2"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![project, limit as i64], row_to_observation)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
        .map_err(map_tr_err)
}

/// All observations for one session, oldest first (capture order).
pub async fn for_session(
    db: &Database,
    session_id: &str,
) -> Result<Vec<Observation>, EngramError> {
    let session_id = session_id.to_string();
    db.connection()
        .call(move |conn| {
            let sql = format!(
                "SELECT {OBSERVATION_COLUMNS} FROM observations WHERE session_id = ?1
                 ORDER BY created_epoch ASC, id ASC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![session_id], row_to_observation)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
        .map_err(map_tr_err)
}

/// Full-text match over the shadow index.
///
/// Returns (row id, bm25 score) pairs sorted by relevance. BM25 scores
/// are negative; more negative means more relevant.
pub async fn search_text(
    db: &Database,
    match_query: &str,
    limit: usize,
) -> Result<Vec<(i64, f64)>, EngramError> {
    let match_query = match_query.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT o.id, bm25(observations_fts) AS score
                 FROM observations_fts
                 JOIN observations o ON o.id = observations_fts.rowid
                 WHERE observations_fts MATCH ?1
                 ORDER BY bm25(observations_fts)
                 LIMIT ?2",
            )?;
            let rows = stmt
                .query_map(params![match_query, limit as i64], |row| {
                    Ok((row.get::<_, i64>(0)?, row.get::<_, f64>(1)?))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
        .map_err(map_tr_err)
}

/// Resolve display handles to row ids (for similarity backend merges).
pub async fn rowids_for_memory_ids(
    db: &Database,
    memory_ids: &[String],
) -> Result<Vec<(String, i64)>, EngramError> {
    if memory_ids.is_empty() {
        return Ok(vec![]);
    }
    let memory_ids = memory_ids.to_vec();
    db.connection()
        .call(move |conn| {
            let placeholders: Vec<String> =
                (1..=memory_ids.len()).map(|i| format!("?{i}")).collect();
            let sql = format!(
                "SELECT memory_id, id FROM observations WHERE memory_id IN ({})",
                placeholders.join(", ")
            );
            let mut stmt = conn.prepare(&sql)?;
            let sql_params: Vec<&dyn rusqlite::types::ToSql> = memory_ids
                .iter()
                .map(|id| id as &dyn rusqlite::types::ToSql)
                .collect();
            let rows = stmt
                .query_map(sql_params.as_slice(), |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
        .map_err(map_tr_err)
}

/// Observations for a project captured within the last `days` days.
pub async fn timeline(
    db: &Database,
    project: Option<&str>,
    days: u32,
) -> Result<Vec<Observation>, EngramError> {
    let project = project.map(|p| p.to_string());
    db.connection()
        .call(move |conn| {
            let mut rows = Vec::new();
            match &project {
                Some(project) => {
                    let sql = format!(
                        "SELECT {OBSERVATION_COLUMNS} FROM observations
                         WHERE project = ?1 AND created_epoch >= unixepoch() - ?2 * 86400
                         ORDER BY created_epoch DESC, id DESC"
                    );
                    let mut stmt = conn.prepare(&sql)?;
                    let mapped = stmt.query_map(params![project, days as i64], row_to_observation)?;
                    for row in mapped {
                        rows.push(row?);
                    }
                }
                None => {
                    let sql = format!(
                        "SELECT {OBSERVATION_COLUMNS} FROM observations
                         WHERE created_epoch >= unixepoch() - ?1 * 86400
                         ORDER BY created_epoch DESC, id DESC"
                    );
                    let mut stmt = conn.prepare(&sql)?;
                    let mapped = stmt.query_map(params![days as i64], row_to_observation)?;
                    for row in mapped {
                        rows.push(row?);
                    }
                }
            }
            Ok(rows)
        })
        .await
        .map_err(map_tr_err)
}

/// Every observation, newest first (export path).
pub async fn list_all(db: &Database) -> Result<Vec<Observation>, EngramError> {
    db.connection()
        .call(move |conn| {
            let sql = format!(
                "SELECT {OBSERVATION_COLUMNS} FROM observations
                 ORDER BY created_epoch DESC, id DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([], row_to_observation)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
        .map_err(map_tr_err)
}

/// Total observation count.
pub async fn count_observations(db: &Database) -> Result<i64, EngramError> {
    db.connection()
        .call(|conn| conn.query_row("SELECT count(*) FROM observations", [], |row| row.get(0)))
        .await
        .map_err(map_tr_err)
}

/// Observation counts grouped by kind.
pub async fn counts_by_kind(db: &Database) -> Result<Vec<(String, i64)>, EngramError> {
    db.connection()
        .call(|conn| {
            let mut stmt = conn.prepare(
                "SELECT kind, count(*) FROM observations GROUP BY kind ORDER BY count(*) DESC",
            )?;
            let rows = stmt
                .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
        .map_err(map_tr_err)
}

/// Mark an observation as a favorite with an optional note.
///
/// Favorites are explicit user curation; the capture path never calls
/// this. The favorites row and the denormalized flag are written in one
/// transaction.
pub async fn set_favorite(
    db: &Database,
    memory_id: &str,
    note: Option<&str>,
) -> Result<(), EngramError> {
    db.assert_writable()?;
    let mid = memory_id.to_string();
    let memory_id = memory_id.to_string();
    let note = note.map(|n| n.to_string());
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let id: i64 = tx.query_row(
                "SELECT id FROM observations WHERE memory_id = ?1",
                params![memory_id],
                |row| row.get(0),
            )?;
            tx.execute(
                "INSERT INTO favorites (observation_id, note) VALUES (?1, ?2)
                 ON CONFLICT(observation_id) DO UPDATE SET note = excluded.note",
                params![id, note],
            )?;
            tx.execute(
                "UPDATE observations SET favorite = 1 WHERE id = ?1",
                params![id],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
        .map_err(|e| match e {
            tokio_rusqlite::Error::Error(rusqlite::Error::QueryReturnedNoRows) => {
                EngramError::NotFound(format!("observation {mid}"))
            }
            other => map_tr_err(other),
        })
}

/// Remove favorite status from an observation.
pub async fn unset_favorite(db: &Database, memory_id: &str) -> Result<(), EngramError> {
    db.assert_writable()?;
    let memory_id = memory_id.to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "DELETE FROM favorites WHERE observation_id IN
                     (SELECT id FROM observations WHERE memory_id = ?1)",
                params![memory_id],
            )?;
            tx.execute(
                "UPDATE observations SET favorite = 0 WHERE memory_id = ?1",
                params![memory_id],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Delete observations strictly older than `cutoff_epoch`.
///
/// Favorites and observations carrying the `archived` tag are exempt.
/// Returns the number of rows removed; FTS rows and associations go
/// with them via triggers and cascades.
pub async fn prune_older_than(db: &Database, cutoff_epoch: i64) -> Result<u64, EngramError> {
    db.assert_writable()?;
    db.connection()
        .call(move |conn| {
            let removed = conn.execute(
                "DELETE FROM observations
                 WHERE created_epoch < ?1
                   AND favorite = 0
                   AND id NOT IN (
                       SELECT ot.observation_id FROM observation_tags ot
                       JOIN tags t ON t.id = ot.tag_id
                       WHERE t.name = 'archived')",
                params![cutoff_epoch],
            )?;
            Ok(removed as u64)
        })
        .await
        .map_err(map_tr_err)
}

/// Enforce the observation-count ceiling.
///
/// Deletes the oldest non-favorite, non-`archived` observations until
/// the total count is at or below `ceiling`. Returns rows removed.
pub async fn enforce_ceiling(db: &Database, ceiling: u64) -> Result<u64, EngramError> {
    db.assert_writable()?;
    db.connection()
        .call(move |conn| {
            let total: i64 =
                conn.query_row("SELECT count(*) FROM observations", [], |row| row.get(0))?;
            let excess = total - ceiling as i64;
            if excess <= 0 {
                return Ok(0);
            }
            let removed = conn.execute(
                "DELETE FROM observations WHERE id IN (
                     SELECT id FROM observations
                     WHERE favorite = 0
                       AND id NOT IN (
                           SELECT ot.observation_id FROM observation_tags ot
                           JOIN tags t ON t.id = ot.tag_id
                           WHERE t.name = 'archived')
                     ORDER BY created_epoch ASC, id ASC
                     LIMIT ?1)",
                params![excess],
            )?;
            Ok(removed as u64)
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::database::Database;
    use crate::queries::sessions;

    pub(crate) fn make_observation(memory_id: &str, title: &str) -> Observation {
        Observation {
            id: 0,
            memory_id: memory_id.to_string(),
            session_id: "sess-1".to_string(),
            kind: ObservationKind::Learning,
            title: title.to_string(),
            subtitle: None,
            narrative: format!("{title} narrative"),
            facts: vec!["fact one".to_string()],
            concepts: vec!["testing".to_string()],
            files_read: vec![],
            files_modified: vec![],
            project: "engram".to_string(),
            prompt_number: 1,
            created_at: "2026-08-01T00:00:00.000Z".to_string(),
            created_epoch: 1_754_006_400,
            token_cost: 8,
            favorite: false,
        }
    }

    async fn setup() -> Database {
        let db = Database::open_in_memory().await.unwrap();
        sessions::open_session(&db, "sess-1", "engram").await.unwrap();
        db
    }

    #[tokio::test]
    async fn insert_and_get_round_trips_json_lists() {
        let db = setup().await;
        let obs = make_observation("mem-1", "Borrow checker lesson");
        insert_observation(&db, &obs).await.unwrap();

        let got = get_by_memory_id(&db, "mem-1").await.unwrap().unwrap();
        assert_eq!(got.title, "Borrow checker lesson");
        assert_eq!(got.facts, vec!["fact one".to_string()]);
        assert_eq!(got.concepts, vec!["testing".to_string()]);
        assert_eq!(got.kind, ObservationKind::Learning);
    }

    #[tokio::test]
    async fn fts_trigger_indexes_inserted_rows() {
        let db = setup().await;
        let obs = make_observation("mem-1", "The retry queue uses linear backoff");
        insert_observation(&db, &obs).await.unwrap();

        let hits = search_text(&db, "\"linear\" \"backoff\"", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        db.verify_shadow_index().await.unwrap();
    }

    #[tokio::test]
    async fn fts_indexes_facts_and_concepts() {
        let db = setup().await;
        let mut obs = make_observation("mem-1", "Plain title");
        obs.facts = vec!["uses sqlite wal journaling".to_string()];
        insert_observation(&db, &obs).await.unwrap();

        let hits = search_text(&db, "\"journaling\"", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn cascade_delete_leaves_no_orphans() {
        let db = setup().await;
        insert_observation(&db, &make_observation("mem-1", "First")).await.unwrap();
        insert_observation(&db, &make_observation("mem-2", "Second")).await.unwrap();
        set_favorite(&db, "mem-1", Some("keep")).await.unwrap();
        crate::queries::tags::tag_observation(&db, "mem-2", "rust").await.unwrap();

        let removed = sessions::delete_session(&db, "sess-1").await.unwrap();
        assert_eq!(removed, 2);

        assert_eq!(count_observations(&db).await.unwrap(), 0);
        let orphans: i64 = db
            .connection()
            .call(|conn| {
                conn.query_row(
                    "SELECT (SELECT count(*) FROM favorites)
                          + (SELECT count(*) FROM observation_tags)",
                    [],
                    |row| row.get(0),
                )
            })
            .await
            .unwrap();
        assert_eq!(orphans, 0, "cascade must remove favorites and tag links");
        db.verify_shadow_index().await.unwrap();
    }

    #[tokio::test]
    async fn prune_respects_cutoff_and_exemptions() {
        let db = setup().await;
        let mut old = make_observation("mem-old", "Old fact");
        old.created_epoch = 100;
        let mut old_favorite = make_observation("mem-fav", "Old favorite");
        old_favorite.created_epoch = 100;
        let mut fresh = make_observation("mem-new", "Fresh fact");
        fresh.created_epoch = 1_000_000;

        insert_observation(&db, &old).await.unwrap();
        insert_observation(&db, &old_favorite).await.unwrap();
        insert_observation(&db, &fresh).await.unwrap();
        set_favorite(&db, "mem-fav", None).await.unwrap();

        let removed = prune_older_than(&db, 500_000).await.unwrap();
        assert_eq!(removed, 1, "only the old non-favorite goes");
        assert!(get_by_memory_id(&db, "mem-old").await.unwrap().is_none());
        assert!(get_by_memory_id(&db, "mem-fav").await.unwrap().is_some());
        assert!(get_by_memory_id(&db, "mem-new").await.unwrap().is_some());
        db.verify_shadow_index().await.unwrap();
    }

    #[tokio::test]
    async fn archived_tag_exempts_from_prune() {
        let db = setup().await;
        let mut old = make_observation("mem-arch", "Archived fact");
        old.created_epoch = 100;
        insert_observation(&db, &old).await.unwrap();
        crate::queries::tags::tag_observation(&db, "mem-arch", "archived").await.unwrap();

        let removed = prune_older_than(&db, 500_000).await.unwrap();
        assert_eq!(removed, 0);
        assert!(get_by_memory_id(&db, "mem-arch").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn ceiling_removes_oldest_first() {
        let db = setup().await;
        for i in 0..5 {
            let mut obs = make_observation(&format!("mem-{i}"), &format!("Fact {i}"));
            obs.created_epoch = 1000 + i;
            insert_observation(&db, &obs).await.unwrap();
        }

        let removed = enforce_ceiling(&db, 3).await.unwrap();
        assert_eq!(removed, 2);
        assert!(get_by_memory_id(&db, "mem-0").await.unwrap().is_none());
        assert!(get_by_memory_id(&db, "mem-1").await.unwrap().is_none());
        assert!(get_by_memory_id(&db, "mem-4").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn ceiling_noop_when_under() {
        let db = setup().await;
        insert_observation(&db, &make_observation("mem-1", "Only one")).await.unwrap();
        let removed = enforce_ceiling(&db, 10).await.unwrap();
        assert_eq!(removed, 0);
    }

    #[tokio::test]
    async fn recent_orders_newest_first() {
        let db = setup().await;
        for i in 0..3 {
            let mut obs = make_observation(&format!("mem-{i}"), &format!("Fact {i}"));
            obs.created_epoch = 1000 + i;
            insert_observation(&db, &obs).await.unwrap();
        }
        let rows = recent(&db, 2).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].memory_id, "mem-2");
        assert_eq!(rows[1].memory_id, "mem-1");
    }

    #[tokio::test]
    async fn favorite_on_unknown_observation_is_not_found() {
        let db = setup().await;
        let err = set_favorite(&db, "ghost", None).await.unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }
}
