// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! User-curated tags and their observation associations.

use engram_core::EngramError;
use rusqlite::params;

use crate::database::{Database, map_tr_err};
use crate::models::Tag;

/// Create a tag if it does not exist yet. Returns its row id.
pub async fn ensure_tag(db: &Database, name: &str) -> Result<i64, EngramError> {
    db.assert_writable()?;
    if name.trim().is_empty() {
        return Err(EngramError::Validation("tag name must not be empty".into()));
    }
    let name = name.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO tags (name) VALUES (?1) ON CONFLICT(name) DO NOTHING",
                params![name],
            )?;
            conn.query_row(
                "SELECT id FROM tags WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
        })
        .await
        .map_err(map_tr_err)
}

/// Attach a tag to an observation, creating the tag if needed.
pub async fn tag_observation(
    db: &Database,
    memory_id: &str,
    tag_name: &str,
) -> Result<(), EngramError> {
    let tag_id = ensure_tag(db, tag_name).await?;
    let mid = memory_id.to_string();
    let memory_id = memory_id.to_string();
    db.connection()
        .call(move |conn| {
            let obs_id: i64 = conn.query_row(
                "SELECT id FROM observations WHERE memory_id = ?1",
                params![memory_id],
                |row| row.get(0),
            )?;
            conn.execute(
                "INSERT INTO observation_tags (observation_id, tag_id)
                 VALUES (?1, ?2)
                 ON CONFLICT(observation_id, tag_id) DO NOTHING",
                params![obs_id, tag_id],
            )?;
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

/// Detach a tag from an observation. No-op if the link is absent.
pub async fn untag_observation(
    db: &Database,
    memory_id: &str,
    tag_name: &str,
) -> Result<(), EngramError> {
    db.assert_writable()?;
    let memory_id = memory_id.to_string();
    let tag_name = tag_name.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "DELETE FROM observation_tags
                 WHERE observation_id IN
                       (SELECT id FROM observations WHERE memory_id = ?1)
                   AND tag_id IN (SELECT id FROM tags WHERE name = ?2)",
                params![memory_id, tag_name],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Tags attached to an observation, alphabetical.
pub async fn tags_for_observation(
    db: &Database,
    memory_id: &str,
) -> Result<Vec<Tag>, EngramError> {
    let memory_id = memory_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT t.id, t.name, t.color, t.description
                 FROM tags t
                 JOIN observation_tags ot ON ot.tag_id = t.id
                 JOIN observations o ON o.id = ot.observation_id
                 WHERE o.memory_id = ?1
                 ORDER BY t.name ASC",
            )?;
            let rows = stmt
                .query_map(params![memory_id], |row| {
                    Ok(Tag {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        color: row.get(2)?,
                        description: row.get(3)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;
    use crate::queries::observations::tests::make_observation;
    use crate::queries::{observations, sessions};

    async fn setup() -> Database {
        let db = Database::open_in_memory().await.unwrap();
        sessions::open_session(&db, "sess-1", "engram").await.unwrap();
        observations::insert_observation(&db, &make_observation("mem-1", "Tagged fact"))
            .await
            .unwrap();
        db
    }

    #[tokio::test]
    async fn tagging_is_idempotent() {
        let db = setup().await;
        tag_observation(&db, "mem-1", "rust").await.unwrap();
        tag_observation(&db, "mem-1", "rust").await.unwrap();

        let tags = tags_for_observation(&db, "mem-1").await.unwrap();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].name, "rust");
    }

    #[tokio::test]
    async fn untag_removes_only_the_link() {
        let db = setup().await;
        tag_observation(&db, "mem-1", "rust").await.unwrap();
        untag_observation(&db, "mem-1", "rust").await.unwrap();

        assert!(tags_for_observation(&db, "mem-1").await.unwrap().is_empty());
        // The tag itself stays for reuse.
        let tag_id = ensure_tag(&db, "rust").await.unwrap();
        assert!(tag_id > 0);
    }

    #[tokio::test]
    async fn empty_tag_name_rejected() {
        let db = setup().await;
        let err = ensure_tag(&db, "  ").await.unwrap_err();
        assert_eq!(err.kind(), "validation");
    }

    #[tokio::test]
    async fn tagging_unknown_observation_is_not_found() {
        let db = setup().await;
        let err = tag_observation(&db, "ghost", "rust").await.unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }
}
