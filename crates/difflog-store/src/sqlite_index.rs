//! SQLite-backed relation index

use crate::db::Database;
use crate::errors::{from_rusqlite, Result};
use difflog_core::entity::EntityRef;
use difflog_core::index::{IndexEntry, RelationIndex};
use rusqlite::params;

/// Relation index persisted in the `diff_relations` table
#[derive(Debug, Clone)]
pub struct SqliteIndex {
    db: Database,
}

impl SqliteIndex {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

impl RelationIndex for SqliteIndex {
    fn record(&self, entry: &IndexEntry) -> Result<()> {
        self.db.with_conn("index_record", |conn| {
            conn.execute(
                "INSERT INTO diff_relations
                    (subject_kind, subject_id, trigger_kind, trigger_id, member, score, seq)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, (SELECT COALESCE(MAX(seq), 0) + 1 FROM diff_relations))
                 ON CONFLICT(subject_kind, subject_id, member) DO UPDATE SET
                    trigger_kind = excluded.trigger_kind,
                    trigger_id = excluded.trigger_id,
                    score = excluded.score,
                    seq = excluded.seq",
                params![
                    entry.subject.kind,
                    entry.subject.id,
                    entry.trigger.kind,
                    entry.trigger.id,
                    entry.member,
                    entry.score
                ],
            )
            .map_err(from_rusqlite)?;
            Ok(())
        })
    }

    fn related(&self, entity: &EntityRef) -> Result<Vec<IndexEntry>> {
        self.db.with_conn("index_related", |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT subject_kind, subject_id, trigger_kind, trigger_id, member, score
                     FROM diff_relations
                     WHERE (subject_kind = ?1 AND subject_id = ?2)
                        OR (trigger_kind = ?1 AND trigger_id = ?2)
                     ORDER BY score ASC, seq ASC",
                )
                .map_err(from_rusqlite)?;
            let rows = stmt
                .query_map(params![entity.kind, entity.id], |row| {
                    Ok(IndexEntry {
                        subject: EntityRef::new(row.get::<_, String>(0)?, row.get::<_, String>(1)?),
                        trigger: EntityRef::new(row.get::<_, String>(2)?, row.get::<_, String>(3)?),
                        member: row.get(4)?,
                        score: row.get(5)?,
                    })
                })
                .map_err(from_rusqlite)?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(from_rusqlite)?;
            Ok(rows)
        })
    }

    fn remove_scored_below(&self, max_score: f64) -> Result<u64> {
        self.db.with_conn("index_remove_scored_below", |conn| {
            let removed = conn
                .execute(
                    "DELETE FROM diff_relations WHERE score >= 0 AND score <= ?1",
                    [max_score],
                )
                .map_err(from_rusqlite)?;
            Ok(removed as u64)
        })
    }
}
