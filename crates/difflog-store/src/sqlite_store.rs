//! SQLite-backed sorted-set store
//!
//! Each key has a row in `ts_keys` recording whether it holds a sorted set or
//! a plain value; sorted-set members live in `ts_members`. Every operation
//! runs under the shared connection lock, and writes run in a transaction.

use crate::db::Database;
use crate::errors::{from_rusqlite, Result};
use difflog_core::errors::key_type_mismatch;
use difflog_core::store::{
    resolve_range, Order, ScanCursor, ScanPage, ScoredMember, TimeSeriesStore,
};
use rusqlite::{params, Connection, OptionalExtension};

const ZSET: &str = "zset";

/// Sorted-set store persisted in SQLite
#[derive(Debug, Clone)]
pub struct SqliteStore {
    db: Database,
}

impl SqliteStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Store a plain value under `key`, replacing whatever was there.
    pub fn set_scalar(&self, key: &str, value: &[u8]) -> Result<()> {
        self.db.with_conn("set_scalar", |conn| {
            let tx = conn.transaction().map_err(from_rusqlite)?;
            tx.execute("DELETE FROM ts_members WHERE key = ?1", [key])
                .map_err(from_rusqlite)?;
            tx.execute(
                "INSERT INTO ts_keys (key, key_type, scalar_value) VALUES (?1, 'string', ?2)
                 ON CONFLICT(key) DO UPDATE SET key_type = 'string', scalar_value = excluded.scalar_value",
                params![key, value],
            )
            .map_err(from_rusqlite)?;
            tx.commit().map_err(from_rusqlite)
        })
    }

    /// Number of members under `key` (0 for missing or scalar keys)
    pub fn card(&self, key: &str) -> Result<usize> {
        self.db.with_conn("card", |conn| {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM ts_members WHERE key = ?1",
                    [key],
                    |row| row.get(0),
                )
                .map_err(from_rusqlite)?;
            Ok(count as usize)
        })
    }
}

fn key_type(conn: &Connection, key: &str) -> Result<Option<String>> {
    conn.query_row(
        "SELECT key_type FROM ts_keys WHERE key = ?1",
        [key],
        |row| row.get(0),
    )
    .optional()
    .map_err(from_rusqlite)
}

/// Fails with `KeyTypeMismatch` for scalar keys; `false` for missing keys.
fn ensure_sorted(conn: &Connection, op: &str, key: &str) -> Result<bool> {
    match key_type(conn, key)?.as_deref() {
        None => Ok(false),
        Some(ZSET) => Ok(true),
        Some(_) => Err(key_type_mismatch(op, key)),
    }
}

fn delete_if_empty(conn: &Connection, key: &str) -> Result<()> {
    conn.execute(
        "DELETE FROM ts_keys WHERE key = ?1
         AND NOT EXISTS (SELECT 1 FROM ts_members WHERE key = ?1)",
        [key],
    )
    .map_err(from_rusqlite)?;
    Ok(())
}

impl TimeSeriesStore for SqliteStore {
    fn append(&self, key: &str, member: &[u8], score: f64) -> Result<bool> {
        self.db.with_conn("append", |conn| {
            let tx = conn.transaction().map_err(from_rusqlite)?;
            if !ensure_sorted(&tx, "append", key)? {
                tx.execute(
                    "INSERT INTO ts_keys (key, key_type) VALUES (?1, 'zset')",
                    [key],
                )
                .map_err(from_rusqlite)?;
            }

            let existed = tx
                .query_row(
                    "SELECT 1 FROM ts_members WHERE key = ?1 AND member = ?2",
                    params![key, member],
                    |_| Ok(()),
                )
                .optional()
                .map_err(from_rusqlite)?
                .is_some();

            tx.execute(
                "INSERT INTO ts_members (key, member, score, seq)
                 VALUES (?1, ?2, ?3, (SELECT COALESCE(MAX(seq), 0) + 1 FROM ts_members))
                 ON CONFLICT(key, member) DO UPDATE SET score = excluded.score, seq = excluded.seq",
                params![key, member, score],
            )
            .map_err(from_rusqlite)?;
            tx.commit().map_err(from_rusqlite)?;

            tracing::debug!(key, existed, "sqlite append");
            Ok(!existed)
        })
    }

    fn range(
        &self,
        key: &str,
        start: isize,
        stop: isize,
        order: Order,
    ) -> Result<Vec<ScoredMember>> {
        self.db.with_conn("range", |conn| {
            if !ensure_sorted(conn, "range", key)? {
                return Ok(Vec::new());
            }
            let len: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM ts_members WHERE key = ?1",
                    [key],
                    |row| row.get(0),
                )
                .map_err(from_rusqlite)?;
            let Some((first, last)) = resolve_range(len as usize, start, stop) else {
                return Ok(Vec::new());
            };

            let sql = match order {
                Order::Ascending => {
                    "SELECT member, score FROM ts_members WHERE key = ?1
                     ORDER BY score ASC, seq ASC LIMIT ?2 OFFSET ?3"
                }
                Order::Descending => {
                    "SELECT member, score FROM ts_members WHERE key = ?1
                     ORDER BY score DESC, seq DESC LIMIT ?2 OFFSET ?3"
                }
            };
            let mut stmt = conn.prepare(sql).map_err(from_rusqlite)?;
            let rows = stmt
                .query_map(
                    params![key, (last - first + 1) as i64, first as i64],
                    |row| {
                        Ok(ScoredMember {
                            member: row.get(0)?,
                            score: row.get(1)?,
                        })
                    },
                )
                .map_err(from_rusqlite)?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(from_rusqlite)?;
            Ok(rows)
        })
    }

    fn remove(&self, key: &str, member: &[u8]) -> Result<bool> {
        self.db.with_conn("remove", |conn| {
            let tx = conn.transaction().map_err(from_rusqlite)?;
            if !ensure_sorted(&tx, "remove", key)? {
                return Ok(false);
            }

            let removed = tx
                .execute(
                    "DELETE FROM ts_members WHERE key = ?1 AND member = ?2",
                    params![key, member],
                )
                .map_err(from_rusqlite)?;
            delete_if_empty(&tx, key)?;
            tx.commit().map_err(from_rusqlite)?;

            Ok(removed > 0)
        })
    }

    fn remove_scored_below(&self, key: &str, max_score: f64) -> Result<u64> {
        self.db.with_conn("remove_scored_below", |conn| {
            let tx = conn.transaction().map_err(from_rusqlite)?;
            if !ensure_sorted(&tx, "remove_scored_below", key)? {
                return Ok(0);
            }

            let removed = tx
                .execute(
                    "DELETE FROM ts_members WHERE key = ?1 AND score >= 0 AND score <= ?2",
                    params![key, max_score],
                )
                .map_err(from_rusqlite)?;
            delete_if_empty(&tx, key)?;
            tx.commit().map_err(from_rusqlite)?;

            Ok(removed as u64)
        })
    }

    fn scan_page(&self, prefix: &str, cursor: &ScanCursor, count: usize) -> Result<ScanPage> {
        let after = match cursor {
            ScanCursor::Start => None,
            ScanCursor::Resume(key) => Some(key.as_str()),
        };

        self.db.with_conn("scan_page", |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT key FROM ts_keys
                     WHERE (?1 IS NULL OR key > ?1) AND substr(key, 1, length(?2)) = ?2
                     ORDER BY key LIMIT ?3",
                )
                .map_err(from_rusqlite)?;
            let mut keys = stmt
                .query_map(params![after, prefix, (count + 1) as i64], |row| row.get(0))
                .map_err(from_rusqlite)?
                .collect::<std::result::Result<Vec<String>, _>>()
                .map_err(from_rusqlite)?;

            let next = if keys.len() > count {
                keys.truncate(count);
                keys.last().cloned().map(ScanCursor::Resume)
            } else {
                None
            };
            Ok(ScanPage { keys, next })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use difflog_core::ExErrorKind;

    fn store() -> SqliteStore {
        SqliteStore::new(Database::open_in_memory().unwrap())
    }

    fn members(items: &[ScoredMember]) -> Vec<&[u8]> {
        items.iter().map(|m| m.member.as_slice()).collect()
    }

    #[test]
    fn test_append_reports_new_members() {
        let store = store();
        assert!(store.append("k", b"a", 1.0).unwrap());
        assert!(!store.append("k", b"a", 5.0).unwrap());
        assert_eq!(store.card("k").unwrap(), 1);
        assert_eq!(store.max_score("k").unwrap(), Some(5.0));
    }

    #[test]
    fn test_range_orders_and_slices() {
        let store = store();
        store.append("k", b"c", 3.0).unwrap();
        store.append("k", b"a", 1.0).unwrap();
        store.append("k", b"b", 2.0).unwrap();

        let asc = store.range("k", 0, -1, Order::Ascending).unwrap();
        assert_eq!(members(&asc), vec![b"a", b"b", b"c"]);
        let desc = store.range("k", 0, 0, Order::Descending).unwrap();
        assert_eq!(members(&desc), vec![b"c"]);
        let last_two = store.range("k", -2, -1, Order::Ascending).unwrap();
        assert_eq!(members(&last_two), vec![b"b", b"c"]);
        assert!(store.range("missing", 0, -1, Order::Ascending).unwrap().is_empty());
    }

    #[test]
    fn test_equal_scores_keep_insertion_order() {
        let store = store();
        store.append("k", b"z", 1.0).unwrap();
        store.append("k", b"a", 1.0).unwrap();
        let asc = store.range("k", 0, -1, Order::Ascending).unwrap();
        assert_eq!(members(&asc), vec![b"z", b"a"]);
    }

    #[test]
    fn test_remove_deletes_emptied_key() {
        let store = store();
        store.append("k", b"a", 1.0).unwrap();
        store.append("k", b"b", 2.0).unwrap();

        assert_eq!(store.remove_scored_below("k", 1.0).unwrap(), 1);
        assert_eq!(store.remove_scored_below("k", 2.0).unwrap(), 1);
        let page = store.scan_page("", &ScanCursor::Start, 10).unwrap();
        assert!(page.keys.is_empty());
    }

    #[test]
    fn test_remove_member_deletes_emptied_key() {
        let store = store();
        store.append("k", b"a", 1.0).unwrap();

        assert!(!store.remove("k", b"other").unwrap());
        assert!(store.remove("k", b"a").unwrap());
        assert!(!store.remove("missing", b"a").unwrap());
        let page = store.scan_page("", &ScanCursor::Start, 10).unwrap();
        assert!(page.keys.is_empty());
    }

    #[test]
    fn test_scalar_key_rejects_sorted_operations() {
        let store = store();
        store.append("k", b"a", 1.0).unwrap();
        store.set_scalar("k", b"plain").unwrap();

        assert_eq!(store.card("k").unwrap(), 0);
        for err in [
            store.append("k", b"b", 1.0).unwrap_err(),
            store.range("k", 0, -1, Order::Ascending).unwrap_err(),
            store.remove_scored_below("k", 10.0).unwrap_err(),
            store.remove("k", b"a").unwrap_err(),
        ] {
            assert_eq!(err.kind(), ExErrorKind::KeyTypeMismatch);
        }
    }

    #[test]
    fn test_scan_pages_under_prefix() {
        let store = store();
        for key in ["a-1", "b-1", "b-2", "b-3", "c-1"] {
            store.append(key, b"m", 1.0).unwrap();
        }

        let first = store.scan_page("b-", &ScanCursor::Start, 2).unwrap();
        assert_eq!(first.keys, vec!["b-1", "b-2"]);
        let next = first.next.unwrap();
        let second = store.scan_page("b-", &next, 2).unwrap();
        assert_eq!(second.keys, vec!["b-3"]);
        assert_eq!(second.next, None);
    }
}
