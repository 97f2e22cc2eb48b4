//! Redis sorted-set store
//!
//! Each store operation is a single Redis command, so every operation is
//! atomic at the server. Members with equal scores follow Redis's own order
//! (lexicographic member bytes).
//!
//! One connection is opened on first use and reused by every operation on
//! the store and its clones. A connection that fails at the transport level
//! is dropped and the next operation reconnects.

use crate::errors::{from_redis, Result};
use difflog_core::errors::{lock_poisoned, ExError, ExErrorKind};
use difflog_core::store::{Order, ScanCursor, ScanPage, ScoredMember, TimeSeriesStore};
use std::sync::{Arc, Mutex};

/// Sorted-set store on a Redis server
#[derive(Clone)]
pub struct RedisStore {
    client: redis::Client,
    conn: Arc<Mutex<Option<redis::Connection>>>,
}

impl RedisStore {
    /// Build a store for `url` (`redis://host:port/db`); no connection is made yet.
    pub fn open(url: &str) -> Result<Self> {
        let client = redis::Client::open(url).map_err(|e| {
            ExError::new(ExErrorKind::InvalidConfig)
                .with_op("redis_open")
                .with_message(format!("invalid redis url {}: {}", url, e))
        })?;
        Ok(Self {
            client,
            conn: Arc::new(Mutex::new(None)),
        })
    }

    /// True once a connection has been established and not dropped since
    pub fn is_connected(&self) -> bool {
        self.conn.lock().map(|slot| slot.is_some()).unwrap_or(false)
    }

    /// Run one command on the shared connection, connecting first if needed
    fn with_conn<T>(
        &self,
        op: &str,
        key: Option<&str>,
        f: impl FnOnce(&mut redis::Connection) -> redis::RedisResult<T>,
    ) -> Result<T> {
        let mut slot = self.conn.lock().map_err(|_| lock_poisoned(op))?;
        let mut con = match slot.take() {
            Some(con) => con,
            None => {
                let con = self
                    .client
                    .get_connection()
                    .map_err(|e| from_redis(op, None, e))?;
                tracing::debug!(op, "redis connection opened");
                con
            }
        };

        let result = f(&mut con);
        match &result {
            Err(e) if is_transport_failure(e) => {
                tracing::debug!(op, "dropping failed redis connection");
            }
            _ => *slot = Some(con),
        }
        result.map_err(|e| from_redis(op, key, e))
    }
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("client", &self.client)
            .finish_non_exhaustive()
    }
}

fn is_transport_failure(err: &redis::RedisError) -> bool {
    err.is_io_error() || err.is_connection_dropped() || err.is_timeout()
}

impl TimeSeriesStore for RedisStore {
    fn append(&self, key: &str, member: &[u8], score: f64) -> Result<bool> {
        let added: i64 = self.with_conn("append", Some(key), |con| {
            redis::cmd("ZADD").arg(key).arg(score).arg(member).query(con)
        })?;
        Ok(added > 0)
    }

    fn range(
        &self,
        key: &str,
        start: isize,
        stop: isize,
        order: Order,
    ) -> Result<Vec<ScoredMember>> {
        let command = match order {
            Order::Ascending => "ZRANGE",
            Order::Descending => "ZREVRANGE",
        };
        let rows: Vec<(Vec<u8>, f64)> = self.with_conn("range", Some(key), |con| {
            redis::cmd(command)
                .arg(key)
                .arg(start)
                .arg(stop)
                .arg("WITHSCORES")
                .query(con)
        })?;
        Ok(rows
            .into_iter()
            .map(|(member, score)| ScoredMember { member, score })
            .collect())
    }

    fn remove(&self, key: &str, member: &[u8]) -> Result<bool> {
        let removed: i64 = self.with_conn("remove", Some(key), |con| {
            redis::cmd("ZREM").arg(key).arg(member).query(con)
        })?;
        Ok(removed > 0)
    }

    fn remove_scored_below(&self, key: &str, max_score: f64) -> Result<u64> {
        self.with_conn("remove_scored_below", Some(key), |con| {
            redis::cmd("ZREMRANGEBYSCORE")
                .arg(key)
                .arg(0)
                .arg(max_score)
                .query(con)
        })
    }

    fn scan_page(&self, prefix: &str, cursor: &ScanCursor, count: usize) -> Result<ScanPage> {
        let position = match cursor {
            ScanCursor::Start => "0",
            ScanCursor::Resume(position) => position.as_str(),
        };
        let (next, keys): (String, Vec<String>) = self.with_conn("scan_page", None, |con| {
            redis::cmd("SCAN")
                .arg(position)
                .arg("MATCH")
                .arg(match_pattern(prefix))
                .arg("COUNT")
                .arg(count)
                .query(con)
        })?;

        let next = (next != "0").then_some(ScanCursor::Resume(next));
        Ok(ScanPage { keys, next })
    }
}

/// `MATCH` pattern selecting keys that start with `prefix` literally
fn match_pattern(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('*');
    pattern
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_pattern_escapes_glob_characters() {
        assert_eq!(match_pattern(""), "*");
        assert_eq!(match_pattern("diffs:"), "diffs:*");
        assert_eq!(match_pattern("a*b?[c]\\"), "a\\*b\\?\\[c\\]\\\\*");
    }

    #[test]
    fn test_open_rejects_malformed_url() {
        let err = RedisStore::open("not a url").unwrap_err();
        assert_eq!(err.kind(), ExErrorKind::InvalidConfig);
    }

    #[test]
    fn test_unreachable_server_is_unavailable() {
        // Port 1 on loopback refuses connections
        let store = RedisStore::open("redis://127.0.0.1:1/0").unwrap();
        let err = store.append("k", b"m", 1.0).unwrap_err();
        assert_eq!(err.kind(), ExErrorKind::StoreUnavailable);
        assert!(!store.is_connected());
    }

    #[test]
    fn test_open_defers_connection() {
        let store = RedisStore::open("redis://127.0.0.1:1/0").unwrap();
        assert!(!store.is_connected());
        let clone = store.clone();
        assert!(Arc::ptr_eq(&store.conn, &clone.conn));
    }
}
