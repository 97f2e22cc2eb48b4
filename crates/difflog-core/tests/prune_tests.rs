// Integration tests for retention pruning

use chrono::{DateTime, Duration, TimeZone, Utc};
use difflog_core::pruner::min_age_timestamp;
use difflog_core::record::precise_timestamp;
use difflog_core::store::KeyScan;
use difflog_core::{
    DiffLog, DiffsConfig, ExError, ExErrorKind, KeyOutcome, MemoryIndex, MemoryStore, Order,
    Pruner, Registry, Result, ScanCursor, ScanPage, ScoredMember, TimeSeriesStore,
};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn now() -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000, 0).unwrap()
}

fn minutes_ago(minutes: i64) -> f64 {
    precise_timestamp(now() - Duration::minutes(minutes))
}

#[test]
fn test_prune_boundary_with_default_age() {
    // Given: diffs at T-2h, T-61m, T-59m and T
    let store = Arc::new(MemoryStore::new());
    let log = DiffLog::new("testmodel", store.clone(), &DiffsConfig::default());
    for (i, minutes) in [120, 61, 59, 0].iter().enumerate() {
        log.create(json!({"i": i}), i == 0, "1", Some(minutes_ago(*minutes)))
            .unwrap();
    }

    // When: pruning at T with the default retention
    let report = Pruner::new(store.clone(), "")
        .prune_at(now(), DiffsConfig::default().max_element_age)
        .unwrap();

    // Then: exactly the two expired diffs are gone
    assert_eq!(report.total_removed(), 2);
    let remaining = log.get_for_entity("1").unwrap();
    assert_eq!(remaining.len(), 2);
    assert_eq!(remaining[0].timestamp, minutes_ago(59));
    assert_eq!(remaining[1].timestamp, minutes_ago(0));
}

#[test]
fn test_old_element_removed_fresh_kept() {
    let store = Arc::new(MemoryStore::new());
    store.append("test", b"one", precise_timestamp(now())).unwrap();
    store
        .append(
            "test",
            b"two",
            precise_timestamp(now() - Duration::seconds(3601)),
        )
        .unwrap();

    Pruner::new(store.clone(), "").prune_at(now(), 3600).unwrap();
    assert_eq!(store.card("test").unwrap(), 1);
}

#[test]
fn test_non_sorted_set_key_is_reported_not_raised() {
    let store = Arc::new(MemoryStore::new());
    store.set_scalar("test", b"value").unwrap();
    store.append("widget-1", b"old", minutes_ago(90)).unwrap();
    store.append("widget-2", b"old", minutes_ago(90)).unwrap();

    let report = Pruner::new(store.clone(), "").prune_at(now(), 3600).unwrap();

    let failures: Vec<_> = report.failures().collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0, "test");
    assert_eq!(failures[0].1.kind(), ExErrorKind::KeyTypeMismatch);
    assert_eq!(report.total_removed(), 2);
}

#[test]
fn test_report_threshold_matches_clock() {
    let store = Arc::new(MemoryStore::new());
    let report = Pruner::new(store, "").prune_at(now(), 60).unwrap();
    assert_eq!(report.min_age_timestamp, min_age_timestamp(now(), 60));
    assert!(report.outcomes.is_empty());
    assert_eq!(report.index_removed, None);
}

#[test]
fn test_registry_pruner_expires_index_rows() {
    let store = Arc::new(MemoryStore::new());
    let config = DiffsConfig {
        key_prefix: "diffs:".to_string(),
        ..DiffsConfig::default()
    };
    let mut registry = Registry::new(store.clone(), config).with_index(Arc::new(MemoryIndex::new()));
    let log = registry.register("widget", "Widget").unwrap();

    log.create(json!({"v": 1}), true, "1", Some(minutes_ago(120))).unwrap();
    log.create(json!({"v": 2}), false, "1", Some(minutes_ago(1))).unwrap();
    store.append("unrelated", b"old", minutes_ago(120)).unwrap();

    let report = registry.pruner().prune_at(now(), 3600).unwrap();

    assert_eq!(report.index_removed, Some(1));
    assert_eq!(log.get_all_for_entity("1").unwrap().len(), 1);
    assert!(matches!(
        report.outcome_for("unrelated"),
        Some(KeyOutcome::Skipped { .. })
    ));
    assert_eq!(store.card("unrelated").unwrap(), 1);
}

/// Memory store whose scan fails on one page request
struct FailingScan {
    inner: MemoryStore,
    fail_on_call: usize,
    calls: AtomicUsize,
}

impl FailingScan {
    fn new(fail_on_call: usize) -> Self {
        Self {
            inner: MemoryStore::new(),
            fail_on_call,
            calls: AtomicUsize::new(0),
        }
    }
}

impl TimeSeriesStore for FailingScan {
    fn append(&self, key: &str, member: &[u8], score: f64) -> Result<bool> {
        self.inner.append(key, member, score)
    }

    fn range(&self, key: &str, start: isize, stop: isize, order: Order) -> Result<Vec<ScoredMember>> {
        self.inner.range(key, start, stop, order)
    }

    fn remove(&self, key: &str, member: &[u8]) -> Result<bool> {
        self.inner.remove(key, member)
    }

    fn remove_scored_below(&self, key: &str, max_score: f64) -> Result<u64> {
        self.inner.remove_scored_below(key, max_score)
    }

    fn scan_page(&self, prefix: &str, cursor: &ScanCursor, count: usize) -> Result<ScanPage> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call == self.fail_on_call {
            return Err(ExError::new(ExErrorKind::StoreUnavailable).with_op("scan_page"));
        }
        self.inner.scan_page(prefix, cursor, count)
    }
}

#[test]
fn test_interrupted_scan_returns_progress_and_cursor() {
    // Given: four expired keys and a store that drops out on the second page
    let store = Arc::new(FailingScan::new(2));
    for key in ["a", "b", "c", "d"] {
        store.append(key, b"old", minutes_ago(120)).unwrap();
    }
    let pruner = Pruner::new(store.clone(), "").with_scan_count(2);

    // When: the pass is interrupted
    let interrupted = pruner.prune_at(now(), 3600).unwrap_err();

    // Then: the first page's work is reported with a cursor past it
    assert_eq!(interrupted.error.kind(), ExErrorKind::StoreUnavailable);
    let visited: Vec<&str> = interrupted.partial.outcomes.iter().map(|o| o.key()).collect();
    assert_eq!(visited, vec!["a", "b"]);
    assert_eq!(interrupted.partial.total_removed(), 2);
    assert_eq!(store.inner.card("a").unwrap(), 0);
    assert_eq!(store.inner.card("c").unwrap(), 1);
    let cursor = interrupted.resume.clone().unwrap();
    assert_eq!(cursor, ScanCursor::Resume("b".to_string()));

    // And: resuming from the cursor finishes the remaining keys
    let report = pruner.prune_from(cursor, now(), 3600).unwrap();
    let visited: Vec<&str> = report.outcomes.iter().map(|o| o.key()).collect();
    assert_eq!(visited, vec!["c", "d"]);
    assert_eq!(store.inner.card("d").unwrap(), 0);
}

#[test]
fn test_interruption_on_first_page_resumes_from_start() {
    let store = Arc::new(FailingScan::new(1));
    store.append("a", b"old", minutes_ago(120)).unwrap();

    let interrupted = Pruner::new(store.clone(), "").prune_at(now(), 3600).unwrap_err();
    assert!(interrupted.partial.outcomes.is_empty());
    assert_eq!(interrupted.resume, Some(ScanCursor::Start));

    let err: ExError = interrupted.into();
    assert_eq!(err.kind(), ExErrorKind::StoreUnavailable);
}

#[test]
fn test_resume_from_page_cursor() {
    let store = Arc::new(MemoryStore::new());
    for key in ["a", "b", "c", "d", "e"] {
        store.append(key, b"old", minutes_ago(120)).unwrap();
    }

    // Stop after the first page of two keys
    let mut scan = KeyScan::new(&*store, "").with_count(2);
    let first: Vec<String> = scan.by_ref().take(2).map(|k| k.unwrap()).collect();
    assert!(scan.at_page_boundary());
    let cursor = scan.cursor().cloned().unwrap();
    assert_eq!(first, vec!["a", "b"]);

    let report = Pruner::new(store.clone(), "")
        .prune_from(cursor, now(), 3600)
        .unwrap();
    let visited: Vec<&str> = report.outcomes.iter().map(|o| o.key()).collect();
    assert_eq!(visited, vec!["c", "d", "e"]);

    // A fresh pass covers the rest
    let report = Pruner::new(store.clone(), "")
        .prune_from(ScanCursor::Start, now(), 3600)
        .unwrap();
    assert_eq!(report.total_removed(), 2);
}
