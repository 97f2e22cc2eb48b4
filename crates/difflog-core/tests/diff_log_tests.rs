// Integration tests for the diff log manager against the in-memory store

use difflog_core::{
    DiffLog, DiffsConfig, ExErrorKind, MemoryIndex, MemoryStore, NewDiff, TimeSeriesStore,
};
use proptest::prelude::*;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;

fn new_log(kind: &str) -> (DiffLog, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let log = DiffLog::new(kind, store.clone(), &DiffsConfig::default());
    (log, store)
}

#[test]
fn test_create_and_update_scenario() {
    // Given: a created entity followed by one change
    let (log, _store) = new_log("testmodel");
    log.create(json!({"name": "a"}), true, "42", None).unwrap();
    log.create(json!({"name": "b"}), false, "42", None).unwrap();

    // Then: both diffs come back oldest first
    let diffs = log.get_for_entity("42").unwrap();
    assert_eq!(diffs.len(), 2);
    assert!(diffs[0].created);
    assert_eq!(diffs[0].payload, json!({"name": "a"}));
    assert!(!diffs[1].created);
    assert_eq!(diffs[1].payload, json!({"name": "b"}));
    assert!(diffs[0].timestamp <= diffs[1].timestamp);
}

#[test]
fn test_key_layout() {
    let (log, store) = new_log("testmodel");
    assert_eq!(log.key_for("42"), "testmodel-42");

    log.create(json!({"x": 1}), true, "42", Some(5.0)).unwrap();
    assert_eq!(store.max_score("testmodel-42").unwrap(), Some(5.0));
}

#[test]
fn test_same_payload_different_created_flag_are_distinct() {
    let (log, store) = new_log("testmodel");
    log.create(json!({"x": 1}), true, "1", Some(1.0)).unwrap();
    log.create(json!({"x": 1}), false, "1", Some(2.0)).unwrap();

    assert_eq!(store.card("testmodel-1").unwrap(), 2);
}

#[test]
fn test_entities_do_not_share_series() {
    let (log, _store) = new_log("testmodel");
    log.create(json!({"x": 1}), true, "1", Some(1.0)).unwrap();
    log.create(json!({"x": 1}), true, "2", Some(1.0)).unwrap();

    assert_eq!(log.get_for_entity("1").unwrap().len(), 1);
    assert_eq!(log.get_for_entity("2").unwrap().len(), 1);
    assert!(log.get_for_entity("3").unwrap().is_empty());
}

#[test]
fn test_parent_redirect_across_kinds() {
    // Given: an order log and an item log sharing a store and index
    let store = Arc::new(MemoryStore::new());
    let index = Arc::new(MemoryIndex::new());
    let config = DiffsConfig::default();
    let orders = DiffLog::new("order", store.clone(), &config).with_index(index.clone());
    let items = DiffLog::new("item", store.clone(), &config).with_index(index);

    // When: the order is created and an item files its change under it
    orders
        .create(json!({"status": "new"}), true, "10", Some(1.0))
        .unwrap();
    items
        .create_for(
            NewDiff::for_entity(items.entity("7"), json!({"qty": 2}), true)
                .redirect_to(orders.entity("10"))
                .at(2.0),
        )
        .unwrap();

    // Then: the item's own series stays empty and the order's grows
    assert!(items.get_for_entity("7").unwrap().is_empty());
    assert_eq!(orders.get_for_entity("10").unwrap().len(), 2);

    // And: the related view sees both from either side
    let all = orders.get_all_for_entity("10").unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[1].payload, json!({"qty": 2}));
    assert_eq!(items.get_all_for_entity("7").unwrap().len(), 1);
}

#[test]
fn test_get_all_requires_index() {
    let (log, _store) = new_log("testmodel");
    let err = log.get_all_for_entity("1").unwrap_err();
    assert_eq!(err.kind(), ExErrorKind::NotImplemented);
}

#[test]
fn test_scalar_under_entity_key_fails_read() {
    let (log, store) = new_log("testmodel");
    store.set_scalar(&log.key_for("5"), b"oops").unwrap();

    let err = log.get_for_entity("5").unwrap_err();
    assert_eq!(err.kind(), ExErrorKind::KeyTypeMismatch);
    let err = log.create(json!({}), true, "5", None).unwrap_err();
    assert_eq!(err.kind(), ExErrorKind::KeyTypeMismatch);
}

proptest! {
    #[test]
    fn prop_reads_are_ordered_and_deduplicated(
        writes in prop::collection::vec((0u8..6, any::<bool>(), 0u32..10_000), 1..40)
    ) {
        let (log, _store) = new_log("prop");
        let mut distinct = HashSet::new();
        for (payload, created, ts) in &writes {
            log.create(json!({"v": payload}), *created, "e", Some(f64::from(*ts))).unwrap();
            distinct.insert((*payload, *created));
        }

        let diffs = log.get_for_entity("e").unwrap();
        prop_assert_eq!(diffs.len(), distinct.len());
        prop_assert!(diffs.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[test]
    fn prop_last_n_is_suffix_of_full_read(
        count in 1usize..20,
        n in 0usize..25
    ) {
        let (log, _store) = new_log("prop");
        for i in 0..count {
            log.create(json!({"i": i}), false, "e", Some(i as f64)).unwrap();
        }

        let all = log.get_for_entity("e").unwrap();
        let last = log.get_last("e", n).unwrap();
        let expected = &all[all.len() - n.min(all.len())..];
        prop_assert_eq!(last.as_slice(), expected);
    }
}
