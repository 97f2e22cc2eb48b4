use super::{IndexEntry, RelationIndex};
use crate::entity::EntityRef;
use crate::errors::{lock_poisoned, Result};
use std::sync::Mutex;

#[derive(Debug, Default)]
struct Inner {
    // (entry, recording sequence)
    rows: Vec<(IndexEntry, u64)>,
    next_seq: u64,
}

/// Relation index held in process memory
#[derive(Debug, Default)]
pub struct MemoryIndex {
    inner: Mutex<Inner>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RelationIndex for MemoryIndex {
    fn record(&self, entry: &IndexEntry) -> Result<()> {
        let mut inner = self.inner.lock().map_err(|_| lock_poisoned("index_record"))?;
        let seq = inner.next_seq;
        inner.next_seq += 1;

        inner
            .rows
            .retain(|(row, _)| !(row.subject == entry.subject && row.member == entry.member));
        inner.rows.push((entry.clone(), seq));
        Ok(())
    }

    fn related(&self, entity: &EntityRef) -> Result<Vec<IndexEntry>> {
        let inner = self.inner.lock().map_err(|_| lock_poisoned("index_related"))?;
        let mut rows: Vec<&(IndexEntry, u64)> = inner
            .rows
            .iter()
            .filter(|(row, _)| &row.subject == entity || &row.trigger == entity)
            .collect();
        rows.sort_by(|a, b| a.0.score.total_cmp(&b.0.score).then(a.1.cmp(&b.1)));
        Ok(rows.into_iter().map(|(row, _)| row.clone()).collect())
    }

    fn remove_scored_below(&self, max_score: f64) -> Result<u64> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| lock_poisoned("index_remove_scored_below"))?;
        let before = inner.rows.len();
        inner
            .rows
            .retain(|(row, _)| !(row.score >= 0.0 && row.score <= max_score));
        Ok((before - inner.rows.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(subject: &str, trigger: &str, member: &str, score: f64) -> IndexEntry {
        IndexEntry {
            subject: EntityRef::new("widget", subject),
            trigger: EntityRef::new("widget", trigger),
            member: member.as_bytes().to_vec(),
            score,
        }
    }

    #[test]
    fn test_related_covers_subject_and_trigger() {
        let index = MemoryIndex::new();
        index.record(&entry("p", "p", "own", 1.0)).unwrap();
        index.record(&entry("p", "c", "from-child", 2.0)).unwrap();
        index.record(&entry("x", "x", "unrelated", 3.0)).unwrap();

        let parent = index.related(&EntityRef::new("widget", "p")).unwrap();
        assert_eq!(parent.len(), 2);
        assert_eq!(parent[0].member, b"own");

        let child = index.related(&EntityRef::new("widget", "c")).unwrap();
        assert_eq!(child.len(), 1);
        assert_eq!(child[0].member, b"from-child");
    }

    #[test]
    fn test_record_is_idempotent_on_subject_and_member() {
        let index = MemoryIndex::new();
        index.record(&entry("p", "p", "same", 1.0)).unwrap();
        index.record(&entry("p", "p", "same", 9.0)).unwrap();

        let rows = index.related(&EntityRef::new("widget", "p")).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].score, 9.0);
    }

    #[test]
    fn test_remove_scored_below_is_inclusive() {
        let index = MemoryIndex::new();
        index.record(&entry("p", "p", "old", 1.0)).unwrap();
        index.record(&entry("p", "p", "edge", 5.0)).unwrap();
        index.record(&entry("q", "q", "new", 6.0)).unwrap();

        assert_eq!(index.remove_scored_below(5.0).unwrap(), 2);
        assert!(index.related(&EntityRef::new("widget", "p")).unwrap().is_empty());
        assert_eq!(
            index.related(&EntityRef::new("widget", "q")).unwrap().len(),
            1
        );
    }
}
