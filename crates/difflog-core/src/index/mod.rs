//! Secondary index of which entity triggered each diff
//!
//! The time series files a diff under its subject only. The relation index
//! additionally remembers the triggering entity, which is what makes the
//! "diffs for X plus diffs that named X as subject" view answerable.

mod memory;

pub use memory::MemoryIndex;

use crate::entity::EntityRef;
use crate::errors::Result;

/// One indexed diff
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    /// Entity the diff is filed under
    pub subject: EntityRef,
    /// Entity whose mutation produced the diff
    pub trigger: EntityRef,
    /// Serialized record, byte-identical to the time-series member
    pub member: Vec<u8>,
    pub score: f64,
}

/// Relational view over diffs keyed by subject and trigger
///
/// Recording is idempotent on `(subject, member)`: re-recording moves the
/// entry to the new score and trigger, mirroring sorted-set insertion.
pub trait RelationIndex: Send + Sync {
    fn record(&self, entry: &IndexEntry) -> Result<()>;

    /// Entries whose subject or trigger is `entity`, ordered by score and
    /// then by recording order.
    fn related(&self, entity: &EntityRef) -> Result<Vec<IndexEntry>>;

    /// Drop every entry scored in `[0, max_score]`.
    fn remove_scored_below(&self, max_score: f64) -> Result<u64>;
}
