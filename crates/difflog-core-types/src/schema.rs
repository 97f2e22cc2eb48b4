//! Canonical schema constants for structured logging and events
//!
//! Every boundary event carries `component`, `op` and `event`; end events add
//! `duration_ms`, error events add `err.kind` and `err.code`.

// Boundary fields
pub const FIELD_COMPONENT: &str = "component";
pub const FIELD_OP: &str = "op";
pub const FIELD_EVENT: &str = "event";
pub const FIELD_DURATION_MS: &str = "duration_ms";

// Diff log context
pub const FIELD_KIND: &str = "kind";
pub const FIELD_ENTITY_ID: &str = "entity_id";
pub const FIELD_KEY: &str = "key";
pub const FIELD_COUNT: &str = "count";
pub const FIELD_REMOVED: &str = "removed";

pub const FIELD_ERR_KIND: &str = "err.kind";
pub const FIELD_ERR_CODE: &str = "err.code";

/// Values of the `event` field
pub const EVENT_START: &str = "start";
pub const EVENT_END: &str = "end";
pub const EVENT_END_ERROR: &str = "end_error";

/// Values of the `op` field for operations that own a boundary
pub const OP_DIFF_CREATE: &str = "diff_create";
pub const OP_DIFF_GET_FOR_ENTITY: &str = "diff_get_for_entity";
pub const OP_DIFF_GET_LAST: &str = "diff_get_last";
pub const OP_DIFF_GET_ALL_FOR_ENTITY: &str = "diff_get_all_for_entity";
pub const OP_PRUNE: &str = "prune";

pub const ALL_FIELDS: &[&str] = &[
    FIELD_COMPONENT,
    FIELD_OP,
    FIELD_EVENT,
    FIELD_DURATION_MS,
    FIELD_KIND,
    FIELD_ENTITY_ID,
    FIELD_KEY,
    FIELD_COUNT,
    FIELD_REMOVED,
    FIELD_ERR_KIND,
    FIELD_ERR_CODE,
];

pub const ALL_OPS: &[&str] = &[
    OP_DIFF_CREATE,
    OP_DIFF_GET_FOR_ENTITY,
    OP_DIFF_GET_LAST,
    OP_DIFF_GET_ALL_FOR_ENTITY,
    OP_PRUNE,
];
