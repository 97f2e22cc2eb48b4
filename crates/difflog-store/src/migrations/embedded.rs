//! SQL migrations compiled into the binary, in application order

pub struct Migration {
    pub id: &'static str,
    pub sql: &'static str,
}

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        id: "001_time_series",
        sql: include_str!("../../migrations/001_time_series.sql"),
    },
    Migration {
        id: "002_relation_index",
        sql: include_str!("../../migrations/002_relation_index.sql"),
    },
];
