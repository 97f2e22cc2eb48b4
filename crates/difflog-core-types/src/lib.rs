//! Core types shared across difflog facilities
//!
//! This crate provides the canonical field keys and event names used by the
//! logging facility and by anything that emits structured events about diff
//! log operations.

pub mod schema;
