//! Structured logging facility for difflog
//!
//! - Single initialization point via `init(profile)`
//! - Boundary macros (`log_op_start!`, `log_op_end!`, `log_op_error!`)
//! - Test capture mode for deterministic assertions
//!
//! # Usage
//!
//! ```rust
//! use difflog_core::logging_facility::{init, Profile};
//!
//! init(Profile::Development);
//! ```
//!
//! Operations that own a boundary (manager writes and reads, a prune pass)
//! emit start/end events; store backends log internal details at `debug`.

pub mod init;
pub mod macros;
pub mod test_capture;

pub use init::{init, Profile};
pub use test_capture::{init_test_capture, CapturedEvent, TestCapture};
