//! Foundational low-level utilities shared across keel crates.
//!
//! Provides the atomic file-write helper used by the registry publisher and
//! run-report persistence, plus unix-time helpers used for report timestamps.

pub mod atomic_io;
pub mod time_utils;

pub use atomic_io::write_text_atomic;
pub use time_utils::{current_unix_timestamp, current_unix_timestamp_ms};
