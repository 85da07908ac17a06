//! Log Records
//!
//! Security-event records and their canonical, hash-stable encoding.

pub mod entry;

pub use entry::{hash_records, LogRecord};
