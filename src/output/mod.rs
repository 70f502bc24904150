//! Output module for records, snapshots and run summaries
//!
//! This module handles:
//! - Appending finished records to the JSON Lines dataset
//! - Saving raw page snapshots in debug mode
//! - Rendering the terminal run summary

mod jsonl;
mod snapshot;
pub mod stats;
mod traits;

pub use jsonl::{JsonlSink, MemorySink};
pub use snapshot::DirectorySnapshotSink;
pub use stats::print_summary;
pub use traits::{OutputError, OutputResult, RecordSink, RunSummary, SnapshotSink};
