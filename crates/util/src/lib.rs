//! Utility helpers shared by the Capflow crates: path handling and run-log persistence.

pub mod path_processing;
pub mod run_log_store;

pub use path_processing::{expand_tilde, split_path_list};
pub use run_log_store::{JsonRunLogStore, RecentRuns, RunLogEntry, RunLogStore, RunLogStoreError, RunSummary};
