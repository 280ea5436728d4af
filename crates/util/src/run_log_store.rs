//! Run-log persistence for finished automation traces.
//!
//! Each run is written as its own pretty-printed JSON file under
//! `<logs>/<automation>/<timestamp>.json`. File names sort chronologically, so listing
//! recent runs is a reverse lexicographic sort of the directory.

use std::{
    fs,
    path::{Path, PathBuf},
};

use capflow_types::Trace;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, warn};

/// Extension used for persisted run logs.
pub const RUN_LOG_EXTENSION: &str = "json";

/// Errors surfaced by run-log store operations.
#[derive(Debug, Error)]
pub enum RunLogStoreError {
    /// I/O failure while reading or writing a run log.
    #[error("run log I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Serialization failure while writing a trace.
    #[error("run log serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A persisted run, parsed when possible.
#[derive(Debug, Clone)]
pub enum RunLogEntry {
    Parsed { path: PathBuf, trace: Trace },
    /// The file exists but could not be decoded; `error` describes why.
    Unreadable { path: PathBuf, error: String },
}

impl RunLogEntry {
    pub fn path(&self) -> &Path {
        match self {
            RunLogEntry::Parsed { path, .. } | RunLogEntry::Unreadable { path, .. } => path,
        }
    }
}

/// Most recent runs for one automation plus the total number on disk.
#[derive(Debug, Clone, Default)]
pub struct RecentRuns {
    pub total: usize,
    pub entries: Vec<RunLogEntry>,
}

/// Storage backend for finished traces.
pub trait RunLogStore {
    /// Persist a trace under the given automation key, returning where it was written.
    fn save(&self, automation_key: &str, trace: &Trace) -> Result<PathBuf, RunLogStoreError>;

    /// List up to `limit` runs for the automation, most recent first.
    fn recent(&self, automation_key: &str, limit: usize) -> Result<RecentRuns, RunLogStoreError>;
}

/// Filesystem store rooted at a logs directory.
#[derive(Debug, Clone)]
pub struct JsonRunLogStore {
    root: PathBuf,
}

impl JsonRunLogStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn automation_dir(&self, automation_key: &str) -> PathBuf {
        self.root.join(automation_key)
    }
}

impl RunLogStore for JsonRunLogStore {
    fn save(&self, automation_key: &str, trace: &Trace) -> Result<PathBuf, RunLogStoreError> {
        let directory = self.automation_dir(automation_key);
        fs::create_dir_all(&directory).map_err(|source| RunLogStoreError::Io {
            path: directory.clone(),
            source,
        })?;

        let path = directory.join(format!("{}.{RUN_LOG_EXTENSION}", file_stamp(trace.started_at())));
        let content = serde_json::to_string_pretty(trace)?;
        fs::write(&path, content).map_err(|source| RunLogStoreError::Io { path: path.clone(), source })?;
        debug!(path = %path.display(), steps = trace.steps().len(), "run log written");
        Ok(path)
    }

    fn recent(&self, automation_key: &str, limit: usize) -> Result<RecentRuns, RunLogStoreError> {
        let directory = self.automation_dir(automation_key);
        let listing = match fs::read_dir(&directory) {
            Ok(listing) => listing,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(RecentRuns::default()),
            Err(source) => return Err(RunLogStoreError::Io { path: directory, source }),
        };

        let mut paths: Vec<PathBuf> = listing
            .filter_map(|entry| entry.ok().map(|entry| entry.path()))
            .filter(|path| path.extension().and_then(|extension| extension.to_str()) == Some(RUN_LOG_EXTENSION))
            .collect();
        paths.sort();
        paths.reverse();

        let total = paths.len();
        let entries = paths.into_iter().take(limit).map(read_entry).collect();
        Ok(RecentRuns { total, entries })
    }
}

fn read_entry(path: PathBuf) -> RunLogEntry {
    let decoded = fs::read_to_string(&path)
        .map_err(|error| error.to_string())
        .and_then(|content| serde_json::from_str::<Trace>(&content).map_err(|error| error.to_string()));
    match decoded {
        Ok(trace) => RunLogEntry::Parsed { path, trace },
        Err(error) => {
            warn!(path = %path.display(), %error, "failed to read run log");
            RunLogEntry::Unreadable { path, error }
        }
    }
}

/// ISO-8601 timestamp with `:` and `.` replaced so it is safe as a file name.
fn file_stamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H-%M-%S-%3fZ").to_string()
}

/// Condensed view of a trace used by the `logs` listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub step_count: usize,
    pub completed: usize,
    pub skipped: usize,
    pub dry_run: bool,
    pub duration_ms: Option<i64>,
}

impl From<&Trace> for RunSummary {
    fn from(trace: &Trace) -> Self {
        Self {
            started_at: trace.started_at(),
            step_count: trace.steps().len(),
            completed: trace.completed_count(),
            skipped: trace.skipped_count(),
            dry_run: trace.is_dry_run(),
            duration_ms: trace.duration().map(|duration| duration.num_milliseconds()),
        }
    }
}
