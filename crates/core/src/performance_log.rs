use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use log::warn;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::results_buffer::RingBuffer;

pub const PERFORMANCE_LOG_CAPACITY: usize = 100;
pub const QUERY_PREFIX_CHARS: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PerformanceRecord {
    pub query_prefix: String,
    pub duration_ms: f64,
    pub row_count: u64,
    pub timestamp: String,
}

impl PerformanceRecord {
    /// Builds a record stamped with the current UTC time.
    #[must_use]
    pub fn new(query: &str, elapsed: Duration, row_count: u64) -> Self {
        Self {
            query_prefix: query_prefix(query),
            duration_ms: elapsed.as_secs_f64() * 1_000.0,
            row_count,
            timestamp: iso_timestamp_now(),
        }
    }
}

#[must_use]
pub fn query_prefix(query: &str) -> String {
    query.chars().take(QUERY_PREFIX_CHARS).collect()
}

#[must_use]
pub fn iso_timestamp_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[derive(Debug, Error)]
pub enum PerformanceLogError {
    #[error("failed to create performance log directory at {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize performance log: {source}")]
    Serialize {
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write performance log at {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Most recent query timings, persisted as a JSON array (oldest first)
/// after every append.
#[derive(Debug, Clone)]
pub struct PerformanceLog {
    path: Option<PathBuf>,
    records: RingBuffer<PerformanceRecord>,
}

impl Default for PerformanceLog {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl PerformanceLog {
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            path: None,
            records: RingBuffer::new(PERFORMANCE_LOG_CAPACITY),
        }
    }

    /// Loads the log stored at `path`. A missing, unreadable or corrupt file
    /// yields an empty log; this never fails.
    #[must_use]
    pub fn load_from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let records = read_records(&path).unwrap_or_default();
        Self {
            path: Some(path),
            records: RingBuffer::from_oldest_first(PERFORMANCE_LOG_CAPACITY, records),
        }
    }

    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Oldest first.
    pub fn records(&self) -> impl DoubleEndedIterator<Item = &PerformanceRecord> + '_ {
        self.records.iter()
    }

    #[must_use]
    pub fn latest(&self) -> Option<&PerformanceRecord> {
        self.records.latest()
    }

    /// Appends a record, evicting the oldest past capacity, then writes the
    /// whole log back to disk. The in-memory append happens even if the
    /// write fails.
    pub fn record(&mut self, record: PerformanceRecord) -> Result<(), PerformanceLogError> {
        self.records.push(record);
        self.persist()
    }

    pub fn persist(&self) -> Result<(), PerformanceLogError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(parent_dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(parent_dir).map_err(|source| PerformanceLogError::CreateDir {
                path: parent_dir.to_path_buf(),
                source,
            })?;
        }

        let snapshot = self.records.iter().collect::<Vec<_>>();
        let rendered = serde_json::to_string_pretty(&snapshot)
            .map_err(|source| PerformanceLogError::Serialize { source })?;
        fs::write(path, rendered).map_err(|source| PerformanceLogError::Write {
            path: path.clone(),
            source,
        })
    }
}

fn read_records(path: &Path) -> Option<Vec<PerformanceRecord>> {
    if !path.exists() {
        return None;
    }

    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(error) => {
            warn!(
                "ignoring unreadable performance log at {}: {error}",
                path.display()
            );
            return None;
        }
    };

    if raw.trim().is_empty() {
        return None;
    }

    match serde_json::from_str(&raw) {
        Ok(records) => Some(records),
        Err(error) => {
            warn!(
                "ignoring corrupt performance log at {}: {error}",
                path.display()
            );
            None
        }
    }
}
