//! Append-only captured output log.
//!
//! Entry ids start at 1 and strictly increase. When the log is full the
//! oldest entry is evicted; ids are never renumbered or reused, so a
//! `since_id` watermark stays valid across evictions.

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::DebuggerError;

/// Kind of captured output.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogEntryType {
    /// Printed output.
    Info,
    /// Warning.
    Warning,
    /// Engine or user error.
    Error,
    /// Script runtime error.
    ScriptError,
}

impl LogEntryType {
    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::ScriptError => "script_error",
        }
    }

    /// Lenient parse for values reported by the game process. Unknown kinds
    /// are recorded as info.
    pub fn from_reported(s: &str) -> Self {
        match s {
            "warning" | "warn" | "push_warning" => Self::Warning,
            "error" | "push_error" => Self::Error,
            "script_error" => Self::ScriptError,
            _ => Self::Info,
        }
    }

    /// Errors of either kind.
    pub fn is_error(self) -> bool {
        matches!(self, Self::Error | Self::ScriptError)
    }
}

impl fmt::Display for LogEntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One captured output record.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LogEntry {
    /// Monotonic id.
    pub id: u64,
    /// Entry kind.
    #[serde(rename = "type")]
    pub entry_type: LogEntryType,
    /// Message text.
    pub message: String,
    /// Unix seconds when captured.
    pub timestamp: f64,
    /// File, line and function details when the game reported them.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<Value>,
}

/// Type filter for retrieval. Matching is exact: `Error` does not include
/// `script_error` entries.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EntryFilter {
    /// Every entry.
    #[default]
    All,
    /// `info` entries (`print` is accepted as an alias).
    Info,
    /// `warning` entries.
    Warning,
    /// `error` entries.
    Error,
    /// `script_error` entries.
    ScriptError,
}

impl EntryFilter {
    /// Whether `entry_type` passes.
    pub fn matches(self, entry_type: LogEntryType) -> bool {
        match self {
            Self::All => true,
            Self::Info => entry_type == LogEntryType::Info,
            Self::Warning => entry_type == LogEntryType::Warning,
            Self::Error => entry_type == LogEntryType::Error,
            Self::ScriptError => entry_type == LogEntryType::ScriptError,
        }
    }
}

impl FromStr for EntryFilter {
    type Err = DebuggerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(Self::All),
            "info" | "print" => Ok(Self::Info),
            "warning" => Ok(Self::Warning),
            "error" => Ok(Self::Error),
            "script_error" => Ok(Self::ScriptError),
            other => Err(DebuggerError::InvalidArgument(format!(
                "Invalid filter '{other}'. Expected one of: all, error, warning, script_error, print"
            ))),
        }
    }
}

/// Bounded append-only log.
#[derive(Debug)]
pub struct DebugLog {
    entries: VecDeque<LogEntry>,
    capacity: usize,
    last_id: u64,
}

impl DebugLog {
    /// Create a log retaining at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity: capacity.max(1),
            last_id: 0,
        }
    }

    /// Append an entry and return its id.
    pub fn append(&mut self, entry_type: LogEntryType, message: String, timestamp: f64, source: Option<Value>) -> u64 {
        self.last_id += 1;
        if self.entries.len() >= self.capacity {
            let _ = self.entries.pop_front();
        }
        self.entries.push_back(LogEntry {
            id: self.last_id,
            entry_type,
            message,
            timestamp,
            source,
        });
        self.last_id
    }

    /// Highest id ever assigned, 0 before the first append.
    pub fn last_id(&self) -> u64 {
        self.last_id
    }

    /// Entries currently retained.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is retained.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The oldest `max` entries with `id > since_id` passing `filter`.
    pub fn entries_after(&self, filter: EntryFilter, since_id: u64, max: usize) -> Vec<LogEntry> {
        // ids are sorted, so skip straight to the watermark
        let start = self.entries.partition_point(|e| e.id <= since_id);
        self.entries
            .range(start..)
            .filter(|e| filter.matches(e.entry_type))
            .take(max)
            .cloned()
            .collect()
    }

    /// `(errors, warnings)` among entries after `since_id`.
    pub fn counts_after(&self, since_id: u64) -> (usize, usize) {
        let start = self.entries.partition_point(|e| e.id <= since_id);
        self.entries.range(start..).fold((0, 0), |(errors, warnings), e| {
            if e.entry_type.is_error() {
                (errors + 1, warnings)
            } else if e.entry_type == LogEntryType::Warning {
                (errors, warnings + 1)
            } else {
                (errors, warnings)
            }
        })
    }

    /// First entry after `since_id` satisfying `pred`.
    pub fn find_after(&self, since_id: u64, pred: impl Fn(&LogEntry) -> bool) -> Option<LogEntry> {
        let start = self.entries.partition_point(|e| e.id <= since_id);
        self.entries.range(start..).find(|e| pred(e)).cloned()
    }
}
