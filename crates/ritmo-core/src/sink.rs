use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// A structured entry describing one scheduler action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// Name of the worker the action involved.
    pub worker: String,
    /// Action kind, e.g. `dispatch`, `handoff`, `health_check`.
    pub action: String,
    /// Result summary text.
    pub result: String,
    /// UTC timestamp of when the entry was created.
    pub timestamp: DateTime<Utc>,
}

impl LogEntry {
    /// Create an entry stamped with the current time.
    pub fn new(
        worker: impl Into<String>,
        action: impl Into<String>,
        result: impl Into<String>,
    ) -> Self {
        Self {
            worker: worker.into(),
            action: action.into(),
            result: result.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Append-only log sink consumed by the control loop.
///
/// Appends are fire-and-forget: implementations must swallow their own
/// failures (logging them locally at most) so a broken sink can never stall
/// or fail the control loop.
#[async_trait]
pub trait LogSink: Send + Sync {
    /// Append one entry. Must not return an error to the caller.
    async fn append(&self, entry: LogEntry);
}

/// One-way status-update sink for human-observable progress narration.
///
/// Failures must not affect control flow.
#[async_trait]
pub trait StatusSink: Send + Sync {
    /// Emit one line of progress narration.
    async fn notify(&self, text: &str);
}

/// A [`LogSink`] that discards everything.
#[derive(Debug, Default)]
pub struct NullLog;

#[async_trait]
impl LogSink for NullLog {
    async fn append(&self, _entry: LogEntry) {}
}

/// A [`StatusSink`] that discards everything.
#[derive(Debug, Default)]
pub struct NullStatus;

#[async_trait]
impl StatusSink for NullStatus {
    async fn notify(&self, _text: &str) {}
}

/// An in-memory [`LogSink`] that retains entries for inspection.
///
/// Used by tests and by embedders that want to surface recent activity
/// without a file journal.
#[derive(Debug, Default)]
pub struct MemoryLog {
    entries: Mutex<Vec<LogEntry>>,
}

impl MemoryLog {
    /// Create an empty memory log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all retained entries.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Number of retained entries.
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    /// True when no entries have been appended.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl LogSink for MemoryLog {
    async fn append(&self, entry: LogEntry) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(entry);
        }
    }
}

/// An in-memory [`StatusSink`] that retains notifications for inspection.
#[derive(Debug, Default)]
pub struct MemoryStatus {
    updates: Mutex<Vec<String>>,
}

impl MemoryStatus {
    /// Create an empty memory status sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all retained notifications.
    pub fn updates(&self) -> Vec<String> {
        self.updates.lock().map(|u| u.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl StatusSink for MemoryStatus {
    async fn notify(&self, text: &str) {
        if let Ok(mut updates) = self.updates.lock() {
            updates.push(text.to_string());
        }
    }
}
