use async_trait::async_trait;
use ritmo_core::{LogEntry, LogSink, StatusSink};
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Append-only JSONL journal of scheduler actions.
///
/// Entries go through an unbounded channel to a background writer task, so
/// appends never block the control loop. Channel or disk failures are
/// swallowed with a local warning.
pub struct FileJournal {
    tx: mpsc::UnboundedSender<LogEntry>,
}

impl FileJournal {
    /// Create a journal. Spawns the background task that writes entries to
    /// `<dir>/journal.jsonl`.
    pub fn new(dir: PathBuf) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<LogEntry>();

        tokio::spawn(async move {
            let _ = tokio::fs::create_dir_all(&dir).await;
            let path = dir.join("journal.jsonl");

            while let Some(entry) = rx.recv().await {
                let Ok(line) = serde_json::to_string(&entry) else {
                    continue;
                };
                let open = tokio::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&path)
                    .await;
                match open {
                    Ok(mut file) => {
                        use tokio::io::AsyncWriteExt;
                        if let Err(e) = file.write_all(format!("{line}\n").as_bytes()).await {
                            warn!(error = %e, "Journal write failed");
                        }
                    }
                    Err(e) => warn!(error = %e, "Journal open failed"),
                }
            }
        });

        Self { tx }
    }
}

#[async_trait]
impl LogSink for FileJournal {
    async fn append(&self, entry: LogEntry) {
        if self.tx.send(entry).is_err() {
            warn!("Journal writer task is gone; entry dropped");
        }
    }
}

/// A [`StatusSink`] that narrates progress through `tracing`.
#[derive(Debug, Default)]
pub struct TracingStatus;

#[async_trait]
impl StatusSink for TracingStatus {
    async fn notify(&self, text: &str) {
        info!(status = %text, "Scheduler update");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_journal_appends_jsonl() {
        let dir = tempfile::tempdir().unwrap();
        let journal = FileJournal::new(dir.path().to_path_buf());

        journal.append(LogEntry::new("scout", "dispatch", "ok")).await;
        journal
            .append(LogEntry::new("writer", "handoff", "drafted"))
            .await;

        // The writer task drains asynchronously.
        let path = dir.path().join("journal.jsonl");
        let mut contents = String::new();
        for _ in 0..50 {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            if let Ok(data) = tokio::fs::read_to_string(&path).await {
                if data.lines().count() == 2 {
                    contents = data;
                    break;
                }
            }
        }

        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: LogEntry = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.worker, "scout");
        let second: LogEntry = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second.action, "handoff");
    }

    #[tokio::test]
    async fn test_status_sink_never_fails() {
        TracingStatus.notify("cycle 3 complete").await;
    }
}
