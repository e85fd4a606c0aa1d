//! Structured execution log: JSON lines per batch.
//!
//! Every batch writes a `.jsonl` file under `.sweep/logs/` named after its
//! batch id: when it started, the outcome of each attempted item, and how it
//! ended. Each line is a self-contained JSON object with an RFC 3339
//! timestamp, so logs are easy to grep, stream, and post-process.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, warn};

use crate::executor::OperationOutcome;
use crate::orchestrator::{BatchObserver, BatchResult, TerminalMessage, TerminalState};
use crate::progress::ProgressSnapshot;
use crate::surface::Item;

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// A structured event in the execution log.
#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub timestamp: String,
    #[serde(flatten)]
    pub event: LogEvent,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data")]
#[serde(rename_all = "snake_case")]
pub enum LogEvent {
    BatchStarted {
        batch_id: String,
        total: usize,
    },
    /// One item reached the executor.
    ItemFinished {
        index: usize,
        item: String,
        outcome: String,
        reason: Option<String>,
    },
    BatchFinished {
        batch_id: String,
        state: TerminalState,
        message: String,
        succeeded: usize,
        failed: usize,
        skipped: usize,
        total: usize,
    },
}

/// Writer for JSON lines execution logs.
pub struct ExecutionLog {
    writer: Mutex<BufWriter<File>>,
    path: PathBuf,
}

impl ExecutionLog {
    /// Open (or append to) the log at `path`, creating parent directories.
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create log directory: {}", parent.display()))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open log file: {}", path.display()))?;

        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
            path: path.to_path_buf(),
        })
    }

    pub fn log(&self, event: LogEvent) -> Result<()> {
        let entry = LogEntry {
            timestamp: now_rfc3339(),
            event,
        };

        let json = serde_json::to_string(&entry).context("failed to serialize log entry")?;

        debug!(event = %json, "execution log");

        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writeln!(writer, "{json}").context("failed to write log entry")?;
        writer.flush().context("failed to flush log")?;

        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Batch observer that opens `<dir>/<batch-id>.jsonl` when a batch starts.
///
/// Log I/O never interrupts a batch: failures are reported at `warn` and
/// the remaining events for that batch are dropped.
pub struct BatchLogger {
    dir: PathBuf,
    batch_id: Option<String>,
    log: Option<ExecutionLog>,
}

impl BatchLogger {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            batch_id: None,
            log: None,
        }
    }

    /// Path of the log for the current batch, once one has started.
    pub fn path(&self) -> Option<&Path> {
        self.log.as_ref().map(ExecutionLog::path)
    }

    fn write(&mut self, event: LogEvent) {
        let Some(log) = &self.log else {
            return;
        };
        if let Err(e) = log.log(event) {
            warn!(path = %log.path().display(), error = %e, "execution log disabled for this batch");
            self.log = None;
        }
    }
}

impl BatchObserver for BatchLogger {
    fn on_started(&mut self, batch_id: &str, total: usize) {
        let path = self.dir.join(format!("{batch_id}.jsonl"));
        self.log = match ExecutionLog::new(&path) {
            Ok(log) => Some(log),
            Err(e) => {
                warn!(error = %format!("{e:#}"), "failed to open execution log");
                None
            }
        };
        self.batch_id = Some(batch_id.to_string());
        self.write(LogEvent::BatchStarted {
            batch_id: batch_id.to_string(),
            total,
        });
    }

    fn on_outcome(&mut self, index: usize, item: &Item, outcome: &OperationOutcome) {
        self.write(LogEvent::ItemFinished {
            index,
            item: item.id.clone(),
            outcome: outcome.label().to_string(),
            reason: outcome.reason(),
        });
    }

    fn on_progress(&mut self, _snapshot: &ProgressSnapshot) {}

    fn on_terminal(&mut self, result: &BatchResult, message: &TerminalMessage) {
        let batch_id = self.batch_id.clone().unwrap_or_default();
        self.write(LogEvent::BatchFinished {
            batch_id,
            state: result.state,
            message: message.to_string(),
            succeeded: result.succeeded,
            failed: result.failed,
            skipped: result.skipped,
            total: result.total,
        });
    }
}
