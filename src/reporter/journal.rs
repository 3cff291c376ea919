//! Report Journal
//!
//! Append-only record of every report attempt and its observed outcome.
//! Creates daily files: <journal_dir>/reports_YYYYMMDD.jsonl
//!
//! One JSON object per line, so a crash mid-write loses at most the line
//! being written and the file stays greppable with standard tools.
//!
//! `record` only serializes and queues; file I/O happens on a blocking
//! writer thread so the report path never waits on the disk.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::types::{ReportAttempt, ReportOutcome};

#[derive(Debug, Serialize)]
struct JournalEntry<'a> {
    timestamp: DateTime<Utc>,
    #[serde(flatten)]
    attempt: &'a ReportAttempt,
    outcome: &'a ReportOutcome,
}

/// One serialized entry and the daily file it belongs to
#[derive(Debug)]
struct JournalLine {
    file_path: PathBuf,
    json: String,
}

/// JSONL journal of report attempts
#[derive(Debug, Clone)]
pub struct ReportJournal {
    base_dir: PathBuf,
    tx: mpsc::UnboundedSender<JournalLine>,
}

impl ReportJournal {
    /// Create the directory and start the writer. The writer exits once
    /// every handle is dropped and the queue is drained.
    pub fn spawn<P: AsRef<Path>>(base_dir: P) -> Result<(Self, JoinHandle<()>)> {
        let base_dir = base_dir.as_ref().to_path_buf();
        fs::create_dir_all(&base_dir)
            .with_context(|| format!("Failed to create journal directory: {:?}", base_dir))?;

        let (tx, mut rx) = mpsc::unbounded_channel::<JournalLine>();
        let writer = tokio::task::spawn_blocking(move || {
            while let Some(line) = rx.blocking_recv() {
                if let Err(e) = append_line(&line) {
                    warn!("Journal write failed: {:#}", e);
                }
            }
        });
        Ok((Self { base_dir, tx }, writer))
    }

    fn file_path_for(base_dir: &Path, at: DateTime<Utc>) -> PathBuf {
        base_dir.join(format!("reports_{}.jsonl", at.format("%Y%m%d")))
    }

    pub fn record(&self, attempt: &ReportAttempt, outcome: &ReportOutcome) -> Result<()> {
        self.record_at(Utc::now(), attempt, outcome)
    }

    fn record_at(
        &self,
        timestamp: DateTime<Utc>,
        attempt: &ReportAttempt,
        outcome: &ReportOutcome,
    ) -> Result<()> {
        let entry = JournalEntry {
            timestamp,
            attempt,
            outcome,
        };
        let json = serde_json::to_string(&entry).context("Failed to serialize journal entry")?;
        let line = JournalLine {
            file_path: Self::file_path_for(&self.base_dir, timestamp),
            json,
        };
        self.tx
            .send(line)
            .map_err(|_| anyhow!("journal writer stopped"))
    }
}

fn append_line(line: &JournalLine) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&line.file_path)
        .with_context(|| format!("Failed to open journal file: {:?}", line.file_path))?;
    writeln!(file, "{}", line.json)?;
    Ok(())
}
