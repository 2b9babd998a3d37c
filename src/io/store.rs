//! Report store - appends every normalized report to disk
//!
//! One append-only JSONL collection per report kind (flame.jsonl,
//! gas.jsonl, state.jsonl) under the configured data directory. Writes
//! are best-effort: a failure is surfaced to the caller for logging and
//! never retried, and never blocks the broadcast path.

use crate::domain::types::{IngestedReport, ReportKind};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Append-only persistence sink, partitioned by report kind
pub struct ReportStore {
    dir: PathBuf,
}

impl ReportStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        let dir = dir.as_ref().to_path_buf();
        info!(dir = %dir.display(), "store_initialized");
        Self { dir }
    }

    /// Append one report to its kind's collection
    pub fn append(&self, report: &IngestedReport) -> std::io::Result<()> {
        let line = serde_json::to_string(report)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        self.append_line(report.kind(), &line)
    }

    fn append_line(&self, kind: ReportKind, line: &str) -> std::io::Result<()> {
        if !self.dir.exists() {
            std::fs::create_dir_all(&self.dir)?;
        }

        let path = self.collection_path(kind);
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        writeln!(file, "{}", line)?;
        debug!(file = %path.display(), bytes = %line.len(), "store_appended");
        Ok(())
    }

    /// File backing one report kind's collection
    pub fn collection_path(&self, kind: ReportKind) -> PathBuf {
        self.dir.join(format!("{}.jsonl", kind.as_str()))
    }
}
