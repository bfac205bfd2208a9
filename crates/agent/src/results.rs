//! Append-only record of every reading, one line per device per cycle.

use std::path::{Path, PathBuf};

use thermwatch_core::ReadingOutcome;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

/// The results file. Opened in append mode for each cycle's batch.
#[derive(Debug, Clone)]
pub struct ResultsLog {
    path: PathBuf,
}

impl ResultsLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record line per outcome, creating the file if needed.
    pub async fn append(&self, outcomes: &[ReadingOutcome]) -> std::io::Result<()> {
        if outcomes.is_empty() {
            return Ok(());
        }

        let mut batch = String::new();
        for outcome in outcomes {
            batch.push_str(&outcome.record_line());
            batch.push('\n');
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(batch.as_bytes()).await?;
        file.flush().await
    }
}
