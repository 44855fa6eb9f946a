//! Session persistence
//!
//! Best-effort snapshots of the run context into the run directory. Writes
//! are fire-and-forget on each mutation; a failed write is logged and never
//! fails the run.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::domain::RunContext;

/// Writes run-context snapshots under `{runs_dir}/{run-id}/context.json`
#[derive(Clone)]
pub struct SessionWriter {
    runs_dir: PathBuf,
}

impl SessionWriter {
    pub fn new(runs_dir: impl AsRef<Path>) -> Self {
        Self {
            runs_dir: runs_dir.as_ref().to_path_buf(),
        }
    }

    fn context_path(&self, run_id: &str) -> PathBuf {
        self.runs_dir.join(run_id).join("context.json")
    }

    /// Persist a snapshot without blocking the caller
    pub fn persist(&self, context: &RunContext) {
        let path = self.context_path(&context.run_id);
        let snapshot = context.snapshot();
        tokio::spawn(async move {
            if let Err(e) = write_snapshot(&path, &snapshot).await {
                warn!(error = %e, ?path, "failed to persist run context");
            }
        });
    }

    /// Persist a snapshot and wait for the write
    pub async fn persist_now(&self, context: &RunContext) -> eyre::Result<()> {
        let path = self.context_path(&context.run_id);
        write_snapshot(&path, context).await
    }

    /// Load a persisted run context back
    pub fn load(&self, run_id: &str) -> eyre::Result<RunContext> {
        let path = self.context_path(run_id);
        let body = std::fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Run IDs with persisted contexts, most recently modified first
    pub fn list_runs(&self) -> Vec<String> {
        let Ok(read_dir) = std::fs::read_dir(&self.runs_dir) else {
            return Vec::new();
        };

        let mut runs: Vec<(String, std::time::SystemTime)> = read_dir
            .flatten()
            .filter_map(|entry| {
                let run_id = entry.file_name().to_string_lossy().to_string();
                let context = entry.path().join("context.json");
                let modified = context.metadata().ok()?.modified().ok()?;
                Some((run_id, modified))
            })
            .collect();
        runs.sort_by(|a, b| b.1.cmp(&a.1));
        runs.into_iter().map(|(id, _)| id).collect()
    }
}

async fn write_snapshot(path: &Path, context: &RunContext) -> eyre::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let body = serde_json::to_string_pretty(context)?;
    tokio::fs::write(path, body).await?;
    debug!(run_id = %context.run_id, "run context persisted");
    Ok(())
}
