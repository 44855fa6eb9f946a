//! Event logger - persists events to JSONL files
//!
//! Subscribes to the event bus and appends every event to the run's
//! `events.jsonl` under the runs directory.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, error, warn};

use super::bus::EventBus;
use super::types::{EngineEvent, EventLogEntry};

/// Writes events to `{runs_dir}/{run-id}/events.jsonl`
pub struct EventLogger {
    runs_dir: PathBuf,
    writers: HashMap<String, BufWriter<File>>,
}

impl EventLogger {
    pub fn new(runs_dir: impl AsRef<Path>) -> Self {
        Self {
            runs_dir: runs_dir.as_ref().to_path_buf(),
            writers: HashMap::new(),
        }
    }

    /// Logger under the default data directory (`~/.cortexos/runs`)
    pub fn with_default_path() -> eyre::Result<Self> {
        let home = dirs::home_dir().ok_or_else(|| eyre::eyre!("could not determine home directory"))?;
        let runs_dir = home.join(".cortexos").join("runs");
        fs::create_dir_all(&runs_dir)?;
        Ok(Self::new(runs_dir))
    }

    /// Append an event to its run's log file
    pub fn write_event(&mut self, event: &EngineEvent) -> eyre::Result<()> {
        let run_id = event.run_id().to_string();

        let writer = if let Some(w) = self.writers.get_mut(&run_id) {
            w
        } else {
            let run_dir = self.runs_dir.join(&run_id);
            fs::create_dir_all(&run_dir)?;
            let log_path = run_dir.join("events.jsonl");
            debug!(?log_path, "opening event log");
            let file = OpenOptions::new().create(true).append(true).open(&log_path)?;
            self.writers.insert(run_id.clone(), BufWriter::new(file));
            self.writers
                .get_mut(&run_id)
                .ok_or_else(|| eyre::eyre!("writer vanished"))?
        };

        let entry = EventLogEntry::new(event.clone());
        let json = serde_json::to_string(&entry)?;
        writeln!(writer, "{}", json)?;
        writer.flush()?;
        Ok(())
    }

    /// Close the writer for a run
    pub fn close_run(&mut self, run_id: &str) {
        if let Some(mut writer) = self.writers.remove(run_id) {
            let _ = writer.flush();
        }
    }

    /// Consume events from the bus until it closes
    pub async fn run(mut self, event_bus: Arc<EventBus>) {
        let mut rx = event_bus.subscribe();

        loop {
            match rx.recv().await {
                Ok(event) => {
                    let run_id = event.run_id().to_string();
                    let is_complete = matches!(event, EngineEvent::EngineComplete { .. });

                    if let Err(e) = self.write_event(&event) {
                        error!(%run_id, error = %e, "failed to write event");
                    }
                    if is_complete {
                        self.close_run(&run_id);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(missed = n, "event logger lagged, missed events");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }

        for (_, mut writer) in self.writers.drain() {
            let _ = writer.flush();
        }
    }
}

/// Load a run's persisted events back
pub fn read_run_events(runs_dir: impl AsRef<Path>, run_id: &str) -> eyre::Result<Vec<EventLogEntry>> {
    let log_path = runs_dir.as_ref().join(run_id).join("events.jsonl");
    if !log_path.exists() {
        return Ok(Vec::new());
    }

    let content = fs::read_to_string(&log_path)?;
    let mut entries = Vec::new();
    for line in content.lines() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<EventLogEntry>(line) {
            Ok(entry) => entries.push(entry),
            Err(e) => warn!(line, error = %e, "skipping unparseable event line"),
        }
    }
    Ok(entries)
}

/// Spawn the logger as a background task
pub fn spawn_event_logger(event_bus: Arc<EventBus>, runs_dir: impl AsRef<Path>) -> tokio::task::JoinHandle<()> {
    let logger = EventLogger::new(runs_dir);
    tokio::spawn(async move {
        logger.run(event_bus).await;
    })
}
